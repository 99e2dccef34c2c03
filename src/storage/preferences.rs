use sqlx::{QueryBuilder, Sqlite};

use super::articles::{contains_pattern, ArticleWhere};
use super::schema::Database;
use super::types::{Article, DatabaseError, Page, PreferenceDbRow, PreferenceSet, UserPreference};

const PREFERENCE_COLUMNS: &str = "id, user_id, preferred_sources, preferred_categories, \
                                  preferred_authors, created_at, updated_at";

/// Feed filter derived from stored preferences.
///
/// Authors are OR'd substring matches; the author, category and source groups
/// are AND'd together. An empty list disables its group entirely.
impl ArticleWhere for PreferenceSet {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");

        if !self.authors.is_empty() {
            builder.push(" AND (");
            let mut separated = builder.separated(" OR ");
            for author in &self.authors {
                separated
                    .push("author LIKE ")
                    .push_bind_unseparated(contains_pattern(author))
                    .push_unseparated(" ESCAPE '\\'");
            }
            builder.push(")");
        }
        if !self.categories.is_empty() {
            builder.push(" AND category IN (");
            let mut separated = builder.separated(", ");
            for category in &self.categories {
                separated.push_bind(category.clone());
            }
            separated.push_unseparated(")");
        }
        if !self.sources.is_empty() {
            builder.push(" AND source IN (");
            let mut separated = builder.separated(", ");
            for source in &self.sources {
                separated.push_bind(source.clone());
            }
            separated.push_unseparated(")");
        }
    }
}

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Store a user's preference lists (UPSERT on user_id, last write wins).
    ///
    /// Returns the stored record; `created_at` survives later updates.
    pub async fn upsert_preferences(
        &self,
        user_id: i64,
        prefs: &PreferenceSet,
    ) -> Result<UserPreference, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query_as::<_, PreferenceDbRow>(&format!(
            r#"
            INSERT INTO user_preferences (user_id, preferred_sources, preferred_categories,
                                          preferred_authors, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                preferred_sources = excluded.preferred_sources,
                preferred_categories = excluded.preferred_categories,
                preferred_authors = excluded.preferred_authors,
                updated_at = excluded.updated_at
            RETURNING {PREFERENCE_COLUMNS}
        "#
        ))
        .bind(user_id)
        .bind(encode_list(&prefs.sources)?)
        .bind(encode_list(&prefs.categories)?)
        .bind(encode_list(&prefs.authors)?)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.into_preference()
    }

    /// Get the stored preferences for a user, if any.
    pub async fn get_preferences(
        &self,
        user_id: i64,
    ) -> Result<Option<UserPreference>, DatabaseError> {
        let row = sqlx::query_as::<_, PreferenceDbRow>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM user_preferences WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PreferenceDbRow::into_preference).transpose()
    }

    /// Personalized feed for a user, newest first, same paging as listings.
    ///
    /// A user without stored preferences gets the unfiltered listing.
    pub async fn feed_for(&self, user_id: i64, page: u32) -> Result<Page<Article>, DatabaseError> {
        let prefs = self
            .get_preferences(user_id)
            .await?
            .map(|p| p.as_set())
            .unwrap_or_default();
        tracing::debug!(
            user_id,
            sources = prefs.sources.len(),
            categories = prefs.categories.len(),
            authors = prefs.authors.len(),
            "building personalized feed"
        );
        self.fetch_page(&prefs, page).await
    }
}

fn encode_list(values: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(values).map_err(|e| DatabaseError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewArticle, PreferenceSet};
    use chrono::{TimeZone, Utc};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    async fn seed(db: &Database, slug: &str, source: &str, category: &str, author: Option<&str>) {
        db.upsert_article(&NewArticle {
            title: format!("Title {slug}"),
            description: Some("Description".to_string()),
            content: None,
            source: source.to_string(),
            author: author.map(str::to_string),
            url: format!("https://example.com/{slug}"),
            image_url: None,
            category: Some(category.to_string()),
            published_at: Utc.with_ymd_and_hms(2024, 11, 8, 12, 0, 0).unwrap(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_preferences_missing() {
        let db = test_db().await;
        assert!(db.get_preferences(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_get_preferences() {
        let db = test_db().await;
        let prefs = PreferenceSet {
            sources: strings(&["NewsAPI", "Guardian"]),
            categories: strings(&["technology"]),
            authors: strings(&["Jane Smith"]),
        };
        let stored = db.upsert_preferences(7, &prefs).await.unwrap();
        assert_eq!(stored.user_id, 7);
        assert_eq!(stored.as_set(), prefs);

        let loaded = db.get_preferences(7).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_upsert_preferences_last_write_wins() {
        let db = test_db().await;
        let first = db
            .upsert_preferences(
                7,
                &PreferenceSet {
                    sources: strings(&["NYT"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = db
            .upsert_preferences(
                7,
                &PreferenceSet {
                    categories: strings(&["health"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.preferred_sources.is_empty());
        assert_eq!(second.preferred_categories, strings(&["health"]));

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_preferences")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_feed_filters_by_category_only() {
        let db = test_db().await;
        seed(&db, "t", "NewsAPI", "technology", Some("A")).await;
        seed(&db, "b", "Guardian", "business", None).await;
        seed(&db, "h", "NYT", "health", Some("B")).await;

        db.upsert_preferences(
            1,
            &PreferenceSet {
                categories: strings(&["technology", "business"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = db.feed_for(1, 1).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .items
            .iter()
            .all(|a| matches!(a.category.as_deref(), Some("technology" | "business"))));
    }

    #[tokio::test]
    async fn test_feed_authors_are_ored_substrings() {
        let db = test_db().await;
        seed(&db, "1", "NewsAPI", "general", Some("By Jane Smith")).await;
        seed(&db, "2", "NewsAPI", "general", Some("John Doe")).await;
        seed(&db, "3", "NewsAPI", "general", Some("Someone Else")).await;
        seed(&db, "4", "NewsAPI", "general", None).await;

        db.upsert_preferences(
            1,
            &PreferenceSet {
                authors: strings(&["Jane", "Doe"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = db.feed_for(1, 1).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_feed_groups_are_anded() {
        let db = test_db().await;
        seed(&db, "1", "Guardian", "technology", Some("Jane")).await;
        seed(&db, "2", "NewsAPI", "technology", Some("Jane")).await;
        seed(&db, "3", "Guardian", "business", Some("Jane")).await;
        seed(&db, "4", "Guardian", "technology", Some("Bob")).await;

        db.upsert_preferences(
            1,
            &PreferenceSet {
                sources: strings(&["Guardian"]),
                categories: strings(&["technology"]),
                authors: strings(&["Jane"]),
            },
        )
        .await
        .unwrap();

        let page = db.feed_for(1, 1).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].url, "https://example.com/1");
    }

    #[tokio::test]
    async fn test_feed_without_preferences_is_unfiltered() {
        let db = test_db().await;
        seed(&db, "1", "Guardian", "technology", None).await;
        seed(&db, "2", "NYT", "home", None).await;

        let page = db.feed_for(99, 1).await.unwrap();
        assert_eq!(page.total, 2);
    }
}
