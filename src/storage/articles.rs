use chrono::NaiveTime;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::schema::Database;
use super::types::{Article, ArticleDbRow, ArticleFilter, DatabaseError, NewArticle, Page};

/// Fixed page size for every article listing.
pub const PER_PAGE: u32 = 20;

const ARTICLE_COLUMNS: &str = "id, title, description, content, source, author, url, image_url, \
                               category, published_at, created_at, updated_at";

const SECONDS_PER_DAY: i64 = 86_400;

// ============================================================================
// Filter Rendering
// ============================================================================

/// Something that can render itself as the WHERE clause of an article query.
pub(crate) trait ArticleWhere {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>);
}

impl ArticleWhere for ArticleFilter {
    fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1");

        if let Some(keyword) = self.keyword.as_deref() {
            let pattern = contains_pattern(keyword);
            builder
                .push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR description LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR content LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(category) = &self.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(source) = &self.source {
            builder.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(date) = self.date {
            let start = date.and_time(NaiveTime::MIN).and_utc().timestamp();
            builder
                .push(" AND published_at >= ")
                .push_bind(start)
                .push(" AND published_at < ")
                .push_bind(start + SECONDS_PER_DAY);
        }
    }
}

/// Build a LIKE pattern matching `needle` anywhere, with `\` as the escape
/// character so user input cannot inject wildcards.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// Upsert
// ============================================================================

/// Insert or update one article keyed on its url, returning the row id.
///
/// Takes a bare connection so the ingestion pipeline can run it inside its
/// run-wide transaction. `created_at` is kept from the first insert and
/// `updated_at` only moves when a stored field actually changed, so an
/// identical re-ingest leaves the row untouched.
pub async fn upsert_article(
    conn: &mut SqliteConnection,
    article: &NewArticle,
) -> Result<i64, DatabaseError> {
    let now = chrono::Utc::now().timestamp();
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO articles (title, description, content, source, author, url,
                              image_url, category, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            content = excluded.content,
            source = excluded.source,
            author = excluded.author,
            image_url = excluded.image_url,
            category = excluded.category,
            published_at = excluded.published_at,
            updated_at = CASE
                WHEN articles.title IS NOT excluded.title
                  OR articles.description IS NOT excluded.description
                  OR articles.content IS NOT excluded.content
                  OR articles.source IS NOT excluded.source
                  OR articles.author IS NOT excluded.author
                  OR articles.image_url IS NOT excluded.image_url
                  OR articles.category IS NOT excluded.category
                  OR articles.published_at IS NOT excluded.published_at
                THEN excluded.updated_at
                ELSE articles.updated_at
            END
        RETURNING id
    "#,
    )
    .bind(&article.title)
    .bind(&article.description)
    .bind(&article.content)
    .bind(&article.source)
    .bind(&article.author)
    .bind(&article.url)
    .bind(&article.image_url)
    .bind(&article.category)
    .bind(article.published_at.timestamp())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

impl Database {
    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Upsert a single article outside of any ingestion run.
    pub async fn upsert_article(&self, article: &NewArticle) -> Result<i64, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        upsert_article(&mut conn, article).await
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get a single article by its ID.
    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// Filtered listing, newest first, [`PER_PAGE`] rows per 1-indexed page.
    ///
    /// Page numbers below 1 are treated as 1.
    pub async fn query_articles(
        &self,
        filter: &ArticleFilter,
        page: u32,
    ) -> Result<Page<Article>, DatabaseError> {
        self.fetch_page(filter, page).await
    }

    /// Total number of stored articles.
    pub async fn count_articles(&self) -> Result<u64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub(crate) async fn fetch_page(
        &self,
        filter: &impl ArticleWhere,
        page: u32,
    ) -> Result<Page<Article>, DatabaseError> {
        let page = page.max(1);

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM articles");
        filter.push_where(&mut count_builder);
        let (total,): (i64,) = count_builder
            .build_query_as()
            .fetch_one(&self.pool)
            .await?;

        let offset = i64::from(page - 1) * i64::from(PER_PAGE);
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY published_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(PER_PAGE))
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<ArticleDbRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        tracing::debug!(page, total, returned = rows.len(), "article page query");

        Ok(Page {
            items: rows.into_iter().map(ArticleDbRow::into_article).collect(),
            total: total.max(0) as u64,
            current_page: page,
            per_page: PER_PAGE,
        })
    }
}
