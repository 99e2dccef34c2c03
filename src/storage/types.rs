use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-layer failures.
///
/// Any of these raised while an ingestion run holds its transaction is fatal
/// to that run: the pipeline rolls back and re-raises.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored JSON column could not be decoded
    #[error("Stored value could not be decoded: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Input Types
// ============================================================================

/// A normalized article ready to be upserted.
///
/// Produced by the normalizer from a provider-specific raw item. Optional
/// fields are `None` rather than empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Conjunctive listing filters. Every `None` field is ignored.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Case-insensitive substring of title, description or content
    pub keyword: Option<String>,
    /// Exact category match
    pub category: Option<String>,
    /// Exact source match
    pub source: Option<String>,
    /// Calendar day (UTC) of `published_at`
    pub date: Option<NaiveDate>,
}

/// The three preference lists a user can store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceSet {
    pub sources: Vec<String>,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for Article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            title: self.title,
            description: self.description,
            content: self.content,
            source: self.source,
            author: self.author,
            url: self.url,
            image_url: self.image_url,
            category: self.category,
            published_at: from_unix(self.published_at),
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
        }
    }
}

/// Internal row type for user_preferences; list columns hold JSON arrays.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PreferenceDbRow {
    pub id: i64,
    pub user_id: i64,
    pub preferred_sources: String,
    pub preferred_categories: String,
    pub preferred_authors: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PreferenceDbRow {
    pub(crate) fn into_preference(self) -> Result<UserPreference, DatabaseError> {
        Ok(UserPreference {
            id: self.id,
            user_id: self.user_id,
            preferred_sources: decode_list("preferred_sources", &self.preferred_sources)?,
            preferred_categories: decode_list("preferred_categories", &self.preferred_categories)?,
            preferred_authors: decode_list("preferred_authors", &self.preferred_authors)?,
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
        })
    }
}

fn decode_list(column: &str, raw: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::Corrupt(format!("{column}: {e}")))
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Data Structures
// ============================================================================

/// Article as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored preference record; at most one per user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreference {
    pub id: i64,
    pub user_id: i64,
    pub preferred_sources: Vec<String>,
    pub preferred_categories: Vec<String>,
    pub preferred_authors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreference {
    pub fn as_set(&self) -> PreferenceSet {
        PreferenceSet {
            sources: self.preferred_sources.clone(),
            categories: self.preferred_categories.clone(),
            authors: self.preferred_authors.clone(),
        }
    }
}

/// One page of a sorted listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of rows matching the filters across all pages
    pub total: u64,
    /// 1-indexed
    pub current_page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn last_page(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }
}
