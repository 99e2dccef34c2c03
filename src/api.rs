//! Request-level operations behind the listing, detail, preference and feed
//! endpoints.
//!
//! Inputs arrive loosely typed (query strings, JSON bodies) and are validated
//! here; responses are serde-serializable in the paginator shape clients
//! expect. The caller is responsible for authentication and passes the
//! authenticated user's id.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::storage::{Article, ArticleFilter, Database, DatabaseError, Page, PreferenceSet, UserPreference};

pub const ARTICLES_PATH: &str = "/api/articles";
pub const FEED_PATH: &str = "/api/feed";

const PREFERENCE_FIELDS: [&str; 3] = ["sources", "categories", "authors"];

// ============================================================================
// Error Types
// ============================================================================

/// Field-level validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    fn add(&mut self, field: &str, message: String) {
        self.errors.entry(field.to_string()).or_default().push(message);
    }

    fn into_result(mut self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let mut messages = self.errors.values().flatten();
        let first = messages.next().cloned().unwrap_or_default();
        let rest = messages.count();
        self.message = match rest {
            0 => first,
            1 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {n} more errors)"),
        };
        Err(self)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Article {id} not found")]
    NotFound { id: i64 },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ApiError {
    /// HTTP status code this error maps to.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 422,
            ApiError::NotFound { .. } => 404,
            ApiError::Database(_) => 500,
        }
    }

    /// Response body; internal details are not exposed.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ApiError::Validation(e) => serde_json::json!({
                "message": e.message,
                "errors": e.errors,
            }),
            ApiError::NotFound { .. } => serde_json::json!({ "message": "Article not found." }),
            ApiError::Database(_) => serde_json::json!({ "message": "Server Error" }),
        }
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Paginated response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub current_page: u32,
    pub data: Vec<T>,
    pub first_page_url: String,
    /// 1-based index of the first item on this page; `None` when empty
    pub from: Option<u64>,
    pub last_page: u32,
    pub last_page_url: String,
    pub next_page_url: Option<String>,
    pub path: String,
    pub per_page: u32,
    pub prev_page_url: Option<String>,
    pub to: Option<u64>,
    pub total: u64,
}

impl<T> Paginated<T> {
    pub fn from_page(page: Page<T>, path: &str) -> Self {
        let last_page = page.last_page();
        let current = page.current_page;
        let offset = u64::from(current.saturating_sub(1)) * u64::from(page.per_page);
        let count = page.items.len() as u64;
        let url = |n: u32| format!("{path}?page={n}");

        Self {
            current_page: current,
            first_page_url: url(1),
            from: (count > 0).then_some(offset + 1),
            last_page,
            last_page_url: url(last_page),
            next_page_url: (current < last_page).then(|| url(current + 1)),
            path: path.to_string(),
            per_page: page.per_page,
            prev_page_url: (current > 1).then(|| url(current - 1)),
            to: (count > 0).then_some(offset + count),
            total: page.total,
            data: page.items,
        }
    }
}

// ============================================================================
// Articles
// ============================================================================

/// Listing query parameters as received.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    pub page: Option<u32>,
}

impl ListQuery {
    fn to_filter(&self) -> Result<ArticleFilter, ValidationError> {
        let mut errors = ValidationError::default();
        let date = match present(&self.date) {
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.add("date", "The date field must be a valid date.".to_string());
                    None
                }
            },
            None => None,
        };
        errors.into_result()?;

        Ok(ArticleFilter {
            keyword: present(&self.keyword),
            category: present(&self.category),
            source: present(&self.source),
            date,
        })
    }
}

/// Blank query values count as absent.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn list_articles(db: &Database, query: &ListQuery) -> Result<Paginated<Article>, ApiError> {
    let filter = query.to_filter()?;
    let page = db.query_articles(&filter, query.page.unwrap_or(1)).await?;
    Ok(Paginated::from_page(page, ARTICLES_PATH))
}

pub async fn show_article(db: &Database, id: i64) -> Result<Article, ApiError> {
    db.get_article(id).await?.ok_or(ApiError::NotFound { id })
}

// ============================================================================
// Preferences & Feed
// ============================================================================

/// Validate and store the caller's preferences.
///
/// `payload` must carry `sources`, `categories` and `authors`, each an array
/// of strings. An empty array is accepted and clears that list. Values are
/// trimmed, blanks dropped and duplicates removed keeping the first.
pub async fn store_preferences(
    db: &Database,
    user_id: i64,
    payload: &serde_json::Value,
) -> Result<UserPreference, ApiError> {
    let prefs = parse_preferences(payload)?;
    let stored = db.upsert_preferences(user_id, &prefs).await?;
    tracing::info!(
        user_id,
        sources = stored.preferred_sources.len(),
        categories = stored.preferred_categories.len(),
        authors = stored.preferred_authors.len(),
        "Stored preferences"
    );
    Ok(stored)
}

fn parse_preferences(payload: &serde_json::Value) -> Result<PreferenceSet, ValidationError> {
    let mut errors = ValidationError::default();
    let mut lists: [Vec<String>; 3] = Default::default();

    for (field, list) in PREFERENCE_FIELDS.iter().zip(lists.iter_mut()) {
        match payload.get(*field) {
            None | Some(serde_json::Value::Null) => {
                errors.add(field, format!("The {field} field is required."));
            }
            Some(serde_json::Value::Array(items)) => {
                let mut seen = HashSet::new();
                for (index, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(value) => {
                            let value = value.trim();
                            if !value.is_empty() && seen.insert(value.to_string()) {
                                list.push(value.to_string());
                            }
                        }
                        None => errors.add(
                            &format!("{field}.{index}"),
                            format!("The {field}.{index} field must be a string."),
                        ),
                    }
                }
            }
            Some(_) => errors.add(field, format!("The {field} field must be an array.")),
        }
    }
    errors.into_result()?;

    let [sources, categories, authors] = lists;
    Ok(PreferenceSet {
        sources,
        categories,
        authors,
    })
}

pub async fn personalized_feed(
    db: &Database,
    user_id: i64,
    page: Option<u32>,
) -> Result<Paginated<Article>, ApiError> {
    let page = db.feed_for(user_id, page.unwrap_or(1)).await?;
    Ok(Paginated::from_page(page, FEED_PATH))
}
