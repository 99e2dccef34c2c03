//! SQLite persistence for normalized articles and per-user preferences.

mod articles;
mod preferences;
mod schema;
mod types;

pub use articles::{upsert_article, PER_PAGE};
pub use schema::Database;
pub use types::{
    Article, ArticleFilter, DatabaseError, NewArticle, Page, PreferenceSet, UserPreference,
};
