//! News aggregation core: provider clients, normalization, transactional
//! ingestion, and the listing, preference and feed queries served on top of
//! the stored articles.

pub mod api;
pub mod config;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod storage;
pub mod util;
