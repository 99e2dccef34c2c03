//! Clients for the three upstream news APIs.
//!
//! Each provider has its own query shape, authentication and response
//! schema. The raw schemas stay inside this module and [`crate::normalize`];
//! everything past the normalizer sees only [`crate::storage::NewArticle`].
//!
//! - [`newsapi`] - headline API, one concurrent request per category
//! - [`guardian`] - search API, single request
//! - [`nyt`] - top-stories API, single request per section
//!
//! All requests go through [`RetryPolicy`] and share one `reqwest::Client`
//! built by [`build_http_client`] with bounded connect and total timeouts.

mod http;
pub mod guardian;
pub mod newsapi;
pub mod nyt;
mod retry;

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::Config;

pub use guardian::GuardianClient;
pub use http::build_http_client;
pub use newsapi::NewsApiClient;
pub use nyt::NytClient;
pub use retry::RetryPolicy;

// ============================================================================
// Provider Identity
// ============================================================================

/// The upstream providers, in the order an ingestion run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    /// Headline aggregator (NewsAPI)
    NewsApi,
    /// Search API (The Guardian)
    Guardian,
    /// Top-stories API (New York Times)
    Nyt,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::NewsApi, Provider::Guardian, Provider::Nyt];

    /// Source name stored on every article from this provider.
    pub fn name(self) -> &'static str {
        match self {
            Provider::NewsApi => "NewsAPI",
            Provider::Guardian => "Guardian",
            Provider::Nyt => "NYT",
        }
    }
}

impl Serialize for Provider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by a provider client.
///
/// Every variant names the provider so a log line alone identifies the
/// failing upstream.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("{provider}: request failed: {source}")]
    Network {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    /// Connect or total request timeout elapsed
    #[error("{provider}: request timed out")]
    Timeout { provider: Provider },
    /// HTTP response with non-2xx status code
    #[error("{provider}: HTTP error: status {status}")]
    HttpStatus { provider: Provider, status: u16 },
    /// Response body exceeded the size limit
    #[error("{provider}: response too large")]
    ResponseTooLarge { provider: Provider },
    /// Fewer bytes arrived than Content-Length announced
    #[error("{provider}: incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse {
        provider: Provider,
        expected: u64,
        received: usize,
    },
    /// Body was not the JSON shape this provider documents
    #[error("{provider}: invalid response body: {message}")]
    Decode { provider: Provider, message: String },
    /// Provider answered 2xx but reported an error in its envelope
    #[error("{provider}: API error: {message}")]
    Api { provider: Provider, message: String },
    /// No API key configured for this provider
    #[error("{provider}: no API key configured")]
    MissingApiKey { provider: Provider },
    /// The request URL could not be built from the base URL
    #[error("{provider}: invalid endpoint: {message}")]
    InvalidEndpoint { provider: Provider, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderError::Network { provider, .. }
            | ProviderError::Timeout { provider }
            | ProviderError::HttpStatus { provider, .. }
            | ProviderError::ResponseTooLarge { provider }
            | ProviderError::IncompleteResponse { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::MissingApiKey { provider }
            | ProviderError::InvalidEndpoint { provider, .. } => *provider,
        }
    }

    /// Returns true if this error is transient and the request should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::IncompleteResponse { .. } => true,
            ProviderError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            ProviderError::ResponseTooLarge { .. }
            | ProviderError::Decode { .. }
            | ProviderError::Api { .. }
            | ProviderError::MissingApiKey { .. }
            | ProviderError::InvalidEndpoint { .. } => false,
        }
    }
}

// ============================================================================
// Raw Articles
// ============================================================================

/// A provider-specific item as received, before normalization.
#[derive(Debug, Clone)]
pub enum RawArticle {
    /// Headline item plus the category its batch was requested for
    Headline {
        category: &'static str,
        item: newsapi::NewsApiArticle,
    },
    Search(guardian::GuardianResult),
    TopStory(nyt::NytStory),
}

impl RawArticle {
    pub fn provider(&self) -> Provider {
        match self {
            RawArticle::Headline { .. } => Provider::NewsApi,
            RawArticle::Search(_) => Provider::Guardian,
            RawArticle::TopStory(_) => Provider::Nyt,
        }
    }
}

// ============================================================================
// Client Dispatch
// ============================================================================

/// One configured provider client; dispatch is by provider identity.
#[derive(Debug, Clone)]
pub enum ProviderClient {
    Headlines(NewsApiClient),
    Search(GuardianClient),
    TopStories(NytClient),
}

impl ProviderClient {
    /// Build all three clients in run order (headline, search, top-stories).
    pub fn all_from_config(config: &Config, http: &reqwest::Client) -> Vec<ProviderClient> {
        let retry = RetryPolicy::from(&config.retry);
        vec![
            ProviderClient::Headlines(NewsApiClient::new(
                http.clone(),
                &config.newsapi,
                retry.clone(),
            )),
            ProviderClient::Search(GuardianClient::new(
                http.clone(),
                &config.guardian,
                retry.clone(),
            )),
            ProviderClient::TopStories(NytClient::new(http.clone(), &config.nyt, retry)),
        ]
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProviderClient::Headlines(_) => Provider::NewsApi,
            ProviderClient::Search(_) => Provider::Guardian,
            ProviderClient::TopStories(_) => Provider::Nyt,
        }
    }

    /// Fetch this provider's raw items for one run.
    ///
    /// Retries have already been spent when this returns an error.
    pub async fn fetch(&self) -> Result<Vec<RawArticle>, ProviderError> {
        match self {
            ProviderClient::Headlines(client) => client.fetch_headlines().await,
            ProviderClient::Search(client) => client.fetch_search().await,
            ProviderClient::TopStories(client) => client.fetch_top_stories().await,
        }
    }
}
