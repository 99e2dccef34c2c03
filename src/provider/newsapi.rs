//! Headline provider: one request per fixed category, issued concurrently.

use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::http::{endpoint, get_json};
use super::{Provider, ProviderError, RawArticle, RetryPolicy};
use crate::config::NewsApiConfig;

/// Categories requested on every run.
pub const CATEGORIES: [&str; 7] = [
    "business",
    "entertainment",
    "general",
    "health",
    "science",
    "sports",
    "technology",
];

const PROVIDER: Provider = Provider::NewsApi;

/// One headline item as the API returns it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsApiArticle {
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub url_to_image: Option<String>,
    pub published_at: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    status: String,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
    code: Option<String>,
    message: Option<String>,
}

impl HeadlinesResponse {
    fn into_articles(self) -> Result<Vec<NewsApiArticle>, ProviderError> {
        if self.status == "ok" {
            return Ok(self.articles);
        }
        Err(ProviderError::Api {
            provider: PROVIDER,
            message: format!(
                "{}: {}",
                self.code.as_deref().unwrap_or(&self.status),
                self.message.as_deref().unwrap_or("no message")
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    language: String,
    page_size: u32,
    retry: RetryPolicy,
}

impl NewsApiClient {
    pub fn new(http: reqwest::Client, config: &NewsApiConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().map(SecretString::from),
            language: config.language.clone(),
            page_size: config.page_size,
            retry,
        }
    }

    /// Fetch headlines for every category concurrently.
    ///
    /// A category whose request fails (after retries) contributes nothing;
    /// the others still return. Only when every category fails is the last
    /// error returned.
    pub async fn fetch_headlines(&self) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey { provider: PROVIDER })?;

        let requests = CATEGORIES.map(|category| self.fetch_category(key, category));
        let results = join_all(requests).await;

        let mut raw = Vec::new();
        let mut last_error = None;
        let mut failed = 0usize;
        for (category, result) in CATEGORIES.into_iter().zip(results) {
            match result {
                Ok(items) => {
                    tracing::debug!(category, count = items.len(), "Fetched headline category");
                    raw.extend(items.into_iter().map(|item| RawArticle::Headline { category, item }));
                }
                Err(e) => {
                    tracing::error!(
                        provider = %PROVIDER,
                        category,
                        error = %e,
                        "Headline category failed, skipping"
                    );
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failed == CATEGORIES.len() => Err(e),
            _ => Ok(raw),
        }
    }

    async fn fetch_category(
        &self,
        key: &SecretString,
        category: &'static str,
    ) -> Result<Vec<NewsApiArticle>, ProviderError> {
        let mut url = endpoint(PROVIDER, &self.base_url, &["top-headlines"])?;
        url.query_pairs_mut()
            .append_pair("language", &self.language)
            .append_pair("category", category)
            .append_pair("pageSize", &self.page_size.to_string());

        self.retry
            .run(PROVIDER, category, || {
                let request = self
                    .http
                    .get(url.clone())
                    .header("X-Api-Key", key.expose_secret());
                async move {
                    let body: HeadlinesResponse = get_json(PROVIDER, request).await?;
                    body.into_articles()
                }
            })
            .await
    }
}
