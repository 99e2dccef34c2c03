//! Top-stories provider: one request for the configured section.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::http::{endpoint, get_json};
use super::{Provider, ProviderError, RawArticle, RetryPolicy};
use crate::config::NytConfig;

const PROVIDER: Provider = Provider::Nyt;

/// One top story as the API returns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NytStory {
    pub section: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub summary: Option<String>,
    pub url: Option<String>,
    pub byline: Option<String>,
    pub published_date: Option<String>,
    /// The API sends `null` for stories without images.
    pub multimedia: Option<Vec<NytMedia>>,
}

impl NytStory {
    /// URL of the first multimedia entry, if any.
    pub fn first_image(&self) -> Option<&str> {
        self.multimedia.as_ref()?.first()?.url.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NytMedia {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopStoriesResponse {
    status: Option<String>,
    #[serde(default)]
    results: Vec<NytStory>,
    fault: Option<serde_json::Value>,
}

impl TopStoriesResponse {
    fn into_stories(self) -> Result<Vec<NytStory>, ProviderError> {
        if let Some(fault) = self.fault {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: fault.to_string(),
            });
        }
        if self.status.as_deref() == Some("ERROR") {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: "status ERROR".to_string(),
            });
        }
        Ok(self.results)
    }
}

#[derive(Debug, Clone)]
pub struct NytClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    section: String,
    retry: RetryPolicy,
}

impl NytClient {
    pub fn new(http: reqwest::Client, config: &NytConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().map(SecretString::from),
            section: config.section.clone(),
            retry,
        }
    }

    pub async fn fetch_top_stories(&self) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey { provider: PROVIDER })?;

        let file = format!("{}.json", self.section);
        let mut url = endpoint(PROVIDER, &self.base_url, &["topstories", "v2", file.as_str()])?;
        url.query_pairs_mut().append_pair("api-key", key.expose_secret());

        let stories = self
            .retry
            .run(PROVIDER, &self.section, || {
                let request = self.http.get(url.clone());
                async move {
                    let body: TopStoriesResponse = get_json(PROVIDER, request).await?;
                    body.into_stories()
                }
            })
            .await?;

        tracing::debug!(section = %self.section, count = stories.len(), "Fetched top stories");
        Ok(stories.into_iter().map(RawArticle::TopStory).collect())
    }
}
