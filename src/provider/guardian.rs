//! Search provider: a single request with optional query and section.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::http::{endpoint, get_json};
use super::{Provider, ProviderError, RawArticle, RetryPolicy};
use crate::config::GuardianConfig;

const PROVIDER: Provider = Provider::Guardian;

/// One search result as the API returns it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianResult {
    pub web_title: Option<String>,
    pub web_url: Option<String>,
    pub web_publication_date: Option<String>,
    pub section_name: Option<String>,
    #[serde(default)]
    pub fields: GuardianFields,
}

/// The `show-fields=all` extras used by normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianFields {
    pub trail_text: Option<String>,
    pub body_text: Option<String>,
    pub byline: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: Option<SearchResponse>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    results: Vec<GuardianResult>,
}

impl SearchEnvelope {
    /// A missing `response` object means no results.
    fn into_results(self) -> Result<Vec<GuardianResult>, ProviderError> {
        let Some(response) = self.response else {
            return Ok(Vec::new());
        };
        if response.status.as_deref() == Some("error") {
            return Err(ProviderError::Api {
                provider: PROVIDER,
                message: response.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(response.results)
    }
}

#[derive(Debug, Clone)]
pub struct GuardianClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    query: Option<String>,
    section: Option<String>,
    retry: RetryPolicy,
}

impl GuardianClient {
    pub fn new(http: reqwest::Client, config: &GuardianConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().map(SecretString::from),
            query: config.query.clone(),
            section: config.section.clone(),
            retry,
        }
    }

    pub async fn fetch_search(&self) -> Result<Vec<RawArticle>, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or(ProviderError::MissingApiKey { provider: PROVIDER })?;

        let mut url = endpoint(PROVIDER, &self.base_url, &["search"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-key", key.expose_secret());
            if let Some(q) = self.query.as_deref().filter(|q| !q.is_empty()) {
                query.append_pair("q", q);
            }
            if let Some(section) = self.section.as_deref().filter(|s| !s.is_empty()) {
                query.append_pair("section", section);
            }
            query.append_pair("show-fields", "all");
        }

        let what = self.section.as_deref().unwrap_or("search");
        let results = self
            .retry
            .run(PROVIDER, what, || {
                let request = self.http.get(url.clone());
                async move {
                    let body: SearchEnvelope = get_json(PROVIDER, request).await?;
                    body.into_results()
                }
            })
            .await?;

        tracing::debug!(count = results.len(), "Fetched search results");
        Ok(results.into_iter().map(RawArticle::Search).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, query: Option<&str>, section: Option<&str>) -> GuardianClient {
        let config = GuardianConfig {
            api_key: Some("secret".to_string()),
            base_url: server.uri(),
            query: query.map(str::to_string),
            section: section.map(str::to_string),
        };
        GuardianClient::new(reqwest::Client::new(), &config, RetryPolicy::immediate(3))
    }

    fn search_body() -> serde_json::Value {
        serde_json::json!({
            "response": {
                "status": "ok",
                "total": 1,
                "results": [{
                    "id": "technology/2024/nov/08/chips",
                    "webTitle": "Chip shortage eases",
                    "webUrl": "https://www.theguardian.com/technology/2024/nov/08/chips",
                    "webPublicationDate": "2024-11-08T12:00:00Z",
                    "sectionName": "Technology",
                    "fields": {
                        "trailText": "Supply recovers",
                        "bodyText": "Full text",
                        "byline": "Alex Hern",
                        "thumbnail": "https://media.guim.co.uk/chips.jpg"
                    }
                }]
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_search_sends_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("api-key", "secret"))
            .and(query_param("show-fields", "all"))
            .and(query_param("section", "technology"))
            .and(query_param_is_missing("q"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
            .expect(1)
            .mount(&server)
            .await;

        let raw = client_for(&server, None, Some("technology"))
            .fetch_search()
            .await
            .unwrap();
        assert_eq!(raw.len(), 1);
        match &raw[0] {
            RawArticle::Search(result) => {
                assert_eq!(result.web_title.as_deref(), Some("Chip shortage eases"));
                assert_eq!(result.section_name.as_deref(), Some("Technology"));
                assert_eq!(result.fields.byline.as_deref(), Some("Alex Hern"));
            }
            other => panic!("unexpected raw article {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_response_object_means_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let raw = client_for(&server, Some("rust"), None).fetch_search().await.unwrap();
        assert!(raw.is_empty());
    }

    #[tokio::test]
    async fn test_result_without_fields_still_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"status": "ok", "results": [{"webTitle": "T", "webUrl": "https://g.co/t"}]}
            })))
            .mount(&server)
            .await;

        let raw = client_for(&server, None, None).fetch_search().await.unwrap();
        match &raw[0] {
            RawArticle::Search(result) => assert!(result.fields.trail_text.is_none()),
            other => panic!("unexpected raw article {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server, None, None).fetch_search().await.unwrap_err();
        assert!(matches!(err, ProviderError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
            .mount(&server)
            .await;

        let raw = client_for(&server, None, None).fetch_search().await.unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[tokio::test]
    async fn test_network_error_does_not_reveal_api_key() {
        let config = GuardianConfig {
            api_key: Some("guardian-key-0042".to_string()),
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let client = GuardianClient::new(reqwest::Client::new(), &config, RetryPolicy::immediate(1));

        let err = client.fetch_search().await.unwrap_err();
        assert!(matches!(err, ProviderError::Network { .. }));
        assert!(!err.to_string().contains("guardian-key-0042"), "{err}");
        assert!(!format!("{err:?}").contains("guardian-key-0042"), "{err:?}");
    }
}
