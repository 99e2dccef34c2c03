use futures::StreamExt;
use serde::de::DeserializeOwned;
use url::Url;

use super::{Provider, ProviderError};
use crate::config::HttpConfig;

/// Maximum accepted response body (10 MiB).
pub(crate) const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Build the HTTP client shared by all provider clients.
pub fn build_http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.timeout())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("newsline/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Append path segments to a provider base URL.
///
/// `https://newsapi.org/v2` + `["top-headlines"]` gives
/// `https://newsapi.org/v2/top-headlines`. Segments are percent-encoded.
pub(crate) fn endpoint(
    provider: Provider,
    base_url: &str,
    segments: &[&str],
) -> Result<Url, ProviderError> {
    let invalid = |message: String| ProviderError::InvalidEndpoint { provider, message };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| invalid(format!("{base_url} cannot be a base URL")))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Send a GET request and decode a JSON body.
///
/// Non-2xx statuses, oversized bodies and truncated bodies are errors; see
/// [`ProviderError::is_retryable`] for which of them the caller may retry.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: Provider,
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| classify(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            provider,
            status: status.as_u16(),
        });
    }

    let bytes = read_limited_bytes(provider, response, MAX_RESPONSE_SIZE).await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode {
        provider,
        message: e.to_string(),
    })
}

fn classify(provider: Provider, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout { provider }
    } else {
        // The URL carries the api-key query parameter
        ProviderError::Network {
            provider,
            source: error.without_url(),
        }
    }
}

/// Read response body with a size limit to prevent memory exhaustion.
///
/// Checks Content-Length first, then enforces the limit while streaming.
/// A body shorter than its Content-Length is reported as incomplete.
async fn read_limited_bytes(
    provider: Provider,
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ProviderError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(ProviderError::ResponseTooLarge { provider });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify(provider, e))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ProviderError::ResponseTooLarge { provider });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(ProviderError::IncompleteResponse {
                provider,
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
