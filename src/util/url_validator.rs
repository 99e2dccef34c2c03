use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a provider base URL.
///
/// API keys travel with every provider request, so a base URL that would
/// send them in clear text is rejected up front.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain http to a host other than the loopback interface.
    #[error("HTTPS required for non-local host: {0}")]
    InsecureScheme(String),
}

/// Validates a provider base URL.
///
/// Accepts any `https://` URL. Plain `http://` is accepted only for
/// loopback hosts (`localhost`, `127.0.0.1`, `::1`), which is how tests point
/// clients at a mock server.
///
/// # Examples
///
/// ```
/// use newsline::util::validate_base_url;
///
/// assert!(validate_base_url("https://newsapi.org/v2").is_ok());
/// assert!(validate_base_url("http://127.0.0.1:4000").is_ok());
/// assert!(validate_base_url("http://newsapi.org/v2").is_err());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(&url) => {
            tracing::warn!(base_url = %url, "Using non-HTTPS provider base URL (localhost only)");
            Ok(url)
        }
        "http" => Err(UrlValidationError::InsecureScheme(
            url.host_str().unwrap_or_default().to_owned(),
        )),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_loopback_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host == "localhost" {
        return true;
    }
    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
