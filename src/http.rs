//! HTTP transport helpers shared by the CRL, OCSP and time-stamp clients.
//!
//! All requests are blocking. The `reqwest` blocking client must not be
//! built or dropped on an async runtime thread; async callers should use
//! `tokio::task::spawn_blocking`.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Result, TrustError};

/// Largest response body accepted from any endpoint (16 MB).
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Build a blocking reqwest client from transport settings.
pub fn build_http_client(config: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.additional_headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid HTTP header '{}'", name),
        }
    }

    let client = Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .use_rustls_tls()
        .build()?;
    Ok(client)
}

/// Parse an endpoint URL, accepting only `http` and `https`.
pub fn parse_endpoint(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(TrustError::config(format!(
            "Unsupported URL scheme '{scheme}' in {url}"
        ))),
    }
}

/// Check the status of `response` and read its body.
pub fn read_body(url: &str, response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        debug!("{} answered HTTP {}", url, status);
        return Err(TrustError::http_status(url, status.as_u16()));
    }

    if let Some(len) = response.content_length() {
        if len as usize > MAX_RESPONSE_SIZE {
            return Err(TrustError::decode(format!(
                "Response from {url} is {len} bytes (limit {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let bytes = response.bytes()?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(TrustError::decode(format!(
            "Response from {url} is {} bytes (limit {MAX_RESPONSE_SIZE})",
            bytes.len()
        )));
    }
    Ok(bytes.to_vec())
}
