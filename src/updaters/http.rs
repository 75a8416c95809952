// Shared HTTP client utilities

use crate::constants::{ALLOWED_CONTENT_TYPES, REQUEST_TIMEOUT_SECS, USER_AGENT};
use anyhow::Result;
use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// Extra request headers, e.g. an authorization token
pub type Headers = BTreeMap<String, String>;

lazy_static::lazy_static! {
    /// Shared HTTP client with proper User-Agent and request timeout
    static ref CLIENT: Client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client");
}

/// Get a reference to the shared HTTP client
pub fn client() -> &'static Client {
    &CLIENT
}

pub fn with_headers(mut request: RequestBuilder, headers: &Headers) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

async fn get(url: &str, headers: &Headers) -> Result<Response> {
    let response = with_headers(CLIENT.get(url), headers).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
        anyhow::bail!("Resource not found: {}", url);
    }

    if !response.status().is_success() {
        anyhow::bail!("HTTP request failed: {} ({})", url, response.status());
    }

    Ok(response)
}

/// Fetch JSON from a URL and deserialize it
pub async fn fetch_json<T: DeserializeOwned>(url: &str, headers: &Headers) -> Result<T> {
    let response = get(url, headers).await?;
    let result = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Malformed JSON from {}: {}", url, e))?;
    Ok(result)
}

/// Fetch a plain text body, trimmed
pub async fn fetch_text(url: &str, headers: &Headers) -> Result<String> {
    let response = get(url, headers).await?;
    Ok(response.text().await?.trim().to_string())
}

/// Join `segments` onto `base` and append a percent-encoded query string
pub fn make_url(base: &str, segments: &[&str], query: &[(&str, &str)]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    if !query.is_empty() {
        let pairs: Vec<String> = query
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();
        url.push('?');
        url.push_str(&pairs.join("&"));
    }
    url
}

/// Main media type of a Content-Type header, lowercased and without parameters
pub fn main_content_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Get content type from response
pub fn get_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get("content-type")
        .and_then(|h| h.to_str().ok())
        .map(main_content_type)
}

/// HEAD the URL and check that it serves a jar-like file
pub async fn is_downloadable(url: &str, headers: &Headers) -> bool {
    let response = match with_headers(CLIENT.head(url), headers).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("Could not reach {}: {}", url, e);
            return false;
        }
    };

    if response.status() != StatusCode::OK {
        error!("{} answered {}, expected 200", url, response.status());
        return false;
    }

    match get_content_type(&response) {
        Some(content_type) if ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) => {
            debug!("{} serves {}", url, content_type);
            true
        }
        other => {
            error!(
                "{} is not a downloadable file (content type {})",
                url,
                other.as_deref().unwrap_or("missing")
            );
            false
        }
    }
}
