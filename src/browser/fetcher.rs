//! HTTP fetcher
//!
//! This module handles plain HTTP requests made outside a real browser:
//! - Building the shared HTTP client with the configured user agent
//! - GET requests for server-rendered documents (static backend)
//! - Binary downloads for listing pictures

use crate::browser::{BrowserError, BrowserResult};
use crate::config::BrowserConfig;
use reqwest::Client;
use std::time::Duration;

/// User agent used when the configuration does not set one
pub const DEFAULT_USER_AGENT: &str = concat!("casa-ripple/", env!("CARGO_PKG_VERSION"));

/// A fetched HTML document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub final_url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Content-Type header value
    pub content_type: String,
    /// Document body
    pub body: String,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The browser configuration (user agent and navigation timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &BrowserConfig) -> Result<Client, reqwest::Error> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.navigation_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a document
///
/// Non-success statuses are returned as documents so callers can recognise
/// not-found pages; only transport failures are errors.
pub async fn fetch_document(client: &Client, url: &str) -> BrowserResult<FetchedDocument> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status_code = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = response.text().await.map_err(|e| classify_error(url, e))?;

    Ok(FetchedDocument {
        final_url,
        status_code,
        content_type,
        body,
    })
}

/// Downloads a binary resource, failing on non-success statuses
pub async fn fetch_bytes(client: &Client, url: &str) -> BrowserResult<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BrowserError::Navigation {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| classify_error(url, e))?;
    Ok(bytes.to_vec())
}

fn classify_error(url: &str, err: reqwest::Error) -> BrowserError {
    if err.is_timeout() {
        BrowserError::Timeout {
            what: format!("response from {url}"),
        }
    } else if err.is_connect() {
        BrowserError::Navigation {
            url: url.to_string(),
            message: "Connection refused".to_string(),
        }
    } else {
        BrowserError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        let config = BrowserConfig::default();
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_document_keeps_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<h1>Not found</h1>"))
            .mount(&server)
            .await;

        let client = build_http_client(&BrowserConfig::default()).unwrap();
        let doc = fetch_document(&client, &format!("{}/gone", server.uri()))
            .await
            .unwrap();
        assert_eq!(doc.status_code, 404);
        assert!(doc.body.contains("Not found"));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = build_http_client(&BrowserConfig::default()).unwrap();
        let result = fetch_bytes(&client, &format!("{}/photo.jpg", server.uri())).await;
        assert!(matches!(result, Err(BrowserError::Navigation { .. })));
    }
}
