//! Browser boundary
//!
//! This module defines what the crawl engine needs from a browser:
//! - `BrowserSession` opens pages and reports which pages are still open
//! - `Page` navigates, queries, scrolls, screenshots and streams responses
//! - `Element` reads text/attributes, checks visibility, clicks and types
//!
//! Two backends implement it: `ChromeSession` drives Chromium over the
//! DevTools protocol, `StaticSession` fetches server-rendered HTML.

mod chrome;
#[cfg(test)]
pub mod fake;
mod feed;
mod fetcher;
mod locator;
mod static_html;

pub use chrome::ChromeSession;
pub use feed::{jittered, pause, ResultFeed};
pub use fetcher::{build_http_client, fetch_bytes, fetch_document, FetchedDocument};
pub use locator::Locator;
pub use static_html::StaticSession;

use crate::config::{BackendKind, BrowserConfig};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by browser backends
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Timed out waiting for {what}")]
    Timeout { what: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Operation not supported by this backend: {operation}")]
    Unsupported { operation: String },

    #[error("Page or session already closed")]
    Closed,

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserError>;

/// A network response captured from a page
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub mime_type: String,
    pub body: Vec<u8>,
}

/// Selects which responses a page forwards to a subscriber
#[derive(Debug, Clone)]
pub struct ResponseFilter {
    /// Required MIME type prefix, e.g. `image/`
    pub mime_prefix: String,
    /// Optional URL pattern the response URL must match
    pub url_pattern: Option<Regex>,
}

impl ResponseFilter {
    pub fn images(url_pattern: Option<Regex>) -> Self {
        Self {
            mime_prefix: "image/".to_string(),
            url_pattern,
        }
    }

    pub fn accepts(&self, url: &str, mime_type: &str) -> bool {
        mime_type.starts_with(&self.mime_prefix)
            && self
                .url_pattern
                .as_ref()
                .map_or(true, |pattern| pattern.is_match(url))
    }
}

/// A browser session owning any number of pages
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Opens a new page and navigates it to `url`
    async fn new_page(&self, url: &str) -> BrowserResult<Box<dyn Page>>;

    /// Opens a new page without navigating it
    ///
    /// Response subscriptions made before the first `goto` see every
    /// response of the page's lifetime.
    async fn new_blank_page(&self) -> BrowserResult<Box<dyn Page>>;

    /// URLs of every page that has not been closed yet
    async fn open_pages(&self) -> Vec<String>;

    /// Closes the session and every page it owns
    async fn close(&self) -> BrowserResult<()>;
}

/// One open page (tab)
#[async_trait]
pub trait Page: Send + Sync {
    /// Current URL of the page
    async fn url(&self) -> BrowserResult<String>;

    /// HTTP status of the main document, when the backend knows it
    async fn status(&self) -> Option<u16>;

    /// Navigates to `url` and waits for the document to load
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    /// All elements matching a CSS selector, in document order
    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>>;

    /// Rendered height of the document body in CSS pixels
    async fn body_height(&self) -> BrowserResult<f64>;

    /// Scrolls the viewport down by `pixels`
    async fn scroll_by(&self, pixels: u32) -> BrowserResult<()>;

    /// Screenshot of the visible viewport (PNG)
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;

    /// Streams responses accepted by `filter` until the page closes
    async fn subscribe_responses(
        &self,
        filter: ResponseFilter,
    ) -> BrowserResult<mpsc::Receiver<CapturedResponse>>;

    /// Closes the page, tearing down any response subscriptions
    async fn close(&self) -> BrowserResult<()>;
}

/// A handle to one element of a page
#[async_trait]
pub trait Element: Send + Sync {
    /// Descendants matching a CSS selector
    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>>;

    /// Rendered text content
    async fn text(&self) -> BrowserResult<Option<String>>;

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>>;

    async fn is_visible(&self) -> BrowserResult<bool>;

    async fn click(&self) -> BrowserResult<()>;

    /// Replaces the element's value with `value` by typing it
    async fn fill(&self, value: &str) -> BrowserResult<()>;

    /// Screenshot of the element (PNG)
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;
}

/// The context an extraction or query runs against
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    Page(&'a dyn Page),
    Element(&'a dyn Element),
}

impl<'a> Scope<'a> {
    pub async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        match self {
            Scope::Page(page) => page.query_all(css).await,
            Scope::Element(element) => element.query_all(css).await,
        }
    }

    /// Resolves a locator, applying its text filter if it has one
    pub async fn locate(&self, locator: &Locator) -> BrowserResult<Vec<Box<dyn Element>>> {
        let candidates = self.query_all(&locator.css()).await?;
        let Some(needle) = locator.text_filter() else {
            return Ok(candidates);
        };

        let mut matched = Vec::new();
        for candidate in candidates {
            let text = candidate.text().await?.unwrap_or_default();
            if crate::extract::normalize_whitespace(&text) == needle {
                matched.push(candidate);
            }
        }
        Ok(matched)
    }

    /// The scope's own element, when the scope is an element
    pub fn element(&self) -> Option<&'a dyn Element> {
        match self {
            Scope::Page(_) => None,
            Scope::Element(element) => Some(*element),
        }
    }
}

/// Launches the configured browser backend
pub async fn launch(config: &BrowserConfig) -> BrowserResult<Arc<dyn BrowserSession>> {
    match config.backend {
        BackendKind::Chrome => {
            let session = ChromeSession::launch(config).await?;
            tracing::info!(headless = config.headless, "Chromium session started");
            Ok(Arc::new(session))
        }
        BackendKind::Static => {
            let client = build_http_client(config)
                .map_err(|e| BrowserError::Launch(format!("HTTP client: {e}")))?;
            tracing::info!("Static HTML session started");
            Ok(Arc::new(StaticSession::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_filter_mime() {
        let filter = ResponseFilter::images(None);
        assert!(filter.accepts("https://cdn.example.com/a.jpg", "image/jpeg"));
        assert!(!filter.accepts("https://cdn.example.com/a.js", "application/javascript"));
    }

    #[test]
    fn test_response_filter_pattern() {
        let filter = ResponseFilter::images(Some(Regex::new(r"/photos/.*\.webp$").unwrap()));
        assert!(filter.accepts("https://cdn.example.com/photos/1.webp", "image/webp"));
        assert!(!filter.accepts("https://cdn.example.com/logo.webp", "image/webp"));
    }
}
