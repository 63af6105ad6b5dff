//! Chromium backend over the DevTools protocol

use crate::browser::{
    BrowserError, BrowserResult, BrowserSession, CapturedResponse, Element, Page, ResponseFilter,
};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const BODY_HEIGHT_JS: &str = "document.body ? document.body.offsetHeight : 0";
const NAVIGATION_STATUS_JS: &str = "(() => { \
    const entry = performance.getEntriesByType('navigation')[0]; \
    return entry && entry.responseStatus ? entry.responseStatus : null; })()";
const IS_VISIBLE_JS: &str = "function() { \
    const style = window.getComputedStyle(this); \
    const rect = this.getBoundingClientRect(); \
    return style.visibility !== 'hidden' && style.display !== 'none' \
        && rect.width > 0 && rect.height > 0; }";
const CLEAR_VALUE_JS: &str = "function() { if ('value' in this) { this.value = ''; } }";

/// Chromium session
pub struct ChromeSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    /// Launches Chromium and starts driving its event loop
    pub async fn launch(config: &BrowserConfig) -> BrowserResult<Self> {
        let mut builder = ChromeConfig::builder()
            .request_timeout(Duration::from_secs(config.navigation_timeout_secs));

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        if let (Some(width), Some(height)) = (config.window_width, config.window_height) {
            builder = builder.window_size(width, height);
        }

        let mut args = config.args.clone();
        if let Some(user_agent) = &config.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        if !args.is_empty() {
            builder = builder.args(args);
        }

        let chrome_config = builder.build().map_err(BrowserError::Launch)?;
        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Chromium handler stopped");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn new_page(&self, url: &str) -> BrowserResult<Box<dyn Page>> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(ChromePage {
            page,
            listeners: StdMutex::new(Vec::new()),
        }))
    }

    async fn new_blank_page(&self) -> BrowserResult<Box<dyn Page>> {
        self.new_page("about:blank").await
    }

    async fn open_pages(&self) -> Vec<String> {
        let browser = self.browser.lock().await;
        let Ok(pages) = browser.pages().await else {
            return Vec::new();
        };
        let mut urls = Vec::with_capacity(pages.len());
        for page in pages {
            if let Ok(Some(url)) = page.url().await {
                urls.push(url);
            }
        }
        urls
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.map_err(map_cdp)?;
        self.handler.abort();
        Ok(())
    }
}

/// One Chromium tab
pub struct ChromePage {
    page: chromiumoxide::Page,
    listeners: StdMutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl Page for ChromePage {
    async fn url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await.map_err(map_cdp)?.unwrap_or_default())
    }

    async fn status(&self) -> Option<u16> {
        let result = self.page.evaluate(NAVIGATION_STATUS_JS).await.ok()?;
        result.into_value::<Option<u16>>().ok().flatten()
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let elements = self.page.find_elements(css).await.map_err(map_cdp)?;
        Ok(wrap(elements))
    }

    async fn body_height(&self) -> BrowserResult<f64> {
        self.page
            .evaluate(BODY_HEIGHT_JS)
            .await
            .map_err(map_cdp)?
            .into_value::<f64>()
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn scroll_by(&self, pixels: u32) -> BrowserResult<()> {
        let script = format!("window.scrollBy(0, {pixels})");
        self.page.evaluate(script.as_str()).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(map_cdp)
    }

    async fn subscribe_responses(
        &self,
        filter: ResponseFilter,
    ) -> BrowserResult<mpsc::Receiver<CapturedResponse>> {
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(map_cdp)?;
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(map_cdp)?;

        let (tx, rx) = mpsc::channel(32);
        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let response = &event.response;
                if !filter.accepts(&response.url, &response.mime_type) {
                    continue;
                }
                let body = match page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(url = %response.url, error = %e, "Response body unavailable");
                        continue;
                    }
                };
                let bytes = if body.result.base64_encoded {
                    match STANDARD.decode(&body.result.body) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::debug!(url = %response.url, error = %e, "Undecodable response body");
                            continue;
                        }
                    }
                } else {
                    body.result.body.clone().into_bytes()
                };
                let captured = CapturedResponse {
                    url: response.url.clone(),
                    mime_type: response.mime_type.clone(),
                    body: bytes,
                };
                if tx.send(captured).await.is_err() {
                    break;
                }
            }
        });

        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(task);
        }
        Ok(rx)
    }

    async fn close(&self) -> BrowserResult<()> {
        if let Ok(mut listeners) = self.listeners.lock() {
            for task in listeners.drain(..) {
                task.abort();
            }
        }
        self.page.clone().close().await.map_err(map_cdp)
    }
}

/// One element of a Chromium tab
pub struct ChromeElement {
    element: chromiumoxide::Element,
}

#[async_trait]
impl Element for ChromeElement {
    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let elements = self.element.find_elements(css).await.map_err(map_cdp)?;
        Ok(wrap(elements))
    }

    async fn text(&self) -> BrowserResult<Option<String>> {
        self.element.inner_text().await.map_err(map_cdp)
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        self.element.attribute(name).await.map_err(map_cdp)
    }

    async fn is_visible(&self) -> BrowserResult<bool> {
        let returns = self
            .element
            .call_js_fn(IS_VISIBLE_JS, false)
            .await
            .map_err(map_cdp)?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    async fn click(&self) -> BrowserResult<()> {
        self.element.scroll_into_view().await.map_err(map_cdp)?;
        self.element.click().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn fill(&self, value: &str) -> BrowserResult<()> {
        self.element
            .call_js_fn(CLEAR_VALUE_JS, false)
            .await
            .map_err(map_cdp)?;
        self.element.click().await.map_err(map_cdp)?;
        self.element.type_str(value).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(map_cdp)
    }
}

fn wrap(elements: Vec<chromiumoxide::Element>) -> Vec<Box<dyn Element>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromeElement { element }) as Box<dyn Element>)
        .collect()
}

fn map_cdp(err: CdpError) -> BrowserError {
    match err {
        CdpError::Timeout => BrowserError::Timeout {
            what: "devtools response".to_string(),
        },
        other => BrowserError::Protocol(other.to_string()),
    }
}
