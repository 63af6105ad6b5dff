//! Static HTML backend
//!
//! Serves the browser boundary from server-rendered HTML fetched with
//! `reqwest` and queried with `scraper`. There is no layout engine: the body
//! height is constant, scrolling does nothing, and clicks only follow links.

use crate::browser::{
    fetch_document, BrowserError, BrowserResult, BrowserSession, CapturedResponse, Element,
    FetchedDocument, Page, ResponseFilter,
};
use crate::extract::normalize_whitespace;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use url::Url;

#[derive(Debug)]
struct Document {
    url: String,
    status: Option<u16>,
    html: String,
    closed: bool,
}

impl From<FetchedDocument> for Document {
    fn from(fetched: FetchedDocument) -> Self {
        Self {
            url: fetched.final_url,
            status: Some(fetched.status_code),
            html: fetched.body,
            closed: false,
        }
    }
}

type SharedDocument = Arc<Mutex<Document>>;

/// Session over plain HTTP
pub struct StaticSession {
    client: Client,
    pages: Mutex<Vec<SharedDocument>>,
}

impl StaticSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pages: Mutex::new(Vec::new()),
        }
    }

    fn register(&self, document: Document) -> BrowserResult<Box<dyn Page>> {
        let document = Arc::new(Mutex::new(document));

        let mut pages = self
            .pages
            .lock()
            .map_err(|_| BrowserError::Protocol("page registry poisoned".to_string()))?;
        pages.retain(|page| page.lock().map(|d| !d.closed).unwrap_or(false));
        pages.push(Arc::clone(&document));

        Ok(Box::new(StaticPage {
            client: self.client.clone(),
            document,
        }))
    }
}

#[async_trait]
impl BrowserSession for StaticSession {
    async fn new_page(&self, url: &str) -> BrowserResult<Box<dyn Page>> {
        let fetched = fetch_document(&self.client, url).await?;
        self.register(Document::from(fetched))
    }

    async fn new_blank_page(&self) -> BrowserResult<Box<dyn Page>> {
        self.register(Document {
            url: "about:blank".to_string(),
            status: None,
            html: String::new(),
            closed: false,
        })
    }

    async fn open_pages(&self) -> Vec<String> {
        let Ok(pages) = self.pages.lock() else {
            return Vec::new();
        };
        pages
            .iter()
            .filter_map(|page| {
                let doc = page.lock().ok()?;
                (!doc.closed).then(|| doc.url.clone())
            })
            .collect()
    }

    async fn close(&self) -> BrowserResult<()> {
        let pages = self
            .pages
            .lock()
            .map_err(|_| BrowserError::Protocol("page registry poisoned".to_string()))?;
        for page in pages.iter() {
            lock(page)?.closed = true;
        }
        Ok(())
    }
}

/// One fetched document
#[derive(Clone)]
pub struct StaticPage {
    client: Client,
    document: SharedDocument,
}

impl StaticPage {
    fn snapshot(&self) -> BrowserResult<(String, String)> {
        let doc = lock(&self.document)?;
        if doc.closed {
            return Err(BrowserError::Closed);
        }
        Ok((doc.url.clone(), doc.html.clone()))
    }

    fn wrap(&self, nodes: Vec<NodeSnapshot>) -> Vec<Box<dyn Element>> {
        nodes
            .into_iter()
            .map(|node| {
                Box::new(StaticElement {
                    node,
                    page: self.clone(),
                }) as Box<dyn Element>
            })
            .collect()
    }
}

#[async_trait]
impl Page for StaticPage {
    async fn url(&self) -> BrowserResult<String> {
        Ok(lock(&self.document)?.url.clone())
    }

    async fn status(&self) -> Option<u16> {
        self.document.lock().ok().and_then(|doc| doc.status)
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let fetched = fetch_document(&self.client, url).await?;
        let mut doc = lock(&self.document)?;
        if doc.closed {
            return Err(BrowserError::Closed);
        }
        *doc = Document::from(fetched);
        Ok(())
    }

    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let (_, html) = self.snapshot()?;
        let nodes = select_in_document(&html, css)?;
        Ok(self.wrap(nodes))
    }

    async fn body_height(&self) -> BrowserResult<f64> {
        Ok(0.0)
    }

    async fn scroll_by(&self, _pixels: u32) -> BrowserResult<()> {
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Err(unsupported("page screenshot"))
    }

    async fn subscribe_responses(
        &self,
        _filter: ResponseFilter,
    ) -> BrowserResult<mpsc::Receiver<CapturedResponse>> {
        Err(unsupported("response events"))
    }

    async fn close(&self) -> BrowserResult<()> {
        lock(&self.document)?.closed = true;
        Ok(())
    }
}

/// Owned copy of one parsed element
#[derive(Debug, Clone)]
struct NodeSnapshot {
    html: String,
    text: String,
    attributes: HashMap<String, String>,
    visible: bool,
}

struct StaticElement {
    node: NodeSnapshot,
    page: StaticPage,
}

#[async_trait]
impl Element for StaticElement {
    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let nodes = select_in_fragment(&self.node.html, css)?;
        Ok(self.page.wrap(nodes))
    }

    async fn text(&self) -> BrowserResult<Option<String>> {
        Ok(Some(self.node.text.clone()).filter(|t| !t.is_empty()))
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        Ok(self.node.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> BrowserResult<bool> {
        Ok(self.node.visible)
    }

    async fn click(&self) -> BrowserResult<()> {
        let Some(href) = self.node.attributes.get("href") else {
            return Err(unsupported("click on an element that is not a link"));
        };
        let base = self.page.url().await?;
        let target = Url::parse(&base)
            .and_then(|base| base.join(href))
            .map_err(|e| BrowserError::Navigation {
                url: href.clone(),
                message: e.to_string(),
            })?;
        self.page.goto(target.as_str()).await
    }

    async fn fill(&self, _value: &str) -> BrowserResult<()> {
        Err(unsupported("typing"))
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Err(unsupported("element screenshot"))
    }
}

fn lock(document: &SharedDocument) -> BrowserResult<MutexGuard<'_, Document>> {
    document
        .lock()
        .map_err(|_| BrowserError::Protocol("document state poisoned".to_string()))
}

fn unsupported(operation: &str) -> BrowserError {
    BrowserError::Unsupported {
        operation: operation.to_string(),
    }
}

fn parse_selector(css: &str) -> BrowserResult<Selector> {
    Selector::parse(css).map_err(|e| BrowserError::InvalidSelector(format!("{css}: {e:?}")))
}

fn select_in_document(html: &str, css: &str) -> BrowserResult<Vec<NodeSnapshot>> {
    let selector = parse_selector(css)?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).map(snapshot).collect())
}

/// Selects descendants of the single element serialised in `fragment`
fn select_in_fragment(fragment: &str, css: &str) -> BrowserResult<Vec<NodeSnapshot>> {
    let selector = parse_selector(css)?;
    let document = Html::parse_fragment(fragment);
    let Some(root) = document.root_element().children().find_map(ElementRef::wrap) else {
        return Ok(Vec::new());
    };
    Ok(root
        .select(&selector)
        .filter(|element| element.id() != root.id())
        .map(snapshot)
        .collect())
}

fn snapshot(element: ElementRef<'_>) -> NodeSnapshot {
    let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    let attributes = element
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    let visible = !is_hidden(element)
        && !element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(is_hidden);

    NodeSnapshot {
        html: element.html(),
        text,
        attributes,
        visible,
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() || value.attr("type") == Some("hidden") {
        return true;
    }
    value.attr("style").is_some_and(|style| {
        let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.to_lowercase();
        compact.contains("display:none") || compact.contains("visibility:hidden")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::build_http_client;
    use crate::config::BrowserConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULTS: &str = r#"
        <html><head><title>Resultados</title></head><body>
          <article class="card" data-id="1">
            <a class="link" href="/imovel/1">Casa</a>
            <span class="price">R$ 450.000</span>
          </article>
          <article class="card" data-id="2" style="display: none">
            <span class="price">R$ 1</span>
          </article>
          <a class="next" href="/busca?page=2">Próxima</a>
        </body></html>"#;

    #[test]
    fn test_fragment_excludes_scope_element() {
        let html = r#"<div class="card"><div class="card">inner</div></div>"#;
        let nested = select_in_fragment(html, ".card").unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].text, "inner");
    }

    #[test]
    fn test_hidden_ancestor_hides_descendants() {
        let nodes = select_in_document(RESULTS, ".price").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].visible);
        assert!(!nodes[1].visible);
    }

    #[test]
    fn test_invalid_selector() {
        let err = select_in_document(RESULTS, "div[").unwrap_err();
        assert!(matches!(err, BrowserError::InvalidSelector(_)));
    }

    async fn serve() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busca"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/imovel/1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<h1 class=\"title\">Casa térrea</h1>"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_query_and_follow_link() {
        let server = serve().await;
        let client = build_http_client(&BrowserConfig::default()).unwrap();
        let session = StaticSession::new(client);

        let page = session
            .new_page(&format!("{}/busca", server.uri()))
            .await
            .unwrap();
        assert_eq!(page.status().await, Some(200));

        let cards = page.query_all(".card").await.unwrap();
        assert_eq!(cards.len(), 2);
        let price = cards[0].query_all(".price").await.unwrap();
        assert_eq!(price[0].text().await.unwrap().as_deref(), Some("R$ 450.000"));

        let links = cards[0].query_all("a.link").await.unwrap();
        links[0].click().await.unwrap();
        assert!(page.url().await.unwrap().ends_with("/imovel/1"));
        let title = page.query_all(".title").await.unwrap();
        assert_eq!(title[0].text().await.unwrap().as_deref(), Some("Casa térrea"));
    }

    #[tokio::test]
    async fn test_open_pages_tracks_close() {
        let server = serve().await;
        let client = build_http_client(&BrowserConfig::default()).unwrap();
        let session = StaticSession::new(client);

        let page = session
            .new_page(&format!("{}/busca", server.uri()))
            .await
            .unwrap();
        assert_eq!(session.open_pages().await.len(), 1);

        page.close().await.unwrap();
        assert!(session.open_pages().await.is_empty());
        assert!(matches!(
            page.query_all(".card").await,
            Err(BrowserError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let server = serve().await;
        let client = build_http_client(&BrowserConfig::default()).unwrap();
        let session = StaticSession::new(client);
        let page = session
            .new_page(&format!("{}/busca", server.uri()))
            .await
            .unwrap();

        assert!(matches!(
            page.screenshot().await,
            Err(BrowserError::Unsupported { .. })
        ));
        let cards = page.query_all(".card").await.unwrap();
        assert!(matches!(
            cards[0].fill("x").await,
            Err(BrowserError::Unsupported { .. })
        ));
    }
}
