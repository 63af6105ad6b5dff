//! In-memory browser for unit tests
//!
//! Documents are trees of `FakeNode`s addressed by exact selector strings.
//! Nodes can be revealed by scrolling (lazy lists), navigate on click, or
//! fail on read, which lets tests drive the engine through every path.

use crate::browser::{
    BrowserError, BrowserResult, BrowserSession, CapturedResponse, Element, Page, ResponseFilter,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Viewport height added to the deepest revealed node
const VIEWPORT: f64 = 800.0;

#[derive(Debug, Clone)]
pub enum FakeAction {
    Navigate(String),
    Crash,
}

#[derive(Debug, Clone, Copy)]
pub enum FakeFault {
    Timeout,
    Crash,
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    selectors: Vec<String>,
    text: Option<String>,
    attributes: HashMap<String, String>,
    visible: bool,
    reveal_at: u32,
    children: Vec<FakeNode>,
    on_click: Option<FakeAction>,
    fault: Option<FakeFault>,
}

impl FakeNode {
    pub fn new(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            text: None,
            attributes: HashMap::new(),
            visible: true,
            reveal_at: 0,
            children: Vec::new(),
            on_click: None,
            fault: None,
        }
    }

    /// Also match `selector`
    pub fn alias(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn child(mut self, node: FakeNode) -> Self {
        self.children.push(node);
        self
    }

    /// Only rendered once the page has scrolled `pixels` down
    pub fn revealed_at(mut self, pixels: u32) -> Self {
        self.reveal_at = pixels;
        self
    }

    pub fn on_click(mut self, action: FakeAction) -> Self {
        self.on_click = Some(action);
        self
    }

    pub fn failing(mut self, fault: FakeFault) -> Self {
        self.fault = Some(fault);
        self
    }

    fn matches(&self, css: &str) -> bool {
        css == "*" || self.selectors.iter().any(|s| s == css)
    }

    fn label(&self) -> &str {
        self.selectors.first().map(String::as_str).unwrap_or("?")
    }

    fn collect_matching(&self, css: &str, out: &mut Vec<FakeNode>) {
        for child in &self.children {
            if child.matches(css) {
                out.push(child.clone());
            }
            child.collect_matching(css, out);
        }
    }

    fn check_fault(&self) -> BrowserResult<()> {
        match self.fault {
            Some(FakeFault::Timeout) => Err(BrowserError::Timeout {
                what: self.label().to_string(),
            }),
            Some(FakeFault::Crash) => Err(BrowserError::Protocol("page crashed".to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    status: Option<u16>,
    nodes: Vec<FakeNode>,
    responses: Vec<CapturedResponse>,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self {
            status: Some(200),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn node(mut self, node: FakeNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// A response the page emits to subscribers
    pub fn response(mut self, url: &str, mime_type: &str, body: &[u8]) -> Self {
        self.responses.push(CapturedResponse {
            url: url.to_string(),
            mime_type: mime_type.to_string(),
            body: body.to_vec(),
        });
        self
    }
}

#[derive(Debug, Default)]
pub struct FakeSite {
    documents: HashMap<String, FakeDocument>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, document: FakeDocument) -> Self {
        self.documents.insert(url.to_string(), document);
        self
    }

    fn load(&self, url: &str) -> BrowserResult<FakeDocument> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })
    }
}

struct PageState {
    url: String,
    document: FakeDocument,
    scrolled: u32,
    closed: bool,
    subscribers: Vec<(ResponseFilter, mpsc::Sender<CapturedResponse>)>,
}

impl PageState {
    /// Sends the current document's responses to every subscriber
    fn emit_responses(&mut self) {
        let responses = &self.document.responses;
        self.subscribers.retain(|(filter, tx)| {
            responses
                .iter()
                .filter(|r| filter.accepts(&r.url, &r.mime_type))
                .all(|r| tx.try_send(r.clone()).is_ok())
        });
    }
}

type SharedState = Arc<Mutex<PageState>>;
type ActionLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone)]
pub struct FakeSession {
    site: Arc<FakeSite>,
    pages: Arc<Mutex<Vec<SharedState>>>,
    log: ActionLog,
}

impl FakeSession {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            pages: Arc::new(Mutex::new(Vec::new())),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Clicks and fills performed so far, as `click:<selector>` and
    /// `fill:<selector>=<value>`
    pub fn actions(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    /// Opens a page directly, for tests that need a concrete page handle
    pub fn open(&self, url: &str) -> FakePage {
        let document = self.site.load(url).unwrap();
        self.attach(url, document)
    }

    fn attach(&self, url: &str, document: FakeDocument) -> FakePage {
        let state = Arc::new(Mutex::new(PageState {
            url: url.to_string(),
            document,
            scrolled: 0,
            closed: false,
            subscribers: Vec::new(),
        }));
        self.pages.lock().unwrap().push(Arc::clone(&state));
        FakePage {
            site: Arc::clone(&self.site),
            state,
            log: Arc::clone(&self.log),
        }
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self, url: &str) -> BrowserResult<Box<dyn Page>> {
        let document = self.site.load(url)?;
        Ok(Box::new(self.attach(url, document)))
    }

    async fn new_blank_page(&self) -> BrowserResult<Box<dyn Page>> {
        Ok(Box::new(self.attach("about:blank", FakeDocument::default())))
    }

    async fn open_pages(&self) -> Vec<String> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|state| {
                let state = state.lock().unwrap();
                (!state.closed).then(|| state.url.clone())
            })
            .collect()
    }

    async fn close(&self) -> BrowserResult<()> {
        for state in self.pages.lock().unwrap().iter() {
            state.lock().unwrap().closed = true;
        }
        Ok(())
    }
}

pub struct FakePage {
    site: Arc<FakeSite>,
    state: SharedState,
    log: ActionLog,
}

impl FakePage {
    fn element(&self, node: FakeNode) -> Box<dyn Element> {
        Box::new(FakeElement {
            node,
            site: Arc::clone(&self.site),
            state: Arc::clone(&self.state),
            log: Arc::clone(&self.log),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl Page for FakePage {
    async fn url(&self) -> BrowserResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn status(&self) -> Option<u16> {
        self.state.lock().unwrap().document.status
    }

    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let document = self.site.load(url)?;
        navigate(&self.state, url, document);
        Ok(())
    }

    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let matched = {
            let state = self.state.lock().unwrap();
            if state.closed {
                return Err(BrowserError::Closed);
            }
            let mut matched = Vec::new();
            for node in state.document.nodes.iter().filter(|n| n.reveal_at <= state.scrolled) {
                if node.matches(css) {
                    matched.push(node.clone());
                }
                node.collect_matching(css, &mut matched);
            }
            matched
        };
        Ok(matched.into_iter().map(|node| self.element(node)).collect())
    }

    async fn body_height(&self) -> BrowserResult<f64> {
        let state = self.state.lock().unwrap();
        let deepest = state
            .document
            .nodes
            .iter()
            .filter(|n| n.reveal_at <= state.scrolled)
            .map(|n| n.reveal_at)
            .max()
            .unwrap_or(0);
        Ok(VIEWPORT + deepest as f64)
    }

    async fn scroll_by(&self, pixels: u32) -> BrowserResult<()> {
        self.state.lock().unwrap().scrolled += pixels;
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Ok(b"fake-page".to_vec())
    }

    /// Replays the current document's responses, then those of every
    /// later navigation
    async fn subscribe_responses(
        &self,
        filter: ResponseFilter,
    ) -> BrowserResult<mpsc::Receiver<CapturedResponse>> {
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.state.lock().unwrap();
        for response in state
            .document
            .responses
            .iter()
            .filter(|r| filter.accepts(&r.url, &r.mime_type))
        {
            let _ = tx.try_send(response.clone());
        }
        state.subscribers.push((filter, tx));
        Ok(rx)
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.subscribers.clear();
        Ok(())
    }
}

struct FakeElement {
    node: FakeNode,
    site: Arc<FakeSite>,
    state: SharedState,
    log: ActionLog,
}

#[async_trait]
impl Element for FakeElement {
    async fn query_all(&self, css: &str) -> BrowserResult<Vec<Box<dyn Element>>> {
        let mut matched = Vec::new();
        self.node.collect_matching(css, &mut matched);
        Ok(matched
            .into_iter()
            .map(|node| {
                Box::new(FakeElement {
                    node,
                    site: Arc::clone(&self.site),
                    state: Arc::clone(&self.state),
                    log: Arc::clone(&self.log),
                }) as Box<dyn Element>
            })
            .collect())
    }

    async fn text(&self) -> BrowserResult<Option<String>> {
        self.node.check_fault()?;
        Ok(self.node.text.clone())
    }

    async fn attribute(&self, name: &str) -> BrowserResult<Option<String>> {
        self.node.check_fault()?;
        Ok(self.node.attributes.get(name).cloned())
    }

    async fn is_visible(&self) -> BrowserResult<bool> {
        Ok(self.node.visible)
    }

    async fn click(&self) -> BrowserResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("click:{}", self.node.label()));
        match &self.node.on_click {
            Some(FakeAction::Navigate(url)) => {
                let document = self.site.load(url)?;
                navigate(&self.state, url, document);
                Ok(())
            }
            Some(FakeAction::Crash) => Err(BrowserError::Protocol("page crashed".to_string())),
            None => Ok(()),
        }
    }

    async fn fill(&self, value: &str) -> BrowserResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("fill:{}={}", self.node.label(), value));
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.node.check_fault()?;
        Ok(format!("shot:{}", self.node.label()).into_bytes())
    }
}

fn navigate(state: &SharedState, url: &str, document: FakeDocument) {
    let mut state = state.lock().unwrap();
    state.url = url.to_string();
    state.document = document;
    state.scrolled = 0;
    state.emit_responses();
}
