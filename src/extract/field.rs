//! The FieldExtractor contract and its declarative implementation

use crate::browser::{Element, Locator, Scope};
use crate::config::FieldRule;
use crate::extract::{
    normalize_whitespace, parse_decimal, parse_flag, parse_integer, parse_timestamp,
    visible_count, visible_first, FieldError, FieldKind, FieldResult, FieldValue,
};
use crate::ConfigError;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

/// Pulls one named value out of a page or element
///
/// Returns `Ok(None)` when the field genuinely does not apply. Implementations
/// raise `FieldError::Hidden` for elements that are not rendered and
/// `FieldError::Timeout` when a value never became available.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, scope: Scope<'_>) -> FieldResult<Option<FieldValue>>;
}

/// How a declarative field turns its raw text into a value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseKind {
    #[default]
    Text,
    Integer,
    Decimal,
    Flag,
    /// Whether a visible element matches the selector
    Presence,
    Timestamp,
    /// PNG screenshot of the element
    Screenshot,
    /// Link resolved against the site URL
    Url,
}

impl ParseKind {
    /// Kind of value this parser yields
    pub fn produces(&self) -> FieldKind {
        match self {
            Self::Text | Self::Url => FieldKind::Text,
            Self::Integer => FieldKind::Integer,
            Self::Decimal => FieldKind::Decimal,
            Self::Flag | Self::Presence => FieldKind::Flag,
            Self::Timestamp => FieldKind::Timestamp,
            Self::Screenshot => FieldKind::Bytes,
        }
    }
}

/// Where the raw text of a field comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    Text,
    Attribute(String),
}

/// Field extracted by locating an element and parsing its text or attribute
#[derive(Debug, Clone)]
pub struct SelectorField {
    locator: Option<Locator>,
    source: FieldSource,
    parse: ParseKind,
    pattern: Option<Regex>,
    format: Option<String>,
    base_url: Option<Url>,
}

impl SelectorField {
    /// A field reading the text of `locator`, or of the scope itself
    pub fn new(locator: Option<Locator>, parse: ParseKind) -> Self {
        Self {
            locator,
            source: FieldSource::Text,
            parse,
            pattern: None,
            format: None,
            base_url: None,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.source = FieldSource::Attribute(name.into());
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn parse_kind(&self) -> ParseKind {
        self.parse
    }

    /// Builds a field from its configuration rule
    pub fn from_rule(rule: &FieldRule, base_url: Option<&Url>) -> Result<Self, ConfigError> {
        let mut field = Self::new(rule.selector.clone(), rule.parse);
        if let Some(attribute) = &rule.attribute {
            field = field.attribute(attribute.clone());
        }
        if let Some(pattern) = &rule.pattern {
            let regex = Regex::new(pattern)
                .map_err(|e| ConfigError::InvalidPattern(format!("{pattern}: {e}")))?;
            field = field.pattern(regex);
        }
        if let Some(format) = &rule.format {
            field = field.format(format.clone());
        }
        if let Some(base) = base_url {
            field = field.base_url(base.clone());
        }
        Ok(field)
    }

    async fn read(&self, element: &dyn Element) -> FieldResult<Option<String>> {
        let raw = match &self.source {
            FieldSource::Text => element.text().await?,
            FieldSource::Attribute(name) => element.attribute(name).await?,
        };
        Ok(raw
            .map(|value| normalize_whitespace(&value))
            .filter(|value| !value.is_empty()))
    }

    fn apply_pattern(&self, raw: String) -> FieldResult<String> {
        let Some(pattern) = &self.pattern else {
            return Ok(raw);
        };
        let captures = pattern.captures(&raw).ok_or_else(|| {
            FieldError::Value(format!("'{raw}' does not match /{}/", pattern.as_str()))
        })?;
        let matched = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Ok(matched)
    }

    fn convert(&self, text: String) -> FieldResult<FieldValue> {
        match self.parse {
            ParseKind::Text => Ok(FieldValue::Text(text)),
            ParseKind::Integer => parse_integer(&text).map(FieldValue::Integer),
            ParseKind::Decimal => parse_decimal(&text).map(FieldValue::Decimal),
            ParseKind::Flag => parse_flag(&text).map(FieldValue::Flag),
            ParseKind::Timestamp => {
                parse_timestamp(&text, self.format.as_deref()).map(FieldValue::Timestamp)
            }
            ParseKind::Url => {
                let resolved = match &self.base_url {
                    Some(base) => base.join(&text),
                    None => Url::parse(&text),
                };
                resolved
                    .map(|url| FieldValue::Text(url.to_string()))
                    .map_err(|e| FieldError::Value(format!("'{text}' is not a link: {e}")))
            }
            ParseKind::Presence | ParseKind::Screenshot => Err(FieldError::Value(format!(
                "{:?} fields do not parse text",
                self.parse
            ))),
        }
    }
}

#[async_trait]
impl FieldExtractor for SelectorField {
    async fn extract(&self, scope: Scope<'_>) -> FieldResult<Option<FieldValue>> {
        match self.parse {
            ParseKind::Presence => {
                let present = match &self.locator {
                    Some(locator) => visible_count(scope, locator).await? > 0,
                    None => true,
                };
                return Ok(Some(FieldValue::Flag(present)));
            }
            ParseKind::Screenshot => {
                let shot = match (&self.locator, scope) {
                    (Some(locator), _) => visible_first(scope, locator).await?.screenshot().await?,
                    (None, Scope::Element(element)) => element.screenshot().await?,
                    (None, Scope::Page(page)) => page.screenshot().await?,
                };
                return Ok(Some(FieldValue::Bytes(shot)));
            }
            _ => {}
        }

        let raw = match (&self.locator, scope.element()) {
            (Some(locator), _) => {
                let element = visible_first(scope, locator).await?;
                self.read(element.as_ref()).await?
            }
            (None, Some(element)) => self.read(element).await?,
            (None, None) => {
                return Err(FieldError::Value(
                    "a page-level field needs a selector".to_string(),
                ))
            }
        };

        let Some(raw) = raw else {
            return Ok(None);
        };
        let text = self.apply_pattern(raw)?;
        if text.is_empty() {
            return Ok(None);
        }
        self.convert(text).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeDocument, FakeNode, FakeSession, FakeSite};
    use crate::browser::Page;

    const URL: &str = "https://imoveis.example.com/imovel/42";

    fn session() -> FakeSession {
        let card = FakeNode::new(".card")
            .child(FakeNode::new("a.link").attr("href", "/imovel/42").text("Ver"))
            .child(FakeNode::new(".rooms").text("3 quartos · 2 banheiros"))
            .child(FakeNode::new(".price").text("  R$ 780.000 "))
            .child(FakeNode::new(".badge").text("Destaque").hidden());
        let doc = FakeDocument::new()
            .node(card)
            .node(FakeNode::new(".published").text("Publicado em 02/05/2024"));
        FakeSession::new(FakeSite::new().page(URL, doc))
    }

    async fn card(page: &dyn Page) -> Box<dyn Element> {
        page.query_all(".card").await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_decimal_from_text() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;

        let field = SelectorField::new(Some(".price".parse().unwrap()), ParseKind::Decimal);
        let value = field.extract(Scope::Element(card.as_ref())).await.unwrap();
        assert_eq!(value, Some(FieldValue::Decimal(780_000.0)));
    }

    #[tokio::test]
    async fn test_pattern_capture() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;

        let field = SelectorField::new(Some(".rooms".parse().unwrap()), ParseKind::Integer)
            .pattern(Regex::new(r"(\d+)\s+banheiro").unwrap());
        let value = field.extract(Scope::Element(card.as_ref())).await.unwrap();
        assert_eq!(value, Some(FieldValue::Integer(2)));

        let missing = SelectorField::new(Some(".rooms".parse().unwrap()), ParseKind::Integer)
            .pattern(Regex::new(r"(\d+)\s+vaga").unwrap());
        let err = missing.extract(Scope::Element(card.as_ref())).await.unwrap_err();
        assert!(matches!(err, FieldError::Value(_)));
    }

    #[tokio::test]
    async fn test_url_attribute_resolves() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;

        let field = SelectorField::new(Some("a.link".parse().unwrap()), ParseKind::Url)
            .attribute("href")
            .base_url(Url::parse("https://imoveis.example.com").unwrap());
        let value = field.extract(Scope::Element(card.as_ref())).await.unwrap();
        assert_eq!(
            value,
            Some(FieldValue::Text("https://imoveis.example.com/imovel/42".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_attribute_is_absent() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;

        let field = SelectorField::new(Some(".price".parse().unwrap()), ParseKind::Text)
            .attribute("data-value");
        assert_eq!(field.extract(Scope::Element(card.as_ref())).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_presence_and_hidden() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;
        let scope = Scope::Element(card.as_ref());

        let badge = SelectorField::new(Some(".badge".parse().unwrap()), ParseKind::Presence);
        assert_eq!(badge.extract(scope).await.unwrap(), Some(FieldValue::Flag(false)));

        let text = SelectorField::new(Some(".badge".parse().unwrap()), ParseKind::Text);
        assert!(matches!(text.extract(scope).await, Err(FieldError::Hidden(_))));
    }

    #[tokio::test]
    async fn test_timestamp_with_format() {
        let session = session();
        let page = session.open(URL);

        let field = SelectorField::new(Some(".published".parse().unwrap()), ParseKind::Timestamp)
            .pattern(Regex::new(r"(\d{2}/\d{2}/\d{4})").unwrap())
            .format("%d/%m/%Y");
        let value = field.extract(Scope::Page(&page)).await.unwrap();
        assert!(matches!(value, Some(FieldValue::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_element_screenshot() {
        let session = session();
        let page = session.open(URL);
        let card = card(&page).await;

        let field = SelectorField::new(None, ParseKind::Screenshot);
        let value = field.extract(Scope::Element(card.as_ref())).await.unwrap();
        assert_eq!(value, Some(FieldValue::Bytes(b"shot:.card".to_vec())));
    }

    #[test]
    fn test_from_rule_rejects_bad_pattern() {
        let rule = FieldRule {
            selector: None,
            attribute: None,
            parse: ParseKind::Integer,
            pattern: Some("(".to_string()),
            format: None,
        };
        assert!(matches!(
            SelectorField::from_rule(&rule, None),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
