//! Element locators
//!
//! Site profiles address elements with a small locator syntax:
//!
//! | form | meaning |
//! |------|---------|
//! | `div.card` | plain CSS selector |
//! | `label=Preço máximo` | element with that `aria-label` |
//! | `role=dialog` | element with that ARIA `role` attribute |
//! | `text=Aceitar` | any element whose whole text is exactly `Aceitar` |
//! | `button >> text=Aceitar` | CSS scope narrowed by exact text |

use crate::ConfigError;
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Locator {
    Css(String),
    Label(String),
    Role(String),
    Text { scope: String, text: String },
}

impl Locator {
    /// The CSS selector that finds candidate elements
    pub fn css(&self) -> Cow<'_, str> {
        match self {
            Self::Css(selector) => Cow::Borrowed(selector),
            Self::Label(label) => Cow::Owned(format!("[aria-label=\"{}\"]", escape_quotes(label))),
            Self::Role(role) => Cow::Owned(format!("[role=\"{}\"]", escape_quotes(role))),
            Self::Text { scope, .. } => Cow::Borrowed(scope),
        }
    }

    /// Exact text candidates must carry, for text locators
    pub fn text_filter(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Builds a locator from a template containing `{}`
    pub fn from_template(template: &str, value: &str) -> Result<Self, ConfigError> {
        template.replace("{}", value).parse()
    }
}

impl FromStr for Locator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let non_empty = |value: &str, what: &str| {
            let value = value.trim();
            if value.is_empty() {
                Err(ConfigError::InvalidLocator(format!("empty {what} in '{s}'")))
            } else {
                Ok(value.to_string())
            }
        };

        if s.is_empty() {
            return Err(ConfigError::InvalidLocator("empty locator".to_string()));
        }
        if let Some(label) = s.strip_prefix("label=") {
            return Ok(Self::Label(non_empty(label, "label")?));
        }
        if let Some(role) = s.strip_prefix("role=") {
            return Ok(Self::Role(non_empty(role, "role")?));
        }
        if let Some(text) = s.strip_prefix("text=") {
            return Ok(Self::Text {
                scope: "*".to_string(),
                text: non_empty(text, "text")?,
            });
        }
        if let Some((scope, text)) = s.split_once(">>") {
            let text = text.trim().strip_prefix("text=").ok_or_else(|| {
                ConfigError::InvalidLocator(format!("only text filters may follow '>>' in '{s}'"))
            })?;
            return Ok(Self::Text {
                scope: non_empty(scope, "scope")?,
                text: non_empty(text, "text")?,
            });
        }
        Ok(Self::Css(s.to_string()))
    }
}

impl TryFrom<String> for Locator {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "{selector}"),
            Self::Label(label) => write!(f, "label={label}"),
            Self::Role(role) => write!(f, "role={role}"),
            Self::Text { scope, text } if scope == "*" => write!(f, "text={text}"),
            Self::Text { scope, text } => write!(f, "{scope} >> text={text}"),
        }
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
