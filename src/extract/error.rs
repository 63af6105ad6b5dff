//! Field-level error taxonomy

use crate::browser::BrowserError;
use crate::extract::FieldKind;
use thiserror::Error;

/// Errors raised while extracting a single field
///
/// Everything except `Browser` is a field-level fault and stays inside the
/// RecordMapper. `Browser` wraps page-level faults (crashed page, closed
/// session) that must abort the current listing.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("element not rendered: {0}")]
    Hidden(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("expected {} value, found {}", expected.as_str(), found.as_str())]
    TypeMismatch { expected: FieldKind, found: FieldKind },

    #[error("unusable value: {0}")]
    Value(String),

    #[error(transparent)]
    Browser(BrowserError),
}

/// Result type for field extraction
pub type FieldResult<T> = Result<T, FieldError>;

impl FieldError {
    /// Faults meaning the current UI variant does not expose the field
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Hidden(_) | Self::TypeMismatch { .. })
    }

    /// Faults that stay at field or step granularity
    pub fn is_field_level(&self) -> bool {
        !matches!(self, Self::Browser(_))
    }
}

impl From<BrowserError> for FieldError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Timeout { what } => Self::Timeout(what),
            BrowserError::Unsupported { operation } => {
                Self::Hidden(format!("{operation} is not supported by this backend"))
            }
            BrowserError::InvalidSelector(selector) => {
                Self::Value(format!("invalid selector {selector}"))
            }
            other => Self::Browser(other),
        }
    }
}
