//! Field extraction
//!
//! This module turns rendered page content into typed records:
//! - The `FieldExtractor` contract pulls one named value from a scope
//! - `RecordMapper` composes extractors for a target `Schema`
//! - `SelectorField` is the declarative extractor configured per site
//! - The visibility guard converts absent elements into `FieldError::Hidden`

mod error;
mod field;
mod guard;
mod mapper;
mod parse;

pub use error::{FieldError, FieldResult};
pub use field::{FieldExtractor, FieldSource, ParseKind, SelectorField};
pub use guard::{visible_count, visible_first, wait_visible};
pub use mapper::{ExpandHook, ExtractHook, Extraction, FieldWarning, RecordMapper};
pub use parse::{normalize_whitespace, parse_decimal, parse_flag, parse_integer, parse_timestamp};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// The accumulated result of one extraction: field name to value
pub type ExtractedRecord = BTreeMap<String, FieldValue>;

/// Kind of value a schema field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Flag,
    Timestamp,
    Bytes,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Flag => "flag",
            Self::Timestamp => "timestamp",
            Self::Bytes => "bytes",
        }
    }
}

/// A single extracted value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Flag(bool),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Integer(_) => FieldKind::Integer,
            Self::Decimal(_) => FieldKind::Decimal,
            Self::Flag(_) => FieldKind::Flag,
            Self::Timestamp(_) => FieldKind::Timestamp,
            Self::Bytes(_) => FieldKind::Bytes,
        }
    }

    /// Converts the value into `kind` when the conversion is lossless
    ///
    /// Integers widen to decimals; every other pairing must match exactly.
    pub fn coerce(self, kind: FieldKind) -> Option<FieldValue> {
        match (self, kind) {
            (value, kind) if value.kind() == kind => Some(value),
            (Self::Integer(n), FieldKind::Decimal) => Some(Self::Decimal(n as f64)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Decimal(n) => Some(*n),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// One named, typed field of a schema
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Target schema of a RecordMapper: ordered field declarations
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
