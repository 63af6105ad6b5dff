//! RecordMapper: per-field extraction composer
//!
//! A mapper holds an explicit table from field name to extractor. For every
//! field of the target schema that has an extractor, the extractor runs in
//! isolation: field-level faults drop that field and never abort the record.

use crate::browser::{pause, BrowserError, Locator, Scope};
use crate::extract::{
    visible_first, ExtractedRecord, FieldError, FieldExtractor, FieldResult, Schema,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Step run before any field is extracted
#[async_trait]
pub trait ExtractHook: Send + Sync {
    async fn run(&self, scope: Scope<'_>) -> FieldResult<()>;
}

/// Clicks a "show all details" control when it is visible
pub struct ExpandHook {
    locator: Locator,
    settle: Duration,
}

impl ExpandHook {
    pub fn new(locator: Locator, settle: Duration) -> Self {
        Self { locator, settle }
    }
}

#[async_trait]
impl ExtractHook for ExpandHook {
    async fn run(&self, scope: Scope<'_>) -> FieldResult<()> {
        let control = visible_first(scope, &self.locator).await?;
        control.click().await?;
        pause(self.settle).await;
        Ok(())
    }
}

/// A field that was present but could not be extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: String,
    pub message: String,
}

/// Outcome of one mapping pass
#[derive(Debug, Default)]
pub struct Extraction {
    pub record: ExtractedRecord,
    pub warnings: Vec<FieldWarning>,
}

/// Composes field extractors into records of a schema
#[derive(Default)]
pub struct RecordMapper {
    extractors: BTreeMap<String, Box<dyn FieldExtractor>>,
    before_extract: Option<Box<dyn ExtractHook>>,
}

impl RecordMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the extractor for `name`, replacing any previous one
    pub fn with_field(mut self, name: impl Into<String>, extractor: impl FieldExtractor + 'static) -> Self {
        self.extractors.insert(name.into(), Box::new(extractor));
        self
    }

    pub fn with_hook(mut self, hook: impl ExtractHook + 'static) -> Self {
        self.before_extract = Some(Box::new(hook));
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.extractors.keys().map(String::as_str)
    }

    /// Extracts every schema field the mapper knows about
    ///
    /// Only page-level browser faults are returned as errors; everything
    /// else is absorbed per field:
    /// - hook failures are ignored
    /// - hidden elements and type mismatches drop the field silently
    /// - timeouts and unusable values drop the field and are reported in
    ///   `Extraction::warnings` for the caller to log against its listing
    pub async fn extract(&self, scope: Scope<'_>, schema: &Schema) -> Result<Extraction, BrowserError> {
        let mut extraction = Extraction::default();

        if let Some(hook) = &self.before_extract {
            match hook.run(scope).await {
                Ok(()) => {}
                Err(FieldError::Browser(e)) => return Err(e),
                Err(e) => debug!(schema = schema.name, error = %e, "Skipped pre-extraction step"),
            }
        }

        for spec in schema.fields {
            let Some(extractor) = self.extractors.get(spec.name) else {
                continue;
            };

            let outcome = match extractor.extract(scope).await {
                Ok(Some(value)) => {
                    let found = value.kind();
                    value.coerce(spec.kind).map(Some).ok_or(FieldError::TypeMismatch {
                        expected: spec.kind,
                        found,
                    })
                }
                other => other,
            };

            match outcome {
                Ok(Some(value)) => {
                    extraction.record.insert(spec.name.to_string(), value);
                }
                Ok(None) => {}
                Err(FieldError::Browser(e)) => return Err(e),
                Err(e) if e.is_silent() => {
                    debug!(schema = schema.name, field = spec.name, reason = %e, "Field not present");
                }
                Err(e) => {
                    debug!(schema = schema.name, field = spec.name, error = %e, "Field dropped");
                    extraction.warnings.push(FieldWarning {
                        field: spec.name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(extraction)
    }
}
