//! TextBuilder trait: turning a source record into embedding text.
//!
//! The builder separates text composition from embedding. It decides which
//! fields influence semantic similarity and how they are laid out; the
//! embedding provider only ever sees the resulting string.
//!
//! # Canonical text
//!
//! [`CanonicalTextBuilder`] renders the schema's text-bearing fields in
//! schema order:
//!
//! ```text
//! Name: Corolla | Brand: Toyota | Model: N/A | Category: sedan | Description: ...
//! ```
//!
//! Missing and blank fields render as `N/A`, so the same record always
//! yields the same text regardless of field insertion order.

use crate::types::{Provenance, VectorMetadata};
use tandem_core::{RecordSchema, SourceRecord};

/// Placeholder for missing or empty text fields.
pub const MISSING_PLACEHOLDER: &str = "N/A";

/// Separator between `Label: value` segments.
pub const SEGMENT_SEPARATOR: &str = " | ";

/// Trait for composing embedding text and metadata from a source record.
pub trait TextBuilder: Send + Sync {
    /// Compose the text to embed. Must be deterministic.
    fn build_text(&self, record: &SourceRecord) -> String;

    /// Compose the metadata stored with each vector record.
    fn build_metadata(&self, record: &SourceRecord, provenance: Provenance) -> VectorMetadata;

    /// Returns the name of this builder for logging/debugging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Builder driven by a [`RecordSchema`].
#[derive(Debug, Clone, Default)]
pub struct CanonicalTextBuilder {
    schema: RecordSchema,
}

impl CanonicalTextBuilder {
    /// Create a builder for the given schema.
    pub fn new(schema: RecordSchema) -> Self {
        Self { schema }
    }

    /// The schema this builder renders.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }
}

impl TextBuilder for CanonicalTextBuilder {
    fn build_text(&self, record: &SourceRecord) -> String {
        self.schema
            .text_fields
            .iter()
            .map(|field| {
                let value = match record.get(&field.name) {
                    Some(v) if !v.is_blank() => v.to_string(),
                    _ => MISSING_PLACEHOLDER.to_string(),
                };
                format!("{}: {}", field.label, value.trim())
            })
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }

    fn build_metadata(&self, record: &SourceRecord, provenance: Provenance) -> VectorMetadata {
        VectorMetadata::new(provenance)
            .with_display(self.schema.display_values(record))
            .with_passthrough(self.schema.passthrough_values(record))
    }

    fn name(&self) -> &str {
        "canonical"
    }
}

// ============================================================================
// Tests
// ============================================================================
