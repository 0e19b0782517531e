//! JSON rendering of archived documents
//!
//! Each document becomes one pretty-printed JSON file. The default flavour
//! is relaxed Extended JSON so the output stays self-describing: an ObjectId
//! is written as `{"$oid": "..."}` rather than a bare string.

use mongodb::bson::{Bson, Document};
use serde::Serialize;

use super::convert::SimplifiedConverter;
use crate::config::JsonMode;
use crate::error::{ArchiveError, Result};

/// JSON formatter with configurable flavour and indentation
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    /// Extended JSON flavour
    mode: JsonMode,

    /// Indentation width in spaces
    indent: usize,

    /// Converter for the simplified flavour
    converter: SimplifiedConverter,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    ///
    /// # Arguments
    /// * `mode` - JSON flavour
    /// * `indent` - Indentation width
    pub fn new(mode: JsonMode, indent: usize) -> Self {
        Self {
            mode,
            indent,
            converter: SimplifiedConverter::new(),
        }
    }

    pub fn mode(&self) -> JsonMode {
        self.mode
    }

    /// Convert a document to a JSON value in the configured flavour
    pub fn to_value(&self, doc: &Document) -> serde_json::Value {
        match self.mode {
            JsonMode::Relaxed => Bson::Document(doc.clone()).into_relaxed_extjson(),
            JsonMode::Canonical => Bson::Document(doc.clone()).into_canonical_extjson(),
            JsonMode::Simplified => self.converter.convert_document(doc),
        }
    }

    /// Render a document as pretty JSON bytes, newline terminated
    ///
    /// `entry` names the archive entry in the error if serialization fails.
    pub fn render(&self, doc: &Document, entry: &str) -> Result<Vec<u8>> {
        let value = self.to_value(doc);
        let mut buf = self.to_pretty_bytes(&value).map_err(|e| ArchiveError::SerializeFailed {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Render a document as a pretty JSON string
    pub fn format_document(&self, doc: &Document) -> Result<String> {
        let bytes = self.render(doc, "<document>")?;
        String::from_utf8(bytes).map_err(|e| {
            ArchiveError::SerializeFailed {
                entry: "<document>".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn to_pretty_bytes<T: Serialize>(
        &self,
        value: &T,
    ) -> std::result::Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let indent = " ".repeat(self.indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser)?;
        Ok(buf)
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new(JsonMode::default(), 2)
    }
}
