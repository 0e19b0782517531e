//! Plain JSON conversion for BSON values
//!
//! Used by the `simplified` JSON mode: BSON-specific types are flattened to
//! the closest plain JSON type, trading type fidelity for readability.

use bson::{Binary, Bson, DateTime, Document, Regex, Timestamp};
use serde_json::Value as JsonValue;

/// Converts BSON values to plain JSON values
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplifiedConverter;

impl SimplifiedConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert a BSON value to plain JSON
    pub fn convert(&self, value: &Bson) -> JsonValue {
        match value {
            Bson::String(s) => JsonValue::String(s.clone()),
            Bson::Int32(n) => JsonValue::Number((*n).into()),
            Bson::Int64(n) => JsonValue::Number((*n).into()),
            Bson::Double(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Bson::Boolean(b) => JsonValue::Bool(*b),
            Bson::Null | Bson::Undefined => JsonValue::Null,
            Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
            Bson::DateTime(dt) => JsonValue::String(datetime_to_iso_string(dt)),
            Bson::Decimal128(d) => JsonValue::String(d.to_string()),
            Bson::Array(arr) => JsonValue::Array(arr.iter().map(|v| self.convert(v)).collect()),
            Bson::Document(doc) => self.convert_document(doc),
            Bson::Binary(bin) => JsonValue::String(binary_to_base64(bin)),
            Bson::RegularExpression(regex) => JsonValue::String(regex_to_string(regex)),
            Bson::Timestamp(ts) => timestamp_to_json(ts),
            Bson::MinKey => JsonValue::String("MinKey".to_string()),
            Bson::MaxKey => JsonValue::String("MaxKey".to_string()),
            other => JsonValue::String(format!("{other}")),
        }
    }

    /// Convert a whole document, keeping field order
    pub fn convert_document(&self, doc: &Document) -> JsonValue {
        let mut map = serde_json::Map::new();
        for (key, value) in doc.iter() {
            map.insert(key.clone(), self.convert(value));
        }
        JsonValue::Object(map)
    }
}

/// Convert DateTime to ISO 8601 string, falling back to epoch millis
pub fn datetime_to_iso_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| format!("{}", dt.timestamp_millis()))
}

/// Convert Binary data to Base64 string
pub fn binary_to_base64(bin: &Binary) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(&bin.bytes)
}

/// Convert Binary data to hexadecimal string
pub fn binary_to_hex(bin: &Binary) -> String {
    hex::encode(&bin.bytes)
}

fn regex_to_string(regex: &Regex) -> String {
    format!("/{}/{}", regex.pattern, regex.options)
}

fn timestamp_to_json(ts: &Timestamp) -> JsonValue {
    serde_json::json!({ "t": ts.time, "i": ts.increment })
}
