//! Document formatting for the archive
//!
//! - `json`: pretty JSON rendering in relaxed, canonical or simplified flavour
//! - `convert`: plain JSON conversion of BSON values
//! - [`document_id`]: the id string used to name a document's archive entry

pub mod convert;
pub mod json;

pub use json::JsonFormatter;

use mongodb::bson::{Bson, Document};

/// Render a document's id field as a string for its entry name
///
/// ObjectIds become hex, strings are kept verbatim, integers are written in
/// decimal and binary ids (UUIDs) in hex. Any other type falls back to its
/// compact relaxed Extended JSON. A missing or null id yields `None`.
pub fn document_id(doc: &Document, field: &str) -> Option<String> {
    let value = doc.get(field)?;
    let id = match value {
        Bson::Null | Bson::Undefined => return None,
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Binary(bin) => convert::binary_to_hex(bin),
        other => serde_json::to_string(&other.clone().into_relaxed_extjson()).ok()?,
    };
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};

    #[test]
    fn test_objectid_id() {
        let oid = ObjectId::parse_str("65705d84dfc3f3b5094e1f72").unwrap();
        let doc = doc! { "_id": oid };
        assert_eq!(
            document_id(&doc, "_id").as_deref(),
            Some("65705d84dfc3f3b5094e1f72")
        );
    }

    #[test]
    fn test_scalar_ids() {
        assert_eq!(document_id(&doc! { "_id": "abc" }, "_id").as_deref(), Some("abc"));
        assert_eq!(document_id(&doc! { "_id": 42 }, "_id").as_deref(), Some("42"));
        assert_eq!(document_id(&doc! { "_id": 7i64 }, "_id").as_deref(), Some("7"));
    }

    #[test]
    fn test_custom_id_field() {
        let doc = doc! { "_id": 1, "id": "order-1" };
        assert_eq!(document_id(&doc, "id").as_deref(), Some("order-1"));
    }

    #[test]
    fn test_compound_id_uses_extjson() {
        let doc = doc! { "_id": { "region": "eu", "n": 3 } };
        assert_eq!(
            document_id(&doc, "_id").as_deref(),
            Some(r#"{"region":"eu","n":3}"#)
        );
    }

    #[test]
    fn test_missing_or_null_id() {
        assert_eq!(document_id(&doc! { "name": "x" }, "_id"), None);
        assert_eq!(document_id(&doc! { "_id": null }, "_id"), None);
        assert_eq!(document_id(&doc! { "_id": "" }, "_id"), None);
    }
}
