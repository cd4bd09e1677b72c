//! Conversions between `serde_json` values and BSON.

use bson::{Bson, Document as BsonDocument};

use crate::errors::DbError;

/// Convert a JSON value that must be an object into a `bson::Document`.
///
/// # Errors
/// Returns `DbError::Cast` if the value is not an object or holds unrepresentable data.
pub fn json_value_to_bson_document(val: &serde_json::Value) -> Result<BsonDocument, DbError> {
    let obj = val.as_object().ok_or_else(|| DbError::Cast("expected JSON object".into()))?;
    BsonDocument::try_from(obj.clone()).map_err(|e| DbError::Cast(e.to_string()))
}

/// Parse a JSON string into a `bson::Document`. The JSON must be a top-level object.
///
/// # Errors
/// Returns `DbError::Json` for malformed JSON and `DbError::Cast` for non-objects.
pub fn parse_json_to_bson_document(json: &str) -> Result<BsonDocument, DbError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_bson_document(&val)
}

/// Convert any JSON value into BSON.
///
/// # Errors
/// Returns `DbError::Cast` when the value cannot be represented.
pub fn json_value_to_bson(val: serde_json::Value) -> Result<Bson, DbError> {
    let mut wrapper = serde_json::Map::new();
    wrapper.insert("v".into(), val);
    let mut doc = BsonDocument::try_from(wrapper).map_err(|e| DbError::Cast(e.to_string()))?;
    Ok(doc.remove("v").unwrap_or(Bson::Null))
}

/// Relaxed extended JSON rendering, as used for CLI output.
#[must_use]
pub fn bson_document_to_json(doc: BsonDocument) -> serde_json::Value {
    Bson::Document(doc).into_relaxed_extjson()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_bson_success() {
        let d = parse_json_to_bson_document("{\"a\":1,\"b\":\"x\"}").unwrap();
        assert_eq!(d.get_i32("a").unwrap(), 1);
        assert_eq!(d.get_str("b").unwrap(), "x");
    }

    #[test]
    fn json_to_bson_rejects_array() {
        let e = parse_json_to_bson_document("[1,2,3]").unwrap_err();
        assert!(matches!(e, DbError::Cast(_)));
    }

    #[test]
    fn scalar_values_convert() {
        assert_eq!(json_value_to_bson(serde_json::json!("x")).unwrap(), Bson::String("x".into()));
        assert_eq!(json_value_to_bson(serde_json::json!(true)).unwrap(), Bson::Boolean(true));
        assert_eq!(json_value_to_bson(serde_json::Value::Null).unwrap(), Bson::Null);
    }
}
