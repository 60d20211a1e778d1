//! Dynamic field values as returned by the document store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field map of a document. Keys iterate in lexicographic order.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single document sampled from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Full document path relative to the database root, e.g. `users/alice`.
    pub path: String,
    pub fields: Fields,
}

/// Runtime representation of a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    String(String),
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Fields),
    GeoPoint { latitude: f64, longitude: f64 },
    /// Path of another document.
    Reference(String),
    /// Raw bytes, kept base64 encoded as delivered.
    Bytes(String),
    /// A value the client could not interpret; `kind` names the wire tag.
    Unsupported { kind: String },
}

impl FieldValue {
    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Double(_) => "double",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Array(_) => "array",
            FieldValue::Map(_) => "map",
            FieldValue::GeoPoint { .. } => "geopoint",
            FieldValue::Reference(_) => "reference",
            FieldValue::Bytes(_) => "bytes",
            FieldValue::Unsupported { kind } => kind,
        }
    }

    /// Decode a value from the Firestore REST encoding, e.g.
    /// `{"integerValue": "42"}` or `{"mapValue": {"fields": {...}}}`.
    ///
    /// Malformed or unknown encodings become `Unsupported` rather than an
    /// error so one odd field never fails a whole document.
    pub fn from_rest(value: &Value) -> FieldValue {
        let Some((tag, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
            return FieldValue::Unsupported {
                kind: "malformed".to_string(),
            };
        };

        let decoded = match tag.as_str() {
            "nullValue" => Some(FieldValue::Null),
            "booleanValue" => inner.as_bool().map(FieldValue::Boolean),
            "stringValue" => inner.as_str().map(|s| FieldValue::String(s.to_string())),
            // int64 values are transported as JSON strings
            "integerValue" => inner
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| inner.as_i64())
                .map(FieldValue::Integer),
            // doubles may arrive as "NaN"/"Infinity" strings
            "doubleValue" => inner
                .as_f64()
                .or_else(|| inner.as_str().and_then(|s| s.parse().ok()))
                .map(FieldValue::Double),
            "timestampValue" => inner
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc))),
            "referenceValue" => inner.as_str().map(|s| FieldValue::Reference(s.to_string())),
            "bytesValue" => inner.as_str().map(|s| FieldValue::Bytes(s.to_string())),
            "geoPointValue" => Some(FieldValue::GeoPoint {
                latitude: inner.get("latitude").and_then(Value::as_f64).unwrap_or(0.0),
                longitude: inner.get("longitude").and_then(Value::as_f64).unwrap_or(0.0),
            }),
            "arrayValue" => Some(FieldValue::Array(
                inner
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|values| values.iter().map(FieldValue::from_rest).collect())
                    .unwrap_or_default(),
            )),
            "mapValue" => Some(FieldValue::Map(fields_from_rest(inner.get("fields")))),
            _ => None,
        };

        decoded.unwrap_or_else(|| FieldValue::Unsupported { kind: tag.clone() })
    }
}

/// Decode a REST `fields` object into a field map. Absent means empty.
pub fn fields_from_rest(fields: Option<&Value>) -> Fields {
    fields
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_rest(v)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_decoding() {
        assert_eq!(FieldValue::from_rest(&json!({"nullValue": null})), FieldValue::Null);
        assert_eq!(
            FieldValue::from_rest(&json!({"booleanValue": true})),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            FieldValue::from_rest(&json!({"integerValue": "9007199254740993"})),
            FieldValue::Integer(9_007_199_254_740_993)
        );
        assert_eq!(
            FieldValue::from_rest(&json!({"doubleValue": 1.5})),
            FieldValue::Double(1.5)
        );
        assert_eq!(
            FieldValue::from_rest(&json!({"stringValue": "hi"})),
            FieldValue::String("hi".to_string())
        );
    }

    #[test]
    fn test_timestamp_decoding() {
        let value = FieldValue::from_rest(&json!({"timestampValue": "2024-03-01T12:00:00.123456Z"}));
        match value {
            FieldValue::Timestamp(t) => assert_eq!(t.timestamp(), 1_709_294_400),
            other => panic!("Expected timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_decoding() {
        let value = FieldValue::from_rest(&json!({
            "mapValue": {"fields": {
                "city": {"stringValue": "x"},
                "tags": {"arrayValue": {"values": [{"integerValue": "1"}]}},
                "empty": {"arrayValue": {}}
            }}
        }));
        let FieldValue::Map(fields) = value else {
            panic!("Expected map");
        };
        assert_eq!(fields["city"], FieldValue::String("x".to_string()));
        assert_eq!(fields["tags"], FieldValue::Array(vec![FieldValue::Integer(1)]));
        assert_eq!(fields["empty"], FieldValue::Array(vec![]));
    }

    #[test]
    fn test_geopoint_and_reference() {
        assert_eq!(
            FieldValue::from_rest(&json!({"geoPointValue": {"latitude": 1.0, "longitude": 2.0}})),
            FieldValue::GeoPoint {
                latitude: 1.0,
                longitude: 2.0
            }
        );
        assert_eq!(
            FieldValue::from_rest(&json!({"referenceValue": "projects/p/databases/(default)/documents/users/a"})),
            FieldValue::Reference("projects/p/databases/(default)/documents/users/a".to_string())
        );
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(
            FieldValue::from_rest(&json!({"vectorValue": {}})),
            FieldValue::Unsupported {
                kind: "vectorValue".to_string()
            }
        );
        assert_eq!(FieldValue::from_rest(&json!("bare")).kind(), "malformed");
        assert_eq!(
            FieldValue::from_rest(&json!({"integerValue": "not a number"})).kind(),
            "integerValue"
        );
        assert_eq!(FieldValue::from_rest(&json!({"bytesValue": "AAE="})).kind(), "bytes");
    }
}
