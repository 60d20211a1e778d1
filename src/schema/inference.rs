//! Schema inference from a sampled document.
//!
//! Walks the document's field map and classifies each value into one of the
//! view generator's column types. Nested maps are inferred recursively.
//! Values with no column type (bytes, unknown wire kinds) are dropped with a
//! warning so one exotic field never fails a whole collection.
//!
//! Only one document is inspected, so the result describes that document
//! and nothing more; array element types are not recorded.

use tracing::warn;

use super::{FieldType, Schema, SchemaField};
use crate::emit;
use crate::metrics::events::FieldDropped;
use crate::store::{FieldValue, Fields};

/// Infer a schema from a document's fields.
///
/// Fields come out in key order, which is lexicographic because `Fields` is
/// a `BTreeMap`, so the same document always yields the same schema.
pub fn infer(fields: &Fields) -> Schema {
    Schema::new(infer_fields(fields, ""))
}

fn infer_fields(fields: &Fields, prefix: &str) -> Vec<SchemaField> {
    fields
        .iter()
        .filter_map(|(name, value)| infer_field(name, value, prefix))
        .collect()
}

fn infer_field(name: &str, value: &FieldValue, prefix: &str) -> Option<SchemaField> {
    let field_type = match value {
        FieldValue::Null => FieldType::Null,
        FieldValue::Boolean(_) => FieldType::Boolean,
        FieldValue::String(_) => FieldType::String,
        FieldValue::Integer(_) | FieldValue::Double(_) => FieldType::Number,
        FieldValue::Timestamp(_) => FieldType::Timestamp,
        FieldValue::Array(_) => FieldType::Array,
        FieldValue::GeoPoint { .. } => FieldType::Geopoint,
        FieldValue::Reference(_) => FieldType::Reference,
        FieldValue::Map(nested) => {
            let path = format!("{prefix}{name}.");
            return Some(SchemaField::map(name, infer_fields(nested, &path)));
        }
        FieldValue::Bytes(_) | FieldValue::Unsupported { .. } => {
            warn!(
                field = %format!("{prefix}{name}"),
                kind = value.kind(),
                "Dropping field with unsupported type from inferred schema"
            );
            emit!(FieldDropped {
                kind: value.kind().to_string(),
            });
            return None;
        }
    };

    Some(SchemaField::new(name, field_type))
}
