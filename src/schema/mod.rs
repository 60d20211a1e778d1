//! Typed schema descriptions for the BigQuery view generator.
//!
//! A `Schema` is an ordered list of fields; map-typed fields carry their own
//! nested field list. The serialized form is what
//! `fs-bq-schema-views --schema-files` reads:
//!
//! ```json
//! {"fields": [{"name": "address", "type": "map", "fields": [{"name": "city", "type": "string"}]}]}
//! ```

mod inference;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use inference::infer;

/// Column types understood by the view generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Null,
    Boolean,
    String,
    Number,
    Timestamp,
    Array,
    Map,
    Geopoint,
    Reference,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Timestamp => "timestamp",
            FieldType::Array => "array",
            FieldType::Map => "map",
            FieldType::Geopoint => "geopoint",
            FieldType::Reference => "reference",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inferred column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Nested fields; present exactly when `field_type` is `Map`.
    #[serde(rename = "fields", default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<SchemaField>>,
}

impl SchemaField {
    /// A non-map field.
    ///
    /// Passing `FieldType::Map` yields a map with no children; use
    /// [`SchemaField::map`] to attach them.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let children = (field_type == FieldType::Map).then(Vec::new);
        Self {
            name: name.into(),
            field_type,
            children,
        }
    }

    /// A map field with the given nested fields.
    pub fn map(name: impl Into<String>, children: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Map,
            children: Some(children),
        }
    }

    /// Nested fields of a map, `None` for every other type.
    pub fn children(&self) -> Option<&[SchemaField]> {
        self.children.as_deref()
    }
}

/// Ordered list of inferred fields for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Look up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Serialize to the schema-file JSON consumed by the view generator.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_file_format() {
        let schema = Schema::new(vec![
            SchemaField::new("name", FieldType::String),
            SchemaField::map("address", vec![SchemaField::new("city", FieldType::String)]),
        ]);

        let value: serde_json::Value = serde_json::from_str(&schema.to_json_pretty().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "fields": [
                    {"name": "name", "type": "string"},
                    {"name": "address", "type": "map", "fields": [
                        {"name": "city", "type": "string"}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn test_children_only_on_maps() {
        assert!(SchemaField::new("a", FieldType::Array).children().is_none());
        assert_eq!(SchemaField::new("m", FieldType::Map).children(), Some(&[][..]));
    }

    #[test]
    fn test_empty_schema_serializes_empty_field_list() {
        assert_eq!(
            serde_json::to_string(&Schema::default()).unwrap(),
            r#"{"fields":[]}"#
        );
    }
}
