//! Migration parameters passed to the export extension.
//!
//! `MigrationParams` holds the per-run settings. `CollectionParams` is a full
//! owned copy of them plus the fields derived from one collection path; it
//! is built once per collection and never mutated, so concurrent pipelines
//! share nothing.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::TableId;

/// Ingestion-time partitioning granularity of the changelog table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum TablePartitioning {
    #[default]
    None,
    Hour,
    Day,
    Month,
    Year,
}

impl TablePartitioning {
    pub fn as_str(&self) -> &'static str {
        match self {
            TablePartitioning::None => "NONE",
            TablePartitioning::Hour => "HOUR",
            TablePartitioning::Day => "DAY",
            TablePartitioning::Month => "MONTH",
            TablePartitioning::Year => "YEAR",
        }
    }
}

/// BigQuery column type of the time partitioning field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimePartitioningFieldType {
    /// Let the extension pick; only valid with ingestion-time partitioning.
    #[default]
    #[serde(rename = "omit")]
    Omit,
    Timestamp,
    Datetime,
    Date,
}

impl TimePartitioningFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePartitioningFieldType::Omit => "omit",
            TimePartitioningFieldType::Timestamp => "TIMESTAMP",
            TimePartitioningFieldType::Datetime => "DATETIME",
            TimePartitioningFieldType::Date => "DATE",
        }
    }
}

/// Run-wide settings for every collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationParams {
    /// GCP project hosting Firestore and BigQuery.
    #[serde(default)]
    pub project_id: String,
    /// Region for the extension's Cloud Functions.
    #[serde(default = "default_location")]
    pub location: String,
    /// BigQuery dataset receiving the changelog tables.
    #[serde(default)]
    pub dataset_id: String,
    /// BigQuery dataset location.
    #[serde(default = "default_dataset_location")]
    pub dataset_location: String,
    /// Add a column with the wildcard ids of each document path.
    #[serde(default)]
    pub wildcard_ids: bool,
    #[serde(default)]
    pub table_partitioning: TablePartitioning,
    /// Column used for time partitioning (defaults to `_PARTITIONTIME`).
    #[serde(default)]
    pub time_partitioning_field: Option<String>,
    /// Document field copied into the time partitioning column.
    #[serde(default)]
    pub time_partitioning_firestore_field: Option<String>,
    #[serde(default)]
    pub time_partitioning_field_type: TimePartitioningFieldType,
    /// Up to four clustering columns, in order.
    #[serde(default)]
    pub clustering: Vec<String>,
    /// Collection receiving rows that failed to export.
    #[serde(default)]
    pub backup_collection: Option<String>,
    /// URL of a function transforming rows before they are written.
    #[serde(default)]
    pub transform_function: Option<String>,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_dataset_location() -> String {
    "us".to_string()
}

impl Default for MigrationParams {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: default_location(),
            dataset_id: String::new(),
            dataset_location: default_dataset_location(),
            wildcard_ids: false,
            table_partitioning: TablePartitioning::default(),
            time_partitioning_field: None,
            time_partitioning_firestore_field: None,
            time_partitioning_field_type: TimePartitioningFieldType::default(),
            clustering: Vec::new(),
            backup_collection: None,
            transform_function: None,
        }
    }
}

impl MigrationParams {
    /// Copy these parameters and derive the per-collection fields.
    ///
    /// Returns `None` when the path has no usable final segment.
    pub fn for_collection(&self, collection_path: &str) -> Option<CollectionParams> {
        let table_id = TableId::from_collection_path(collection_path)?;
        Some(CollectionParams {
            base: self.clone(),
            collection_path: collection_path.to_string(),
            table_id,
        })
    }
}

/// Number of entries in the extension's parameter file.
pub const ENV_PARAM_COUNT: usize = 14;

/// Parameters for exactly one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionParams {
    base: MigrationParams,
    collection_path: String,
    table_id: TableId,
}

impl CollectionParams {
    pub fn base(&self) -> &MigrationParams {
        &self.base
    }

    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    /// Whether the path has `{placeholder}` document segments and so names
    /// a group of same-named subcollections.
    pub fn is_collection_group(&self) -> bool {
        self.collection_path
            .split('/')
            .any(|segment| segment.starts_with('{') && segment.ends_with('}'))
    }

    /// Extension instance id, unique per table.
    pub fn instance_id(&self) -> String {
        format!("firestore-bigquery-export-{}", self.table_id)
    }

    /// Every extension parameter by name, in a fixed order.
    pub fn env_entries(&self) -> [(&'static str, String); ENV_PARAM_COUNT] {
        let p = &self.base;
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        [
            ("LOCATION", p.location.clone()),
            ("DATASET_LOCATION", p.dataset_location.clone()),
            ("BIGQUERY_PROJECT_ID", p.project_id.clone()),
            ("COLLECTION_PATH", self.collection_path.clone()),
            ("DATASET_ID", p.dataset_id.clone()),
            ("TABLE_ID", self.table_id.to_string()),
            ("WILDCARD_IDS", p.wildcard_ids.to_string()),
            ("TABLE_PARTITIONING", p.table_partitioning.as_str().to_string()),
            ("TIME_PARTITIONING_FIELD", opt(&p.time_partitioning_field)),
            (
                "TIME_PARTITIONING_FIRESTORE_FIELD",
                opt(&p.time_partitioning_firestore_field),
            ),
            (
                "TIME_PARTITIONING_FIELD_TYPE",
                p.time_partitioning_field_type.as_str().to_string(),
            ),
            ("CLUSTERING", p.clustering.join(",")),
            ("BACKUP_COLLECTION", opt(&p.backup_collection)),
            ("TRANSFORM_FUNCTION", opt(&p.transform_function)),
        ]
    }

    /// Render the parameters as a dotenv file, one `KEY="value"` per line.
    pub fn render_env(&self) -> String {
        self.env_entries()
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"\n", escape_env_value(value)))
            .collect()
    }
}

/// Escape a value for a double-quoted dotenv entry.
fn escape_env_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' | '`' | '!' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> MigrationParams {
        MigrationParams {
            project_id: "my-proj".to_string(),
            dataset_id: "my_proj_firestore_export".to_string(),
            clustering: vec!["document_id".to_string(), "timestamp".to_string()],
            ..MigrationParams::default()
        }
    }

    #[test]
    fn test_defaults() {
        let p = MigrationParams::default();
        assert_eq!(p.location, "us-central1");
        assert_eq!(p.dataset_location, "us");
        assert_eq!(p.table_partitioning, TablePartitioning::None);
        assert_eq!(p.time_partitioning_field_type, TimePartitioningFieldType::Omit);
    }

    #[test]
    fn test_for_collection_derives_fields() {
        let base = params();
        let cp = base.for_collection("users/alice/orders").unwrap();
        assert_eq!(cp.collection_path(), "users/alice/orders");
        assert_eq!(cp.table_id().id(), "orders");
        assert_eq!(cp.instance_id(), "firestore-bigquery-export-orders");
        assert_eq!(cp.base(), &base);
        assert!(!cp.is_collection_group());
        assert!(base.for_collection("").is_none());
    }

    #[test]
    fn test_wildcard_path_is_collection_group() {
        let cp = params()
            .for_collection("users/{users_id}/orders")
            .unwrap();
        assert!(cp.is_collection_group());
        assert_eq!(cp.table_id().id(), "orders");
        assert!(
            cp.render_env()
                .contains("COLLECTION_PATH=\"users/{users_id}/orders\"\n")
        );
    }

    #[test]
    fn test_copies_are_independent() {
        let mut base = params();
        let cp = base.for_collection("orders").unwrap();
        base.dataset_id = "changed".to_string();
        assert_eq!(cp.base().dataset_id, "my_proj_firestore_export");
    }

    #[test]
    fn test_env_entries_cover_every_parameter() {
        let cp = params().for_collection("orders").unwrap();
        let entries = cp.env_entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "LOCATION",
                "DATASET_LOCATION",
                "BIGQUERY_PROJECT_ID",
                "COLLECTION_PATH",
                "DATASET_ID",
                "TABLE_ID",
                "WILDCARD_IDS",
                "TABLE_PARTITIONING",
                "TIME_PARTITIONING_FIELD",
                "TIME_PARTITIONING_FIRESTORE_FIELD",
                "TIME_PARTITIONING_FIELD_TYPE",
                "CLUSTERING",
                "BACKUP_COLLECTION",
                "TRANSFORM_FUNCTION",
            ]
        );
    }

    #[test]
    fn test_render_env() {
        let cp = params().for_collection("orders").unwrap();
        let env = cp.render_env();
        assert_eq!(env.lines().count(), ENV_PARAM_COUNT);
        assert!(env.contains("BIGQUERY_PROJECT_ID=\"my-proj\"\n"));
        assert!(env.contains("COLLECTION_PATH=\"orders\"\n"));
        assert!(env.contains("TABLE_ID=\"orders\"\n"));
        assert!(env.contains("WILDCARD_IDS=\"false\"\n"));
        assert!(env.contains("TABLE_PARTITIONING=\"NONE\"\n"));
        assert!(env.contains("TIME_PARTITIONING_FIELD_TYPE=\"omit\"\n"));
        assert!(env.contains("CLUSTERING=\"document_id,timestamp\"\n"));
        assert!(env.contains("BACKUP_COLLECTION=\"\"\n"));
    }

    #[test]
    fn test_env_values_are_escaped() {
        assert_eq!(escape_env_value(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_env_value("$HOME"), "\\$HOME");
        assert_eq!(escape_env_value("x\ny"), "x\\ny");
        assert_eq!(escape_env_value(r"c:\d"), r"c:\\d");
        assert_eq!(escape_env_value("https://fn.example/t"), "https://fn.example/t");
    }

    #[test]
    fn test_partitioning_yaml_names() {
        let p: TablePartitioning = serde_yaml::from_str("DAY").unwrap();
        assert_eq!(p, TablePartitioning::Day);
        let t: TimePartitioningFieldType = serde_yaml::from_str("omit").unwrap();
        assert_eq!(t, TimePartitioningFieldType::Omit);
        let t: TimePartitioningFieldType = serde_yaml::from_str("TIMESTAMP").unwrap();
        assert_eq!(t, TimePartitioningFieldType::Timestamp);
    }
}
