//! Command-line arguments.
//!
//! Every migration setting can be given on the command line; flags that are
//! present override the config file.

use clap::Parser;
use std::path::PathBuf;

use super::{Config, TablePartitioning, TimePartitioningFieldType};
use crate::topology::FailurePolicy;

/// Migrate Firestore collections to BigQuery.
///
/// Installs the BigQuery export extension for each selected collection,
/// backfills existing documents, and optionally creates typed views from an
/// inferred schema.
#[derive(Parser, Debug)]
#[command(name = "fs-to-bq", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// GCP project id (defaults to .firebaserc, then GOOGLE_PROJECT_ID)
    #[arg(long)]
    pub project_id: Option<String>,

    /// Cloud Functions location for the extension [default: us-central1]
    #[arg(long)]
    pub location: Option<String>,

    /// BigQuery dataset id [default: <project>_firestore_export]
    #[arg(long)]
    pub dataset_id: Option<String>,

    /// BigQuery dataset location [default: us]
    #[arg(long)]
    pub dataset_location: Option<String>,

    /// Table partitioning mode [default: NONE]
    #[arg(long, value_enum, ignore_case = true)]
    pub table_partitioning: Option<TablePartitioning>,

    /// BigQuery column used for time partitioning
    #[arg(long)]
    pub time_partitioning_field: Option<String>,

    /// Document field copied into the time partitioning column
    #[arg(long)]
    pub time_partitioning_firestore_field: Option<String>,

    /// Type of the time partitioning column [default: omit]
    #[arg(long, value_enum, ignore_case = true)]
    pub time_partitioning_field_type: Option<TimePartitioningFieldType>,

    /// Comma separated clustering columns (at most 4)
    #[arg(long, value_delimiter = ',')]
    pub clustering: Option<Vec<String>>,

    /// Collection that receives rows which failed to export
    #[arg(long)]
    pub backup_collection: Option<String>,

    /// URL of a function that transforms rows before they are written
    #[arg(long = "transform-function-url")]
    pub transform_function: Option<String>,

    /// Add a column with the wildcard ids of each document path
    #[arg(long)]
    pub wildcard_ids: bool,

    /// Comma separated collections to migrate, or ALL
    #[arg(long)]
    pub include: Option<String>,

    /// Comma separated collections to skip when --include is ALL
    #[arg(long)]
    pub exclude: Option<String>,

    /// With --include ALL, also migrate every subcollection
    #[arg(long)]
    pub recursive: bool,

    /// Infer a schema from one document per collection and create typed views
    #[arg(long)]
    pub infer_schema: bool,

    /// Maximum number of collections migrated concurrently [default: 5]
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// What to do with the remaining collections when one fails [default: abort]
    #[arg(long, value_enum)]
    pub on_failure: Option<FailurePolicy>,

    /// Upper bound in milliseconds of a random delay before each pipeline starts
    #[arg(long)]
    pub start_jitter_ms: Option<u64>,

    /// Root directory for per-collection logs and artifacts
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// Firestore database id [default: (default)]
    #[arg(long)]
    pub database: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
    #[arg(long)]
    pub metrics_address: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write artifacts and log commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Apply every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        let params = &mut config.params;
        override_with(&mut params.project_id, &self.project_id);
        override_with(&mut params.location, &self.location);
        override_with(&mut params.dataset_id, &self.dataset_id);
        override_with(&mut params.dataset_location, &self.dataset_location);
        override_with(&mut params.table_partitioning, &self.table_partitioning);
        override_with(
            &mut params.time_partitioning_field_type,
            &self.time_partitioning_field_type,
        );
        override_with(&mut params.clustering, &self.clustering);
        override_opt(
            &mut params.time_partitioning_field,
            &self.time_partitioning_field,
        );
        override_opt(
            &mut params.time_partitioning_firestore_field,
            &self.time_partitioning_firestore_field,
        );
        override_opt(&mut params.backup_collection, &self.backup_collection);
        override_opt(&mut params.transform_function, &self.transform_function);
        params.wildcard_ids |= self.wildcard_ids;

        let collections = &mut config.collections;
        override_with(&mut collections.include, &self.include);
        override_with(&mut collections.exclude, &self.exclude);
        collections.recursive |= self.recursive;
        collections.infer_schema |= self.infer_schema;

        let workers = &mut config.workers;
        override_with(&mut workers.max_workers, &self.max_workers);
        override_with(&mut workers.on_failure, &self.on_failure);
        override_with(&mut workers.start_jitter_ms, &self.start_jitter_ms);

        override_with(&mut config.logs_dir, &self.logs_dir);
        override_with(&mut config.store.database, &self.database);
        override_opt(&mut config.metrics.address, &self.metrics_address);
        config.dry_run |= self.dry_run;
    }
}

fn override_with<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn override_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}
