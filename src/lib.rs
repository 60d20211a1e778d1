//! fs-to-bq: migrate Firestore collections to BigQuery.
//!
//! For every selected collection the tool installs the BigQuery export
//! extension, backfills the existing documents and, in schema-aware mode,
//! creates typed views from a schema inferred from a sample document.
//!
//! - `config/` - YAML and CLI configuration, migration parameters
//! - `store/` - Document store trait with Firestore REST and in-memory backends
//! - `schema/` - Schema model and recursive inference
//! - `discovery` - Collection selection and schema sampling
//! - `pipeline/` - Per-collection stages and external command runners
//! - `topology/` - Bounded worker pool with a failure policy
//! - `migration` - Ties discovery, pipelines and the worker pool together
//! - `metrics/` - Internal events and the optional Prometheus endpoint
//! - `signal` - Signal handling for run cancellation
//! - `error` - Error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fs_to_bq::{Config, MemoryStore, ProcessRunner, run_migration};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_file("fs-to-bq.yaml")?;
//! let store = MemoryStore::new().with_collection("orders");
//! let report = run_migration(&config, &store, Arc::new(ProcessRunner), CancellationToken::new()).await?;
//! println!("{} collection(s) migrated", report.succeeded.len());
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod migration;
pub mod pipeline;
pub mod schema;
pub mod signal;
pub mod store;
pub mod topology;
pub mod tracing;

// Re-export commonly used items
pub use config::{CliArgs, CollectionParams, Config, MigrationParams, TableId};
pub use discovery::{
    CollectionTask, DiscoveredCollection, Selection, discover, discover_collections, discover_tasks,
};
pub use error::{
    ConfigError, DiscoveryError, MetricsError, MigrationError, PipelineError, StoreError,
};
pub use migration::{ensure_complete, run_migration};
pub use pipeline::{
    CollectionPipeline, CommandRunner, CommandStatus, DryRunRunner, ExternalCommand,
    PipelineStage, ProcessRunner,
};
pub use schema::{FieldType, Schema, SchemaField, infer};
pub use signal::shutdown_signal;
pub use store::{DocumentStore, FieldValue, Fields, FirestoreConfig, FirestoreStore, MemoryStore};
pub use topology::{FailurePolicy, Pipeline, PipelineRunner, RunReport, RunnerConfig};
pub use crate::tracing::init_tracing;
