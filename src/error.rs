//! Error types for fs-to-bq using snafu.
//!
//! Each concern gets its own enum with context selectors; `MigrationError`
//! aggregates them at the top level for `main`.

use snafu::prelude::*;
use std::path::PathBuf;

use crate::pipeline::PipelineStage;

// ============ Config Errors ============

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{}", errors.join("\n")))]
    EnvInterpolation { errors: Vec<String> },

    /// No project id could be resolved from flags, config, .firebaserc or env.
    #[snafu(display(
        "No project id: pass --project-id, set it in the config file, add a .firebaserc or set GOOGLE_PROJECT_ID"
    ))]
    MissingProjectId,

    /// The include list has no entries.
    #[snafu(display("No collections selected: pass --include with a comma separated list or ALL"))]
    EmptyInclude,

    /// `ALL` cannot be combined with named collections.
    #[snafu(display("--include '{include}' mixes ALL with collection names; use ALL on its own"))]
    MixedAll { include: String },

    /// max_workers must admit at least one pipeline.
    #[snafu(display("max_workers must be at least 1"))]
    InvalidMaxWorkers,

    /// A zero request timeout would fail every store call.
    #[snafu(display("store.request_timeout_secs must be at least 1"))]
    InvalidRequestTimeout,

    /// BigQuery supports at most four clustering columns.
    #[snafu(display("At most 4 clustering fields are allowed, got {count}"))]
    TooManyClusteringFields { count: usize },

    /// Clustering field names must not be empty or contain whitespace.
    #[snafu(display("Invalid clustering field '{field}'"))]
    InvalidClusteringField { field: String },
}

// ============ Store Errors ============

/// Errors returned by document store implementations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// HTTP client could not be constructed.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// HTTP request could not be sent or its body could not be read.
    #[snafu(display("Request to {url} failed: {source}"))]
    Http { url: String, source: reqwest::Error },

    /// The server answered with a non-success status.
    #[snafu(display("Request to {url} returned {status}: {body}"))]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body was not the expected JSON shape.
    #[snafu(display("Failed to decode response from {url}: {source}"))]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    /// Could not run the access token command.
    #[snafu(display("Failed to run `gcloud auth print-access-token`: {source}"))]
    TokenCommand { source: std::io::Error },

    /// The access token command exited unsuccessfully.
    #[snafu(display("`gcloud auth print-access-token` failed: {stderr}"))]
    TokenRejected { stderr: String },
}

// ============ Discovery Errors ============

/// Errors that abort collection discovery before anything is dispatched.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DiscoveryError {
    /// Listing collections failed.
    #[snafu(display("Failed to list collections under {parent}: {source}"))]
    ListCollections { parent: String, source: StoreError },

    /// Listing documents failed.
    #[snafu(display("Failed to list documents in {collection}: {source}"))]
    ListDocuments {
        collection: String,
        source: StoreError,
    },

    /// Fetching the sample document failed.
    #[snafu(display("Failed to sample a document from {collection}: {source}"))]
    SampleDocument {
        collection: String,
        source: StoreError,
    },

    /// Two collections map onto the same table identifier.
    #[snafu(display(
        "Collections '{first}' and '{second}' both map to table '{table}'"
    ))]
    TableConflict {
        table: String,
        first: String,
        second: String,
    },

    /// A collection path has no usable final segment.
    #[snafu(display("Invalid collection path '{path}'"))]
    InvalidCollectionPath { path: String },
}

// ============ Pipeline Errors ============

/// Errors from a single collection's pipeline. Every variant maps to the
/// stage it failed in.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// The collection path has no segment to name a table after.
    #[snafu(display("Cannot derive a table id from collection path '{path}'"))]
    NoTableId { path: String },

    /// Could not create the collection working directory.
    #[snafu(display("Failed to create directory {}: {source}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Could not open or write a log sink.
    #[snafu(display("Failed to write log {}: {source}", path.display()))]
    LogSink {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Could not write the .env configuration artifact.
    #[snafu(display("Failed to write config {}: {source}", path.display()))]
    WriteConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Could not serialize the inferred schema.
    #[snafu(display("Failed to serialize schema: {source}"))]
    SerializeSchema { source: serde_json::Error },

    /// Could not write the schema description file.
    #[snafu(display("Failed to write schema {}: {source}", path.display()))]
    WriteSchema {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external command could not be started.
    #[snafu(display("{stage}: failed to run `{command}`: {source}"))]
    Spawn {
        stage: PipelineStage,
        command: String,
        source: std::io::Error,
    },

    /// The external command exited unsuccessfully.
    #[snafu(display("{stage}: `{command}` exited with {}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))))]
    CommandFailed {
        stage: PipelineStage,
        command: String,
        code: Option<i32>,
    },
}

impl PipelineError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::NoTableId { .. } => PipelineStage::DeriveParams,
            PipelineError::CreateDir { .. } | PipelineError::LogSink { .. } => {
                PipelineStage::PrepareLogs
            }
            PipelineError::WriteConfig { .. } => PipelineStage::WriteConfig,
            PipelineError::SerializeSchema { .. } | PipelineError::WriteSchema { .. } => {
                PipelineStage::CreateViews
            }
            PipelineError::Spawn { stage, .. } | PipelineError::CommandFailed { stage, .. } => {
                *stage
            }
        }
    }
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Migration Error (top-level) ============

/// Top-level errors that end a migration run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MigrationError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Discovery error.
    #[snafu(display("Collection discovery failed"))]
    Discovery { source: DiscoveryError },

    /// Document store client could not be created.
    #[snafu(display("Failed to set up the document store"))]
    Store { source: StoreError },

    /// Shutdown was requested before discovery finished.
    #[snafu(display("Cancelled during collection discovery"))]
    Cancelled,

    /// A discovered collection could not be turned into a pipeline.
    #[snafu(display("Failed to prepare collection pipeline"))]
    Setup { source: PipelineError },

    /// Metrics address could not be parsed.
    #[snafu(display("Failed to parse metrics address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// One or more collections did not complete.
    #[snafu(display(
        "{failed} of {total} collection(s) did not complete; see the per-collection logs"
    ))]
    Incomplete { failed: usize, total: usize },
}
