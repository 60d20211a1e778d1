//! Configuration loading.
//!
//! A run is configured from an optional YAML file, then command-line flags,
//! then project defaults. The resulting `Config` is validated once and
//! passed by reference; nothing reads settings from global state.

mod cli;
mod params;
mod project;
mod table_id;
mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::{Path, PathBuf};

pub use cli::CliArgs;
pub use params::{
    CollectionParams, ENV_PARAM_COUNT, MigrationParams, TablePartitioning,
    TimePartitioningFieldType,
};
pub use project::{default_dataset_id, default_project, firebaserc_project};
pub use table_id::TableId;

use crate::discovery::Selection;
use crate::error::{
    ConfigError, EnvInterpolationSnafu, InvalidClusteringFieldSnafu, InvalidMaxWorkersSnafu,
    InvalidRequestTimeoutSnafu, MissingProjectIdSnafu, ReadFileSnafu,
    TooManyClusteringFieldsSnafu, YamlParseSnafu,
};
use crate::topology::{FailurePolicy, RunnerConfig};

/// BigQuery allows at most this many clustering columns.
pub const MAX_CLUSTERING_FIELDS: usize = 4;

/// Main configuration structure for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Extension and BigQuery parameters shared by every collection.
    #[serde(default)]
    pub params: MigrationParams,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Root of the per-collection log and artifact directories.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Write artifacts and log commands without running them.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            params: MigrationParams::default(),
            collections: CollectionsConfig::default(),
            workers: WorkersConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
            logs_dir: default_logs_dir(),
            dry_run: false,
        }
    }
}

fn default_logs_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/gcloud/logs/fs-to-bq-installer")
}

/// Which collections to migrate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionsConfig {
    /// Comma separated collection paths, or `ALL`.
    #[serde(default)]
    pub include: String,
    /// Comma separated collections skipped when `include` is `ALL`.
    #[serde(default)]
    pub exclude: String,
    /// Descend into subcollections when `include` is `ALL`.
    #[serde(default)]
    pub recursive: bool,
    /// Infer a schema per collection and create typed views.
    #[serde(default)]
    pub infer_schema: bool,
}

impl CollectionsConfig {
    pub fn selection(&self) -> Result<Selection, ConfigError> {
        Selection::parse(&self.include, &self.exclude, self.recursive)
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkersConfig {
    /// Maximum number of concurrently running pipelines (default: 5).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Behaviour of the remaining pipelines after one fails (default: abort).
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Upper bound of a random delay before each pipeline starts (default: 0).
    #[serde(default)]
    pub start_jitter_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            on_failure: FailurePolicy::default(),
            start_jitter_ms: 0,
        }
    }
}

impl WorkersConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_workers: self.max_workers,
            on_failure: self.on_failure,
            start_jitter_ms: self.start_jitter_ms,
        }
    }
}

fn default_max_workers() -> usize {
    5
}

/// Source database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Firestore database id.
    #[serde(default = "default_database")]
    pub database: String,
    /// Page size for list calls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Limit on each request to the store, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_page_size() -> u32 {
    300
}

/// Prometheus endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Address to serve `/metrics` on; no endpoint when unset.
    #[serde(default)]
    pub address: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file, interpolating environment
    /// variables first. The result is not yet validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text with environment interpolation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let content =
            vars::interpolate(content).map_err(|errors| EnvInterpolationSnafu { errors }.build())?;
        serde_yaml::from_str(&content).context(YamlParseSnafu)
    }

    /// Build the run configuration: config file, then flags, then project
    /// defaults resolved against the working directory, then validation.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        args.apply(&mut config);

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        config.resolve_defaults(&cwd);
        config.validate()?;
        Ok(config)
    }

    /// Fill in the project and dataset when they were not given.
    pub fn resolve_defaults(&mut self, dir: &Path) {
        if self.params.project_id.trim().is_empty() {
            self.params.project_id = default_project(dir).unwrap_or_default();
        }
        if self.params.dataset_id.trim().is_empty() && !self.params.project_id.is_empty() {
            self.params.dataset_id = default_dataset_id(&self.params.project_id);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.params.project_id.trim().is_empty(),
            MissingProjectIdSnafu
        );
        ensure!(self.workers.max_workers >= 1, InvalidMaxWorkersSnafu);
        ensure!(
            self.store.request_timeout_secs >= 1,
            InvalidRequestTimeoutSnafu
        );

        let clustering = &self.params.clustering;
        ensure!(
            clustering.len() <= MAX_CLUSTERING_FIELDS,
            TooManyClusteringFieldsSnafu {
                count: clustering.len()
            }
        );
        if let Some(field) = clustering
            .iter()
            .find(|f| f.is_empty() || f.chars().any(char::is_whitespace))
        {
            return InvalidClusteringFieldSnafu {
                field: field.clone(),
            }
            .fail();
        }

        self.collections.selection()?;
        Ok(())
    }
}
