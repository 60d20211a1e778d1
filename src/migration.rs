//! End-to-end migration run.
//!
//! Discovers the configured collections, builds one pipeline per
//! collection and runs them through the bounded worker pool. Discovery
//! errors and shutdown during discovery end the run before anything is
//! dispatched.

use snafu::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, TableId};
use crate::discovery::discover_tasks;
use crate::error::{
    CancelledSnafu, ConfigSnafu, DiscoverySnafu, IncompleteSnafu, MigrationError, SetupSnafu,
};
use crate::pipeline::{CollectionPipeline, CommandRunner};
use crate::store::DocumentStore;
use crate::topology::{PipelineRunner, RunReport};

/// Run a migration with the given store and command runner.
///
/// Returns the per-collection report; a run where some collections failed
/// is still `Ok`. Use [`ensure_complete`] to turn it into an error.
pub async fn run_migration(
    config: &Config,
    store: &dyn DocumentStore,
    runner: Arc<dyn CommandRunner>,
    shutdown: CancellationToken,
) -> Result<RunReport<TableId>, MigrationError> {
    let selection = config.collections.selection().context(ConfigSnafu)?;
    let tasks = shutdown
        .run_until_cancelled(discover_tasks(
            store,
            &selection,
            config.collections.infer_schema,
        ))
        .await
        .context(CancelledSnafu)?
        .context(DiscoverySnafu)?;

    let pipelines = tasks
        .into_iter()
        .map(|task| {
            CollectionPipeline::new(&config.params, task, &config.logs_dir, runner.clone())
        })
        .collect::<Result<Vec<_>, _>>()
        .context(SetupSnafu)?;

    info!(
        collections = pipelines.len(),
        max_workers = config.workers.max_workers,
        logs_dir = %config.logs_dir.display(),
        dry_run = config.dry_run,
        "Starting migration"
    );

    let runner = PipelineRunner::new(
        pipelines,
        config.workers.runner_config(),
        shutdown,
        "collection",
    );
    Ok(runner.run().await)
}

/// Fail unless every collection succeeded.
pub fn ensure_complete<K>(report: &RunReport<K>) -> Result<(), MigrationError> {
    ensure!(
        report.is_success(),
        IncompleteSnafu {
            failed: report.incomplete(),
            total: report.total(),
        }
    );
    Ok(())
}
