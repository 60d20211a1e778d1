//! fs-to-bq CLI: migrate Firestore collections to BigQuery.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fs_to_bq::error::{
    AddressParseSnafu, ConfigSnafu, MetricsSnafu, MigrationError, StoreSnafu,
};
use fs_to_bq::{
    CliArgs, CommandRunner, Config, DryRunRunner, FirestoreConfig, FirestoreStore, ProcessRunner,
    ensure_complete, init_tracing, run_migration, shutdown_signal,
};

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), MigrationError> {
    let args = CliArgs::parse();
    init_tracing(&args.log_level);

    let config = Config::load(&args).context(ConfigSnafu)?;
    info!(
        project = %config.params.project_id,
        dataset = %config.params.dataset_id,
        "fs-to-bq starting"
    );

    if let Some(address) = &config.metrics.address {
        let addr = address.parse().context(AddressParseSnafu)?;
        fs_to_bq::metrics::init(addr).context(MetricsSnafu)?;
        debug!("Metrics endpoint listening on http://{}/metrics", address);
    }

    let mut store_config =
        FirestoreConfig::from_env(&config.params.project_id, &config.store.database);
    store_config.page_size = config.store.page_size;
    store_config.request_timeout = Duration::from_secs(config.store.request_timeout_secs);
    let store = FirestoreStore::new(store_config).context(StoreSnafu)?;

    let runner: Arc<dyn CommandRunner> = if config.dry_run {
        warn!("Dry run: external commands are logged, not executed");
        Arc::new(DryRunRunner)
    } else {
        Arc::new(ProcessRunner)
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let report = run_migration(&config, &store, runner, shutdown).await?;
    for (table, message) in &report.failed {
        warn!(target = %table, "Failed: {}", message);
    }
    ensure_complete(&report)?;

    info!(
        "Migrated {} collection(s); logs in {}",
        report.succeeded.len(),
        config.logs_dir.display()
    );
    Ok(())
}
