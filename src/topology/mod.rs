//! Bounded-concurrency pipeline orchestration.
//!
//! `PipelineRunner` fans a list of pipelines out over a tokio `JoinSet`.
//! A semaphore sized `max_workers` gates dispatch: a pipeline is spawned
//! only after it holds a permit, and keeps that permit until it finishes.
//! What happens to the rest of the run when one pipeline fails is decided
//! by the `FailurePolicy`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::emit;
use crate::metrics::events::{ActivePipelines, PipelineFinished, PipelineStatus};

/// A self-contained unit of work the runner can execute.
pub trait Pipeline: Send + 'static {
    /// The key identifying this pipeline in logs, metrics and the report.
    type Key: Clone + Display + Send + 'static;

    /// The error type returned by this pipeline.
    type Error: std::error::Error + Send + 'static;

    /// Get a reference to the pipeline's key.
    fn key(&self) -> &Self::Key;

    /// Run this pipeline to completion.
    fn run(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// What the runner does with the rest of the run after a pipeline fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop dispatching and cancel every pipeline still running.
    #[default]
    Abort,
    /// Keep going; failures are only reported.
    Continue,
}

/// Runner settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Maximum number of pipelines running at once; values below 1 are
    /// treated as 1.
    pub max_workers: usize,
    pub on_failure: FailurePolicy,
    /// Upper bound of the random delay before each pipeline starts.
    pub start_jitter_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            on_failure: FailurePolicy::Abort,
            start_jitter_ms: 0,
        }
    }
}

/// Outcome of a run, by pipeline key.
#[derive(Debug)]
pub struct RunReport<K> {
    pub succeeded: Vec<K>,
    /// Failed pipelines with their error message.
    pub failed: Vec<(K, String)>,
    /// Pipelines cancelled while running.
    pub aborted: Vec<K>,
    /// Pipelines never dispatched.
    pub skipped: Vec<K>,
}

impl<K> Default for RunReport<K> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            aborted: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<K> RunReport<K> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.incomplete()
    }

    /// Number of pipelines that did not succeed.
    pub fn incomplete(&self) -> usize {
        self.failed.len() + self.aborted.len() + self.skipped.len()
    }

    pub fn is_success(&self) -> bool {
        self.incomplete() == 0
    }
}

/// How a spawned pipeline task ended.
enum Outcome<E> {
    Finished(Result<(), E>),
    Cancelled,
}

/// Orchestrates pipeline executions with bounded concurrency and shared
/// shutdown handling.
pub struct PipelineRunner<P: Pipeline> {
    pipelines: Vec<P>,
    config: RunnerConfig,
    shutdown: CancellationToken,
    typetag: &'static str,
}

impl<P: Pipeline> PipelineRunner<P> {
    /// Create a new pipeline runner.
    pub fn new(
        pipelines: Vec<P>,
        config: RunnerConfig,
        shutdown: CancellationToken,
        typetag: &'static str,
    ) -> Self {
        Self {
            pipelines,
            config,
            shutdown,
            typetag,
        }
    }

    /// Run all pipelines and report how each one ended.
    pub async fn run(self) -> RunReport<P::Key> {
        let typetag = self.typetag;
        let max_workers = self.config.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let cancel = self.shutdown.child_token();

        let mut handles: JoinSet<Outcome<P::Error>> = JoinSet::new();
        let mut keys: HashMap<Id, P::Key> = HashMap::new();
        let mut report = RunReport::default();
        let mut pending = self.pipelines.into_iter();

        info!(
            count = pending.len(),
            max_workers,
            "Dispatching {} {}s",
            pending.len(),
            typetag
        );

        'dispatch: while let Some(pipeline) = pending.next() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        record_skipped(&mut report, pipeline.key().clone());
                        break 'dispatch;
                    }
                    Some(joined) = handles.join_next_with_id(), if !handles.is_empty() => {
                        self.config.on_failure.apply(
                            record(&mut report, &mut keys, joined, typetag),
                            &cancel,
                        );
                        emit!(ActivePipelines { count: handles.len() });
                    }
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => break permit,
                        Err(_) => {
                            record_skipped(&mut report, pipeline.key().clone());
                            break 'dispatch;
                        }
                    }
                }
            };

            let key = pipeline.key().clone();
            let token = cancel.clone();
            let start_jitter = random_jitter(self.config.start_jitter_ms);
            let task_key = key.clone();

            let handle = handles.spawn(async move {
                let _permit = permit;

                if !start_jitter.is_zero() {
                    info!(
                        target = %task_key,
                        jitter_ms = start_jitter.as_millis() as u64,
                        "Delaying {} start for jitter", typetag
                    );
                    if token
                        .run_until_cancelled(tokio::time::sleep(start_jitter))
                        .await
                        .is_none()
                    {
                        return Outcome::Cancelled;
                    }
                }

                match token.run_until_cancelled(pipeline.run()).await {
                    Some(result) => Outcome::Finished(result),
                    None => Outcome::Cancelled,
                }
            });
            keys.insert(handle.id(), key);
            emit!(ActivePipelines {
                count: handles.len()
            });
        }

        for pipeline in pending {
            record_skipped(&mut report, pipeline.key().clone());
        }

        while let Some(joined) = handles.join_next_with_id().await {
            self.config
                .on_failure
                .apply(record(&mut report, &mut keys, joined, typetag), &cancel);
            emit!(ActivePipelines {
                count: handles.len()
            });
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            aborted = report.aborted.len(),
            skipped = report.skipped.len(),
            "All {}s complete", typetag
        );
        report
    }
}

impl FailurePolicy {
    fn apply(self, failed: bool, cancel: &CancellationToken) {
        if failed && self == FailurePolicy::Abort && !cancel.is_cancelled() {
            warn!("Aborting remaining pipelines after a failure");
            cancel.cancel();
        }
    }
}

/// Record a joined task in the report. Returns true if it failed.
fn record<K, E>(
    report: &mut RunReport<K>,
    keys: &mut HashMap<Id, K>,
    joined: Result<(Id, Outcome<E>), JoinError>,
    typetag: &str,
) -> bool
where
    K: Display,
    E: std::error::Error,
{
    let id = match &joined {
        Ok((id, _)) => *id,
        Err(e) => e.id(),
    };
    let Some(key) = keys.remove(&id) else {
        error!(task = %id, "Joined a {} task with no key", typetag);
        return false;
    };
    let target = key.to_string();

    let status = match joined {
        Ok((_, Outcome::Finished(Ok(())))) => {
            info!(target = %key, "{} completed", typetag);
            report.succeeded.push(key);
            PipelineStatus::Success
        }
        Ok((_, Outcome::Finished(Err(e)))) => {
            error!(target = %key, error = %e, "{} failed", typetag);
            report.failed.push((key, e.to_string()));
            PipelineStatus::Failed
        }
        Ok((_, Outcome::Cancelled)) => {
            warn!(target = %key, "{} aborted", typetag);
            report.aborted.push(key);
            PipelineStatus::Aborted
        }
        Err(e) if e.is_panic() => {
            error!(target = %key, error = %e, "{} task panicked", typetag);
            report.failed.push((key, format!("{typetag} task panicked")));
            PipelineStatus::Failed
        }
        Err(e) => {
            warn!(target = %key, error = %e, "{} task cancelled", typetag);
            report.aborted.push(key);
            PipelineStatus::Aborted
        }
    };

    emit!(PipelineFinished { status, target });
    status == PipelineStatus::Failed
}

fn record_skipped<K: Display>(report: &mut RunReport<K>, key: K) {
    info!(target = %key, "Skipped");
    emit!(PipelineFinished {
        status: PipelineStatus::Skipped,
        target: key.to_string(),
    });
    report.skipped.push(key);
}

/// Generate a random jitter duration up to the specified maximum milliseconds.
pub fn random_jitter(max_ms: u64) -> Duration {
    if max_ms > 0 {
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    } else {
        Duration::ZERO
    }
}
