//! External commands and how they are run.
//!
//! The three tools a pipeline drives are described as `ExternalCommand`
//! values and executed through a `CommandRunner`, so the pipeline can be
//! run for real, in dry-run mode, or against a recording runner in tests.

use async_trait::async_trait;
use snafu::prelude::*;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::PipelineStage;
use super::logs::LogSinks;
use crate::config::CollectionParams;
use crate::error::{PipelineError, SpawnSnafu};

pub const EXTENSION_REF: &str = "firebase/firestore-bigquery-export";
pub const IMPORT_PACKAGE: &str = "@firebaseextensions/fs-bq-import-collection";
pub const VIEWS_PACKAGE: &str = "@firebaseextensions/fs-bq-schema-views";

/// Documents per write batch during backfill.
pub const BACKFILL_BATCH_SIZE: usize = 300;

/// A program invocation with optional standard input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status of a finished command. `code` is `None` when the process
/// was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands for a pipeline stage.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion with its output appended to `logs`.
    ///
    /// An `Err` means the command could not be run at all; a command that
    /// ran and failed is reported through the returned status.
    async fn run(
        &self,
        stage: PipelineStage,
        command: &ExternalCommand,
        logs: &LogSinks,
    ) -> Result<CommandStatus, PipelineError>;
}

/// Runs commands as child processes.
///
/// Children are killed if their pipeline is dropped, so aborting a run
/// does not leave tools running in the background.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        stage: PipelineStage,
        command: &ExternalCommand,
        logs: &LogSinks,
    ) -> Result<CommandStatus, PipelineError> {
        let (stdout, stderr) = logs.stdio().await?;
        let spawn_context = || SpawnSnafu {
            stage,
            command: command.to_string(),
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .with_context(|_| spawn_context())?;

        debug!(stage = %stage, pid = ?child.id(), "Spawned {}", command.program);

        if let (Some(input), Some(mut pipe)) = (&command.stdin, child.stdin.take()) {
            match pipe.write_all(input.as_bytes()).await {
                Ok(()) => {}
                // The child exited without reading; its exit status decides.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(stage = %stage, "{} closed stdin before reading it", command.program);
                }
                Err(e) => return Err(e).with_context(|_| spawn_context()),
            }
            // Close stdin so the child sees EOF.
            drop(pipe);
        }

        let status = child.wait().await.with_context(|_| spawn_context())?;
        Ok(CommandStatus {
            code: status.code(),
        })
    }
}

/// Logs commands instead of running them.
#[derive(Debug, Default, Clone)]
pub struct DryRunRunner;

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn run(
        &self,
        stage: PipelineStage,
        command: &ExternalCommand,
        logs: &LogSinks,
    ) -> Result<CommandStatus, PipelineError> {
        info!(
            stage = %stage,
            dir = %logs.dir().display(),
            "[dry run] {}",
            command
        );
        Ok(CommandStatus::success())
    }
}

/// `firebase ext:install` for the collection's extension instance.
///
/// The instance id is fed on stdin because the CLI prompts for it even in
/// non-interactive mode.
pub fn install_command(params: &CollectionParams, env_file: &Path) -> ExternalCommand {
    ExternalCommand::new("firebase")
        .arg(format!("--project={}", params.base().project_id))
        .arg("ext:install")
        .arg(format!("--params={}", env_file.display()))
        .arg(EXTENSION_REF)
        .arg("--force")
        .arg("--non-interactive")
        .stdin(params.instance_id())
}

/// Import of every existing document into the changelog table.
///
/// A wildcard path is imported as a collection group named by its final
/// segment.
pub fn backfill_command(params: &CollectionParams) -> ExternalCommand {
    let base = params.base();
    let group = params.is_collection_group();
    let source = if group {
        params.table_id().id()
    } else {
        params.collection_path()
    };
    ExternalCommand::new("npx")
        .arg(IMPORT_PACKAGE)
        .arg("--non-interactive")
        .arg(format!("--project={}", base.project_id))
        .arg(format!("--source-collection-path={source}"))
        .arg(format!("--dataset={}", base.dataset_id))
        .arg(format!("--table-name-prefix={}", params.table_id()))
        .arg("--multi-threaded")
        .arg(format!("--dataset-location={}", base.dataset_location))
        .arg(format!("--query-collection-group={group}"))
        .arg(format!("--batch-size={BACKFILL_BATCH_SIZE}"))
}

/// Typed view generation from a schema file.
pub fn view_command(params: &CollectionParams, schema_file: &Path) -> ExternalCommand {
    let base = params.base();
    ExternalCommand::new("npx")
        .arg(VIEWS_PACKAGE)
        .arg("--non-interactive")
        .arg(format!("--project={}", base.project_id))
        .arg(format!("--dataset={}", base.dataset_id))
        .arg(format!("--table-name-prefix={}", params.table_id()))
        .arg(format!("--schema-files={}", schema_file.display()))
}
