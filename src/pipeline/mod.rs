//! Per-collection migration pipeline.
//!
//! Each collection runs the same strictly ordered stages:
//!
//! 1. derive the collection's parameters
//! 2. open its log sinks in `<logs_root>/<table_id>/`
//! 3. write the extension parameter file (`.env`)
//! 4. install the export extension instance
//! 5. backfill existing documents
//! 6. in schema-aware mode, write `schema.json` and create typed views
//!
//! A stage only starts after the previous one succeeded. Nothing is retried
//! or rolled back; the first failure ends the pipeline with an error naming
//! the stage.

mod command;
mod logs;

use snafu::prelude::*;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub use command::{
    BACKFILL_BATCH_SIZE, CommandRunner, CommandStatus, DryRunRunner, EXTENSION_REF,
    ExternalCommand, IMPORT_PACKAGE, ProcessRunner, VIEWS_PACKAGE, backfill_command,
    install_command, view_command,
};
pub use logs::{LogSinks, STDERR_LOG, STDOUT_LOG};

use crate::config::{CollectionParams, MigrationParams, TableId};
use crate::discovery::CollectionTask;
use crate::emit;
use crate::error::{
    CommandFailedSnafu, NoTableIdSnafu, PipelineError, SerializeSchemaSnafu, WriteConfigSnafu,
    WriteSchemaSnafu,
};
use crate::metrics::events::StageCompleted;
use crate::schema::Schema;
use crate::topology::Pipeline;

/// Extension parameter file in the collection directory.
pub const ENV_FILE: &str = ".env";
/// Schema description read by the view generator.
pub const SCHEMA_FILE: &str = "schema.json";

/// Stages of a collection pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    DeriveParams,
    PrepareLogs,
    WriteConfig,
    InstallStream,
    Backfill,
    CreateViews,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::DeriveParams => "derive_params",
            PipelineStage::PrepareLogs => "prepare_logs",
            PipelineStage::WriteConfig => "write_config",
            PipelineStage::InstallStream => "install_stream",
            PipelineStage::Backfill => "backfill",
            PipelineStage::CreateViews => "create_views",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Migration of one collection.
pub struct CollectionPipeline {
    params: CollectionParams,
    schema: Option<Schema>,
    logs_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl CollectionPipeline {
    /// Build the pipeline for a discovered collection.
    ///
    /// Deriving the collection parameters is the first stage; it fails when
    /// the collection path has no segment to name the table after.
    pub fn new(
        base: &MigrationParams,
        task: CollectionTask,
        logs_root: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, PipelineError> {
        let params = base
            .for_collection(&task.collection_path)
            .context(NoTableIdSnafu {
                path: task.collection_path.as_str(),
            })?;
        debug!(
            target = %params.table_id(),
            collection = %params.collection_path(),
            "Derived collection parameters"
        );

        Ok(Self {
            params,
            schema: task.schema,
            logs_root: logs_root.into(),
            runner,
        })
    }

    pub fn params(&self) -> &CollectionParams {
        &self.params
    }

    /// Working directory holding the logs and artifacts.
    pub fn dir(&self) -> PathBuf {
        self.logs_root.join(self.params.table_id().id())
    }

    async fn execute(self) -> Result<(), PipelineError> {
        let dir = self.dir();
        info!(
            target = %self.params.table_id(),
            collection = %self.params.collection_path(),
            dir = %dir.display(),
            "Starting collection pipeline"
        );

        let mut logs = self
            .stage(PipelineStage::PrepareLogs, LogSinks::open(&dir))
            .await?;

        let env_file = dir.join(ENV_FILE);
        self.stage(PipelineStage::WriteConfig, self.write_config(&env_file))
            .await?;

        let install = install_command(&self.params, &env_file);
        self.stage(
            PipelineStage::InstallStream,
            self.invoke(PipelineStage::InstallStream, &mut logs, install),
        )
        .await?;

        let backfill = backfill_command(&self.params);
        self.stage(
            PipelineStage::Backfill,
            self.invoke(PipelineStage::Backfill, &mut logs, backfill),
        )
        .await?;

        if let Some(schema) = &self.schema {
            let schema_file = dir.join(SCHEMA_FILE);
            self.stage(PipelineStage::CreateViews, async {
                write_schema(schema, &schema_file).await?;
                let views = view_command(&self.params, &schema_file);
                self.invoke(PipelineStage::CreateViews, &mut logs, views)
                    .await
            })
            .await?;
        }

        Ok(())
    }

    /// Run one stage, recording its duration when it succeeds.
    async fn stage<T, F>(&self, stage: PipelineStage, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let start = Instant::now();
        let output = work.await?;
        let duration = start.elapsed();

        debug!(
            target = %self.params.table_id(),
            stage = %stage,
            elapsed_ms = duration.as_millis() as u64,
            "Stage completed"
        );
        emit!(StageCompleted {
            stage,
            duration,
            target: self.params.table_id().to_string(),
        });
        Ok(output)
    }

    async fn write_config(&self, path: &Path) -> Result<(), PipelineError> {
        tokio::fs::write(path, self.params.render_env())
            .await
            .context(WriteConfigSnafu { path })
    }

    async fn invoke(
        &self,
        stage: PipelineStage,
        logs: &mut LogSinks,
        command: ExternalCommand,
    ) -> Result<(), PipelineError> {
        logs.mark().await?;
        logs.note(&format!("$ {command}")).await?;
        info!(
            target = %self.params.table_id(),
            stage = %stage,
            "Running {}",
            command
        );

        let status = self.runner.run(stage, &command, logs).await?;
        ensure!(
            status.is_success(),
            CommandFailedSnafu {
                stage,
                command: command.to_string(),
                code: status.code,
            }
        );
        Ok(())
    }
}

async fn write_schema(schema: &Schema, path: &Path) -> Result<(), PipelineError> {
    let json = schema.to_json_pretty().context(SerializeSchemaSnafu)?;
    tokio::fs::write(path, json)
        .await
        .context(WriteSchemaSnafu { path })
}

impl Pipeline for CollectionPipeline {
    type Key = TableId;
    type Error = PipelineError;

    fn key(&self) -> &Self::Key {
        self.params.table_id()
    }

    async fn run(self) -> Result<(), Self::Error> {
        self.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, SchemaField};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every command and fails the given stage with exit code 1.
    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(PipelineStage, ExternalCommand)>>,
        fail_at: Option<PipelineStage>,
    }

    impl RecordingRunner {
        fn failing_at(stage: PipelineStage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::default()
            }
        }

        fn stages(&self) -> Vec<PipelineStage> {
            self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(
            &self,
            stage: PipelineStage,
            command: &ExternalCommand,
            _logs: &LogSinks,
        ) -> Result<CommandStatus, PipelineError> {
            self.calls.lock().unwrap().push((stage, command.clone()));
            let code = if self.fail_at == Some(stage) { 1 } else { 0 };
            Ok(CommandStatus { code: Some(code) })
        }
    }

    fn base() -> MigrationParams {
        MigrationParams {
            project_id: "acme".to_string(),
            dataset_id: "acme_firestore_export".to_string(),
            ..MigrationParams::default()
        }
    }

    fn task(path: &str, schema: Option<Schema>) -> CollectionTask {
        CollectionTask {
            collection_path: path.to_string(),
            schema,
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::InstallStream.to_string(), "install_stream");
        assert_eq!(PipelineStage::CreateViews.as_str(), "create_views");
    }

    #[test]
    fn test_invalid_collection_path() {
        let runner = Arc::new(RecordingRunner::default());
        let result = CollectionPipeline::new(&base(), task("/", None), "/tmp", runner);
        let err = result.err().unwrap();
        assert_eq!(err.stage(), PipelineStage::DeriveParams);
    }

    #[tokio::test]
    async fn test_runs_install_then_backfill() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pipeline =
            CollectionPipeline::new(&base(), task("orders", None), root.path(), runner.clone())
                .unwrap();
        assert_eq!(pipeline.key().id(), "orders");

        pipeline.run().await.unwrap();

        assert_eq!(
            runner.stages(),
            vec![PipelineStage::InstallStream, PipelineStage::Backfill]
        );
        let calls = runner.calls.lock().unwrap();
        let env_file = root.path().join("orders").join(ENV_FILE);
        assert_eq!(calls[0].1, install_command(
            &base().for_collection("orders").unwrap(),
            &env_file
        ));

        let env = std::fs::read_to_string(&env_file).unwrap();
        assert!(env.contains("COLLECTION_PATH=\"orders\"\n"));
        assert!(env.contains("TABLE_ID=\"orders\"\n"));
        assert!(!root.path().join("orders").join(SCHEMA_FILE).exists());

        let stdout = std::fs::read_to_string(root.path().join("orders").join(STDOUT_LOG)).unwrap();
        assert_eq!(stdout.matches('\n').count(), 6, "marker and command line per command");
        assert!(stdout.contains("$ firebase --project=acme ext:install"));
        assert!(stdout.contains(&format!("$ npx {IMPORT_PACKAGE} --non-interactive")));
    }

    #[tokio::test]
    async fn test_install_failure_skips_backfill() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::failing_at(PipelineStage::InstallStream));
        let pipeline =
            CollectionPipeline::new(&base(), task("orders", None), root.path(), runner.clone())
                .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::InstallStream);
        assert!(matches!(
            err,
            PipelineError::CommandFailed { code: Some(1), .. }
        ));
        assert_eq!(runner.stages(), vec![PipelineStage::InstallStream]);
    }

    #[tokio::test]
    async fn test_schema_aware_writes_schema_and_creates_views() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let schema = Schema::new(vec![
            SchemaField::new("name", FieldType::String),
            SchemaField::map(
                "address",
                vec![SchemaField::new("city", FieldType::String)],
            ),
        ]);
        let pipeline = CollectionPipeline::new(
            &base(),
            task("users/alice/orders", Some(schema.clone())),
            root.path(),
            runner.clone(),
        )
        .unwrap();

        pipeline.run().await.unwrap();

        assert_eq!(
            runner.stages(),
            vec![
                PipelineStage::InstallStream,
                PipelineStage::Backfill,
                PipelineStage::CreateViews
            ]
        );
        let schema_file = root.path().join("orders").join(SCHEMA_FILE);
        let written: Schema =
            serde_json::from_str(&std::fs::read_to_string(&schema_file).unwrap()).unwrap();
        assert_eq!(written, schema);

        let calls = runner.calls.lock().unwrap();
        assert!(
            calls[2]
                .1
                .args
                .contains(&format!("--schema-files={}", schema_file.display()))
        );
    }

    #[tokio::test]
    async fn test_backfill_failure_skips_views() {
        let root = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::failing_at(PipelineStage::Backfill));
        let pipeline = CollectionPipeline::new(
            &base(),
            task("orders", Some(Schema::default())),
            root.path(),
            runner.clone(),
        )
        .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::Backfill);
        assert!(!root.path().join("orders").join(SCHEMA_FILE).exists());
    }

    #[tokio::test]
    async fn test_unwritable_logs_root_fails_prepare_logs() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();

        let runner = Arc::new(RecordingRunner::default());
        let pipeline =
            CollectionPipeline::new(&base(), task("orders", None), &blocker, runner.clone())
                .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::PrepareLogs);
        assert!(runner.stages().is_empty());
    }
}
