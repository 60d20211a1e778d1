//! Per-collection log sinks.
//!
//! Each collection gets `stdout.log` and `stderr.log` in its working
//! directory. Files are opened in append mode so re-runs accumulate, and a
//! local timestamp marker separates the output of successive commands.

use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{CreateDirSnafu, LogSinkSnafu, PipelineError};

pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";

/// Append-mode stdout/stderr log pair for one collection.
#[derive(Debug)]
pub struct LogSinks {
    dir: PathBuf,
    stdout: File,
    stderr: File,
}

async fn open_append(path: &Path) -> Result<File, PipelineError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context(LogSinkSnafu { path })
}

impl LogSinks {
    /// Create `dir` if needed and open both logs.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .context(CreateDirSnafu { path: &dir })?;

        let stdout = open_append(&dir.join(STDOUT_LOG)).await?;
        let stderr = open_append(&dir.join(STDERR_LOG)).await?;
        Ok(Self {
            dir,
            stdout,
            stderr,
        })
    }

    /// The collection's working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.dir.join(STDOUT_LOG)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.dir.join(STDERR_LOG)
    }

    /// Write a timestamp marker to both logs.
    pub async fn mark(&mut self) -> Result<(), PipelineError> {
        let marker = format!("\n{}\n", chrono::Local::now());
        for (file, path) in [
            (&mut self.stdout, self.dir.join(STDOUT_LOG)),
            (&mut self.stderr, self.dir.join(STDERR_LOG)),
        ] {
            file.write_all(marker.as_bytes())
                .await
                .context(LogSinkSnafu { path: &path })?;
            file.flush().await.context(LogSinkSnafu { path })?;
        }
        Ok(())
    }

    /// Append a line to the stdout log.
    pub async fn note(&mut self, line: &str) -> Result<(), PipelineError> {
        let path = self.stdout_path();
        self.stdout
            .write_all(format!("{line}\n").as_bytes())
            .await
            .context(LogSinkSnafu { path: &path })?;
        self.stdout.flush().await.context(LogSinkSnafu { path })
    }

    /// Handles a child process can write its stdout and stderr into.
    pub async fn stdio(&self) -> Result<(Stdio, Stdio), PipelineError> {
        let stdout = self
            .stdout
            .try_clone()
            .await
            .context(LogSinkSnafu {
                path: self.stdout_path(),
            })?
            .into_std()
            .await;
        let stderr = self
            .stderr
            .try_clone()
            .await
            .context(LogSinkSnafu {
                path: self.stderr_path(),
            })?
            .into_std()
            .await;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }
}
