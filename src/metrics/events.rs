//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence during a migration
//! run. Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.
//!
//! ## Target Labels
//!
//! Per-collection metrics carry a `target` label holding the table
//! identifier (e.g. `"orders"`, `"users"`).

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use super::server::RUN_STATE;
use crate::pipeline::PipelineStage;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted once discovery has resolved the working set.
pub struct CollectionsDiscovered {
    pub count: u64,
}

impl InternalEvent for CollectionsDiscovered {
    fn emit(self) {
        trace!(count = self.count, "Collections discovered");
        counter!("fs_to_bq_collections_discovered_total").increment(self.count);
        RUN_STATE.record_discovered(self.count as usize);
    }
}

/// Event emitted when schema inference drops a field it cannot type.
pub struct FieldDropped {
    pub kind: String,
}

impl InternalEvent for FieldDropped {
    fn emit(self) {
        trace!(kind = %self.kind, "Field dropped");
        counter!("fs_to_bq_schema_fields_dropped_total", "kind" => self.kind).increment(1);
    }
}

/// Event emitted when a pipeline stage finishes successfully.
pub struct StageCompleted {
    pub stage: PipelineStage,
    pub duration: Duration,
    /// Target label (table identifier).
    pub target: String,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        trace!(
            stage = self.stage.as_str(),
            duration_ms = self.duration.as_millis() as u64,
            target = %self.target,
            "Stage completed"
        );
        histogram!(
            "fs_to_bq_stage_duration_seconds",
            "stage" => self.stage.as_str(),
            "target" => self.target
        )
        .record(self.duration.as_secs_f64());
    }
}

/// Final status of one collection's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Success,
    Failed,
    Aborted,
    Skipped,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Success => "success",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Aborted => "aborted",
            PipelineStatus::Skipped => "skipped",
        }
    }
}

/// Event emitted when a collection's pipeline reaches a final state.
pub struct PipelineFinished {
    pub status: PipelineStatus,
    /// Target label (table identifier).
    pub target: String,
}

impl InternalEvent for PipelineFinished {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "Pipeline finished");
        RUN_STATE.record_finished(self.status);
        counter!(
            "fs_to_bq_pipelines_total",
            "status" => self.status.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// Gauge tracking how many pipelines are currently running.
pub struct ActivePipelines {
    pub count: usize,
}

impl InternalEvent for ActivePipelines {
    fn emit(self) {
        trace!(count = self.count, "Active pipelines");
        gauge!("fs_to_bq_active_pipelines").set(self.count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_status_labels() {
        assert_eq!(PipelineStatus::Success.as_str(), "success");
        assert_eq!(PipelineStatus::Failed.as_str(), "failed");
        assert_eq!(PipelineStatus::Aborted.as_str(), "aborted");
        assert_eq!(PipelineStatus::Skipped.as_str(), "skipped");
    }

    #[test]
    fn test_emit_without_recorder_is_noop() {
        // No recorder installed: emitting must not panic.
        crate::emit!(ActivePipelines { count: 3 });
        crate::emit!(StageCompleted {
            stage: PipelineStage::Backfill,
            duration: Duration::from_millis(5),
            target: "orders".to_string(),
        });
    }

    #[test]
    fn test_discovery_event_marks_run_ready() {
        crate::emit!(CollectionsDiscovered { count: 2 });
        assert!(RUN_STATE.is_ready());
    }
}
