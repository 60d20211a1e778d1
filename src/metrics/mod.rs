//! Metrics for migration runs.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: optional Prometheus HTTP endpoint

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding metric. Without an installed recorder this is a no-op.
///
/// # Example
///
/// ```ignore
/// use fs_to_bq::metrics::events::ActivePipelines;
///
/// emit!(ActivePipelines { count: 2 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
