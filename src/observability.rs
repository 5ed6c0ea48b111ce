// src/observability.rs
//! Logging and metrics setup
//!
//! The library only emits `tracing` events and `metrics` counters; hosts
//! decide where they go. [`init_tracing`] is a convenience for hosts and
//! tests that have no subscriber of their own.

use tracing_subscriber::EnvFilter;

/// Screenshots pushed to the frame queue
pub const FRAMES_CAPTURED_TOTAL: &str = "video_recorder_frames_captured_total";

/// Screenshot attempts that failed
pub const CAPTURE_FAILURES_TOTAL: &str = "video_recorder_capture_failures_total";

/// Video frames written, repeats included
pub const FRAMES_ENCODED_TOTAL: &str = "video_recorder_frames_encoded_total";

/// Encoder open, write and finalize failures
pub const MERGE_FAILURES_TOTAL: &str = "video_recorder_merge_failures_total";

/// Worker shutdown waits that timed out
pub const SHUTDOWN_TIMEOUTS_TOTAL: &str = "video_recorder_shutdown_timeouts_total";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Register descriptions for the recorder's counters with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(FRAMES_CAPTURED_TOTAL, "Screenshots pushed to the frame queue");
    metrics::describe_counter!(CAPTURE_FAILURES_TOTAL, "Screenshot attempts that failed");
    metrics::describe_counter!(FRAMES_ENCODED_TOTAL, "Video frames written, repeats included");
    metrics::describe_counter!(MERGE_FAILURES_TOTAL, "Encoder open, write and finalize failures");
    metrics::describe_counter!(SHUTDOWN_TIMEOUTS_TOTAL, "Worker shutdown waits that timed out");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        assert!(!init_tracing());
        describe_metrics();
    }
}
