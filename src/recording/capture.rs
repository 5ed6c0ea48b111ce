// src/recording/capture.rs
//! Screenshot capture task
//!
//! Producer side of the pipeline. Every scheduled invocation takes one
//! screenshot from a [`ScreenshotSource`] and pushes it onto the shared
//! [`FrameQueue`] with the next sequence number and the index of the tick
//! that took it.
//!
//! A failed screenshot is logged and skipped; it never escapes the
//! invocation, so later invocations keep running.

use crate::observability::{CAPTURE_FAILURES_TOTAL, FRAMES_CAPTURED_TOTAL};
use crate::recording::frame::Frame;
use crate::recording::frame_queue::FrameQueue;
use crate::recording::scheduler::PeriodicTask;
use crate::utils::errors::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Something that can take a screenshot of the session under test
///
/// The returned bytes are an encoded image (PNG or JPEG) and are passed to
/// the encoder untouched.
pub trait ScreenshotSource: Send + 'static {
    fn take_screenshot(&mut self) -> Result<Bytes>;
}

impl<F> ScreenshotSource for F
where
    F: FnMut() -> Result<Bytes> + Send + 'static,
{
    fn take_screenshot(&mut self) -> Result<Bytes> {
        self()
    }
}

/// Capture task scheduled at a fixed rate by the recorder
pub struct CaptureTask {
    /// Screenshot provider
    source: Mutex<Box<dyn ScreenshotSource>>,

    /// Queue shared with the merge task
    queue: Arc<FrameQueue>,

    /// Sequence number of the next captured frame
    next_sequence: AtomicU64,

    /// Capture ticks run so far, failed screenshots included
    ticks: AtomicU64,

    /// Set by `cancel`
    cancelled: AtomicBool,

    /// Set by `finish`
    finished: AtomicBool,

    /// Failed screenshot attempts
    failures: AtomicU64,
}

impl CaptureTask {
    /// Create a capture task feeding `queue`
    pub fn new(source: impl ScreenshotSource, queue: Arc<FrameQueue>) -> Self {
        Self {
            source: Mutex::new(Box::new(source)),
            queue,
            next_sequence: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            failures: AtomicU64::new(0),
        }
    }

    /// Capture one frame and enqueue it
    pub fn capture(&self) {
        if self.is_stopped() {
            return;
        }

        let slot = self.ticks.fetch_add(1, Ordering::SeqCst);
        let captured_at = Instant::now();
        let screenshot = self.source.lock().take_screenshot();

        // Stop may have been requested while the screenshot was taken
        if self.is_stopped() {
            trace!("Dropping screenshot taken after capture stopped");
            return;
        }

        match screenshot {
            Ok(image) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
                trace!("Captured frame #{} at tick {} ({} bytes)", sequence, slot, image.len());
                self.queue.push(Frame::new(sequence, captured_at, image).with_slot(slot));
                metrics::counter!(FRAMES_CAPTURED_TOTAL).increment(1);
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Failed to take screenshot (failure #{}): {}", failures, e);
                metrics::counter!(CAPTURE_FAILURES_TOTAL).increment(1);
            }
        }
    }

    /// Stop capturing immediately, without any further side effects
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        debug!("Screenshooter cancelled after {} frames", self.frames_captured());
    }

    /// Signal that no more frames will be produced
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "Screenshooter finished: {} frames captured, {} failed screenshots",
            self.frames_captured(),
            self.failures()
        );
    }

    /// Number of frames pushed to the queue so far
    pub fn frames_captured(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.finished.load(Ordering::SeqCst)
    }
}

impl PeriodicTask for CaptureTask {
    fn run(&self) {
        self.capture();
    }
}
