// src/recording/recorder.rs
//! Video recorder orchestrating capture and merge workers
//!
//! A recorder owns the frame queue, both tasks and one scheduler per task
//! for a single recording session:
//!
//! ```text
//! Idle ──start──▶ Recording ──finish──▶ Finishing ──▶ Terminated
//!                     │
//!                     └──────cancel───▶ Cancelling ─▶ Terminated
//! ```
//!
//! Exactly one of `finish`/`cancel` may be called, once, after `start`.
//! Any other sequence is rejected with [`RecorderError::InvalidState`].

use crate::observability::SHUTDOWN_TIMEOUTS_TOTAL;
use crate::recording::attachment::AttachmentSink;
use crate::recording::capture::{CaptureTask, ScreenshotSource};
use crate::recording::encoder::{EncoderFactory, FfmpegEncoderFactory};
use crate::recording::frame_queue::{FrameQueue, QueueStats};
use crate::recording::merge::MergeTask;
use crate::recording::scheduler::{InterruptHandle, PeriodicScheduler, SchedulePolicy, Termination};
use crate::utils::config::RecorderConfig;
use crate::utils::errors::{RecorderError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `finish` waits for the capture worker to stop
pub const CAPTURE_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Delay between merge invocations
pub const MERGE_DELAY: Duration = Duration::from_millis(1);

/// Recorder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Finishing,
    Cancelling,
    Terminated,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a graceful `finish`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    /// Video handed to the attachment sink, if one was produced
    pub video_file: Option<PathBuf>,

    /// Frames captured during the session
    pub frames_captured: u64,

    /// Video frames written, repeats included
    pub frames_encoded: u64,

    /// Capture worker stopped within [`CAPTURE_SHUTDOWN_TIMEOUT`]
    pub capture_stopped_in_time: bool,

    /// Merge worker stopped within the configured merge timeout
    pub merge_stopped_in_time: bool,
}

/// Screenshot-based video recorder for one test session
pub struct VideoRecorder {
    config: RecorderConfig,

    /// Shared between the two workers
    queue: Arc<FrameQueue>,

    capture_task: Arc<CaptureTask>,
    merge_task: Arc<MergeTask>,

    /// Fixed-rate capture worker
    screenshooter: PeriodicScheduler,

    /// Fixed-delay merge worker
    video_merger: PeriodicScheduler,

    sink: Arc<dyn AttachmentSink>,
    interrupt: InterruptHandle,
    state: RecorderState,
}

impl VideoRecorder {
    /// Create a recorder encoding with FFmpeg
    pub fn new(
        config: RecorderConfig,
        source: impl ScreenshotSource,
        sink: Arc<dyn AttachmentSink>,
    ) -> Result<Self> {
        Self::with_encoder(config, source, Arc::new(FfmpegEncoderFactory::new()), sink)
    }

    /// Create a recorder with a custom encoder backend
    pub fn with_encoder(
        config: RecorderConfig,
        source: impl ScreenshotSource,
        encoder: Arc<dyn EncoderFactory>,
        sink: Arc<dyn AttachmentSink>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(FrameQueue::new());
        let capture_task = Arc::new(CaptureTask::new(source, Arc::clone(&queue)));
        let merge_task = Arc::new(MergeTask::new(&config, Arc::clone(&queue), encoder)?);

        Ok(Self {
            config,
            queue,
            capture_task,
            merge_task,
            screenshooter: PeriodicScheduler::new("video-recorder:screenshots:"),
            video_merger: PeriodicScheduler::new("video-recorder:stream:"),
            sink,
            interrupt: InterruptHandle::new(),
            state: RecorderState::Idle,
        })
    }

    /// Start capturing, and merging too in streaming mode
    ///
    /// If a worker cannot be spawned, whatever was started is stopped again
    /// and the recorder ends up `Terminated`.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", RecorderState::Idle)?;

        let period = self.config.frame_period();
        info!(
            "Starting screenshooter every {} nanoseconds to achieve fps {}",
            period.as_nanos(),
            self.config.frame_rate
        );

        if let Err(e) = self.start_workers(period) {
            error!("Failed to start video recorder: {}", e);
            self.stop_workers_now();
            self.state = RecorderState::Terminated;
            return Err(e);
        }

        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Stop recording, finalize the video and attach it
    ///
    /// Worker shutdown timeouts are logged and reported in the returned
    /// [`FinishReport`]; the video is attached in whatever state it reached.
    /// An interrupted wait aborts `finish` before anything is attached.
    pub fn finish(&mut self) -> Result<FinishReport> {
        self.transition("finish", RecorderState::Recording, RecorderState::Finishing)?;

        let result = self.shutdown_gracefully();
        self.state = RecorderState::Terminated;
        result
    }

    /// Stop recording immediately and delete any partial video
    pub fn cancel(&mut self) -> Result<()> {
        self.transition("cancel", RecorderState::Recording, RecorderState::Cancelling)?;

        self.stop_workers_now();

        info!("Video recording cancelled");
        self.state = RecorderState::Terminated;
        Ok(())
    }

    /// Artifact location as a `file://` URL; meaningful after `finish`
    pub fn video_url(&self) -> String {
        self.merge_task.video_url()
    }

    /// Artifact path; meaningful after `finish`
    pub fn video_file(&self) -> &Path {
        self.merge_task.video_file()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Handle another thread can use to interrupt a blocked `finish`
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Whether the merge worker has been started
    pub(crate) fn is_merging(&self) -> bool {
        self.video_merger.is_started()
    }

    fn start_workers(&mut self, period: Duration) -> Result<()> {
        self.screenshooter
            .start(Arc::clone(&self.capture_task), SchedulePolicy::FixedRate(period))?;

        if self.config.save_mode.merges_on_the_fly() {
            self.start_video_merger()?;
        }
        Ok(())
    }

    /// Stop both workers without waiting and drop any partial video
    fn stop_workers_now(&mut self) {
        self.capture_task.cancel();
        self.screenshooter.shutdown_now();
        self.merge_task.rollback();
        self.video_merger.shutdown_now();
    }

    fn start_video_merger(&mut self) -> Result<()> {
        debug!("Start video merger x {:?}", MERGE_DELAY);
        self.video_merger
            .start(Arc::clone(&self.merge_task), SchedulePolicy::FixedDelay(MERGE_DELAY))
    }

    fn shutdown_gracefully(&mut self) -> Result<FinishReport> {
        // Batch mode merges only now, and only if there is something to merge
        if !self.config.save_mode.merges_on_the_fly() && !self.queue.is_empty() {
            self.start_video_merger()?;
        }

        debug!("Stopping video recorder...");

        self.screenshooter.shutdown();
        let capture_stopped_in_time = Self::stop(
            "Screenshooter",
            &mut self.screenshooter,
            CAPTURE_SHUTDOWN_TIMEOUT,
            &self.interrupt,
        )?;
        self.screenshooter.shutdown_now();
        self.capture_task.finish();

        let merge_timeout = self.config.merge_timeout();
        let merge_start = Instant::now();
        self.video_merger.shutdown();
        let merge_stopped_in_time = Self::stop(
            "Video merger",
            &mut self.video_merger,
            merge_timeout,
            &self.interrupt,
        )?;
        self.video_merger.shutdown_now();

        // Best effort: finalize even if the worker timed out
        let remaining = merge_timeout.saturating_sub(merge_start.elapsed());
        let video_file = self.merge_task.finish(remaining);

        match &video_file {
            Some(file) => {
                info!("Video recorded: {}", self.video_url());
                self.sink.attach(file)?;
            }
            None => warn!("No video recorded at {}; nothing to attach", self.video_url()),
        }

        Ok(FinishReport {
            video_file,
            frames_captured: self.capture_task.frames_captured(),
            frames_encoded: self.merge_task.frames_encoded(),
            capture_stopped_in_time,
            merge_stopped_in_time,
        })
    }

    /// Wait for a worker to stop; a timeout is logged, not fatal
    fn stop(
        name: &str,
        scheduler: &mut PeriodicScheduler,
        timeout: Duration,
        interrupt: &InterruptHandle,
    ) -> Result<bool> {
        match scheduler.await_termination(timeout, interrupt)? {
            Termination::Stopped(elapsed) => {
                debug!("{} thread stopped in {} ms.", name, elapsed.as_millis());
                Ok(true)
            }
            Termination::TimedOut => {
                warn!("{} thread hasn't completed in {} ms.", name, timeout.as_millis());
                metrics::counter!(SHUTDOWN_TIMEOUTS_TOTAL).increment(1);
                Ok(false)
            }
        }
    }

    fn transition(
        &mut self,
        operation: &'static str,
        expected: RecorderState,
        next: RecorderState,
    ) -> Result<()> {
        self.expect_state(operation, expected)?;
        self.state = next;
        Ok(())
    }

    fn expect_state(&self, operation: &'static str, expected: RecorderState) -> Result<()> {
        if self.state != expected {
            return Err(RecorderError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for VideoRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VideoRecorder{{fps:{}, queueSize:{}}}",
            self.config.frame_rate,
            self.queue.len()
        )
    }
}

impl fmt::Debug for VideoRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoRecorder")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("queue", &self.queue.stats())
            .field("screenshooter", &self.screenshooter)
            .field("video_merger", &self.video_merger)
            .field("merging", &self.is_merging())
            .finish()
    }
}
