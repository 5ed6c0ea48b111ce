// src/recording/merge.rs
//! Video merge task
//!
//! Consumer side of the pipeline. Each invocation drains a bounded batch of
//! frames from the [`FrameQueue`] and appends them to the video. The next
//! invocation continues where the previous one stopped, so capture order is
//! preserved across invocation boundaries.
//!
//! # Timeline pacing
//!
//! Capture runs at a fixed rate, so the capture tick that produced a frame
//! ([`Frame::slot`]) is its position on the recording timeline. A frame
//! belongs at video index `slot - first_slot`. Ticks whose screenshot failed
//! leave holes; the previous frame is repeated to fill them so the video
//! plays back in real time. A slow screenshot is followed by back-to-back
//! catch-up ticks which occupy their own slots, so the stall is never filled
//! twice. No frame is ever dropped or reordered.
//!
//! # Artifact lifecycle
//!
//! ```text
//! Pending ──first frame──▶ Encoding ──finish──▶ Finished
//!    │                        │
//!    └────────rollback────────┴──────────────▶ RolledBack
//! ```

use crate::observability::{FRAMES_ENCODED_TOTAL, MERGE_FAILURES_TOTAL};
use crate::recording::encoder::{EncoderFactory, EncoderSettings, VideoEncoder};
use crate::recording::frame::Frame;
use crate::recording::frame_queue::FrameQueue;
use crate::recording::scheduler::PeriodicTask;
use crate::utils::config::RecorderConfig;
use crate::utils::errors::{RecorderError, Result};
use chrono::Local;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use ulid::Ulid;

/// Frames drained by a single scheduled invocation
pub const MAX_FRAMES_PER_INVOCATION: usize = 50;

/// Open video stream and its timeline bookkeeping
struct Encoding {
    encoder: Box<dyn VideoEncoder>,

    /// Capture tick of the first frame
    origin: u64,

    /// Most recently written frame, repeated to fill gaps
    last_frame: Frame,

    /// Video frames written so far, repeats included
    written: u64,
}

enum MergeState {
    /// No frame seen yet; no file on disk
    Pending,

    Encoding(Encoding),

    /// The encoder could not be opened; frames are discarded
    Failed,

    Finished,

    RolledBack,
}

impl MergeState {
    fn name(&self) -> &'static str {
        match self {
            MergeState::Pending => "pending",
            MergeState::Encoding(_) => "encoding",
            MergeState::Failed => "failed",
            MergeState::Finished => "finished",
            MergeState::RolledBack => "rolled back",
        }
    }
}

/// Merge task scheduled with a fixed delay by the recorder
pub struct MergeTask {
    /// Queue shared with the capture task
    queue: Arc<FrameQueue>,

    /// Encoder backend
    factory: Arc<dyn EncoderFactory>,

    settings: EncoderSettings,

    /// Artifact location, fixed at construction
    video_file: PathBuf,

    state: Mutex<MergeState>,

    /// Set by `rollback`, observed by in-flight invocations
    rolled_back: AtomicBool,

    /// Distinct captured frames merged
    frames_merged: AtomicU64,

    /// Video frames written, repeats included
    frames_encoded: AtomicU64,
}

impl MergeTask {
    /// Create a merge task writing to a fresh file under the configured output directory
    pub fn new(
        config: &RecorderConfig,
        queue: Arc<FrameQueue>,
        factory: Arc<dyn EncoderFactory>,
    ) -> Result<Self> {
        let output_dir = if config.output_dir.is_absolute() {
            config.output_dir.clone()
        } else {
            std::env::current_dir()?.join(&config.output_dir)
        };

        let file_name = format!(
            "{}_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            Ulid::new(),
            factory.extension()
        );

        Ok(Self {
            queue,
            settings: EncoderSettings {
                frame_rate: config.frame_rate,
                quality: config.quality,
            },
            video_file: output_dir.join(file_name),
            factory,
            state: Mutex::new(MergeState::Pending),
            rolled_back: AtomicBool::new(false),
            frames_merged: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
        })
    }

    /// Artifact path
    pub fn video_file(&self) -> &Path {
        &self.video_file
    }

    /// Artifact location as a `file://` URL
    pub fn video_url(&self) -> String {
        format!("file://{}", self.video_file.display())
    }

    /// Distinct captured frames merged into the video
    pub fn frames_merged(&self) -> u64 {
        self.frames_merged.load(Ordering::Relaxed)
    }

    /// Video frames written, including repeats
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded.load(Ordering::Relaxed)
    }

    /// Merge one bounded batch of queued frames
    pub fn merge_pending(&self) {
        if self.is_rolled_back() {
            return;
        }

        let mut state = self.state.lock();
        let frames = self.queue.drain_up_to(MAX_FRAMES_PER_INVOCATION);
        if !frames.is_empty() {
            trace!("Merging {} frames", frames.len());
        }
        self.merge_frames(&mut state, frames);
    }

    /// Drain every queued frame and close the video
    ///
    /// Waits at most `wait` for an in-flight invocation to release the
    /// encoder; if it does not, the artifact is left in whatever state that
    /// invocation reaches. Returns the artifact path if a file exists.
    pub fn finish(&self, wait: Duration) -> Option<PathBuf> {
        match self.state.try_lock_for(wait) {
            Some(mut state) => self.complete(&mut state),
            None => warn!(
                "Video merger still busy after {} ms; using video in its current state",
                wait.as_millis()
            ),
        }

        self.existing_artifact()
    }

    /// Stop encoding and delete any partial artifact
    pub fn rollback(&self) {
        self.rolled_back.store(true, Ordering::SeqCst);

        // An in-flight invocation holding the lock discards on its own
        if let Some(mut state) = self.state.try_lock() {
            self.discard(&mut state);
        }

        let dropped = self.queue.clear();
        self.remove_artifact();
        debug!("Video merger rolled back, {} queued frames dropped", dropped);
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back.load(Ordering::SeqCst)
    }

    fn merge_frames(&self, state: &mut MergeState, frames: Vec<Frame>) {
        for frame in frames {
            if self.is_rolled_back() {
                break;
            }
            self.merge_frame(state, frame);
        }

        if self.is_rolled_back() {
            self.discard(state);
        }
    }

    fn merge_frame(&self, state: &mut MergeState, frame: Frame) {
        if matches!(state, MergeState::Pending) {
            *state = self.open(&frame);
        }

        let encoding = match state {
            MergeState::Encoding(encoding) => encoding,
            other => {
                trace!("Dropping frame #{} in state {}", frame.sequence, other.name());
                return;
            }
        };

        let target = frame.slot.saturating_sub(encoding.origin);
        while encoding.written > 0 && encoding.written < target {
            let repeat = encoding.last_frame.clone();
            if !self.write(encoding, &repeat) {
                break;
            }
        }

        self.write(encoding, &frame);
        trace!(
            "Frame #{} merged at index {}, {} ms after capture",
            frame.sequence,
            target,
            frame.captured_at.elapsed().as_millis()
        );
        encoding.last_frame = frame;
        self.frames_merged.fetch_add(1, Ordering::Relaxed);
    }

    /// Write one video frame, absorbing encoder errors
    fn write(&self, encoding: &mut Encoding, frame: &Frame) -> bool {
        match encoding.encoder.write_frame(frame) {
            Ok(()) => {
                encoding.written += 1;
                self.frames_encoded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(FRAMES_ENCODED_TOTAL).increment(1);
                true
            }
            Err(e) => {
                error!("Failed to encode frame #{}: {}", frame.sequence, e);
                metrics::counter!(MERGE_FAILURES_TOTAL).increment(1);
                false
            }
        }
    }

    fn open(&self, first: &Frame) -> MergeState {
        let opened = self
            .video_file
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .map_err(RecorderError::from)
            .and_then(|_| self.factory.open(&self.video_file, &self.settings));

        match opened {
            Ok(encoder) => {
                info!("Started video {:?}", self.video_file);
                MergeState::Encoding(Encoding {
                    encoder,
                    origin: first.slot,
                    last_frame: first.clone(),
                    written: 0,
                })
            }
            Err(e) => {
                error!("Failed to open video {:?}: {}", self.video_file, e);
                metrics::counter!(MERGE_FAILURES_TOTAL).increment(1);
                MergeState::Failed
            }
        }
    }

    fn complete(&self, state: &mut MergeState) {
        if !matches!(state, MergeState::Pending | MergeState::Encoding(_) | MergeState::Failed) {
            return;
        }

        loop {
            let frames = self.queue.drain_up_to(MAX_FRAMES_PER_INVOCATION);
            if frames.is_empty() || self.is_rolled_back() {
                break;
            }
            self.merge_frames(state, frames);
        }

        if self.is_rolled_back() {
            self.discard(state);
            return;
        }

        match std::mem::replace(state, MergeState::Finished) {
            MergeState::Encoding(encoding) => {
                let written = encoding.written;
                match encoding.encoder.finish() {
                    Ok(()) => info!("Video merger finished: {} frames written to {:?}", written, self.video_file),
                    Err(e) => {
                        error!("Failed to finalize video {:?}: {}", self.video_file, e);
                        metrics::counter!(MERGE_FAILURES_TOTAL).increment(1);
                    }
                }
            }
            MergeState::Pending => debug!("Video merger finished without frames"),
            _ => {}
        }
    }

    fn discard(&self, state: &mut MergeState) {
        if let MergeState::Encoding(encoding) = std::mem::replace(state, MergeState::RolledBack) {
            encoding.encoder.abort();
        }
        self.remove_artifact();
    }

    fn remove_artifact(&self) {
        match fs::remove_file(&self.video_file) {
            Ok(()) => debug!("Deleted partial video {:?}", self.video_file),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete partial video {:?}: {}", self.video_file, e),
        }
    }

    fn existing_artifact(&self) -> Option<PathBuf> {
        self.video_file.is_file().then(|| self.video_file.clone())
    }
}

impl PeriodicTask for MergeTask {
    fn run(&self) {
        self.merge_pending();
    }

    fn on_shutdown(&self) {
        let mut state = self.state.lock();
        self.complete(&mut state);
    }
}
