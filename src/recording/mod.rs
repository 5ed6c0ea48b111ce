// src/recording/mod.rs
//! Screenshot video recording
//!
//! This module turns periodic screenshots of a UI session into a video:
//!
//! - **Frame**: One screenshot plus its sequence number and capture instant
//! - **Frame Queue**: Lock-free unbounded FIFO between the two workers
//! - **Scheduler**: Single-thread periodic worker (fixed rate / fixed delay)
//! - **Capture**: Producer taking one screenshot per tick
//! - **Encoder**: FFmpeg-backed video encoder seam
//! - **Merge**: Consumer draining the queue into the video file
//! - **Attachment**: Where finished videos are handed over
//! - **Recorder**: Lifecycle orchestration (`start`/`finish`/`cancel`)
//!
//! # Architecture
//!
//! ```text
//! Screenshooter (fixed rate, 1s/fps)        Video merger (fixed delay, 1ms)
//!   take_screenshot()                          drain ≤ 50 frames
//!        │                                          ▲
//!        └──────▶ FrameQueue (lock-free FIFO) ──────┘
//!                                                   │
//!                                             VideoEncoder ──▶ <ts>_<ulid>.webm
//!                                                                   │
//!                                                  finish ──▶ AttachmentSink
//! ```
//!
//! In streaming mode the merger runs alongside capture; in batch mode it
//! only starts at `finish`.

pub mod attachment;
pub mod capture;
pub mod encoder;
pub mod frame;
pub mod frame_queue;
pub mod merge;
pub mod recorder;
pub mod scheduler;

// Re-export commonly used types
pub use attachment::{AttachmentSink, DirectoryAttachmentSink, NoopAttachmentSink};
pub use capture::{CaptureTask, ScreenshotSource};
pub use encoder::{EncoderFactory, EncoderSettings, FfmpegEncoderFactory, VideoEncoder};
pub use frame::Frame;
pub use frame_queue::{FrameQueue, QueueStats};
pub use merge::MergeTask;
pub use recorder::{FinishReport, RecorderState, VideoRecorder};
pub use scheduler::{InterruptHandle, PeriodicScheduler, PeriodicTask, SchedulePolicy, Termination};
