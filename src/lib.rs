// src/lib.rs
//! UI Session Video Recorder Library
//!
//! Records a video of an automated UI test session from periodic
//! screenshots, as evidence attached to the test report.
//!
//! # Architecture
//!
//! The crate is structured into a few modules:
//!
//! - **recording**: Capture and merge workers, frame queue, recorder lifecycle
//! - **observability**: Tracing subscriber setup and metric names
//! - **utils**: Configuration and error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use ui_video_recorder::{DirectoryAttachmentSink, RecorderConfig, VideoRecorder};
//!
//! # fn main() -> ui_video_recorder::Result<()> {
//! let config = RecorderConfig::load(None)?;
//! let screenshot = || -> ui_video_recorder::Result<Bytes> {
//!     // Ask the browser driver for a PNG screenshot
//!     Ok(Bytes::new())
//! };
//! let sink = Arc::new(DirectoryAttachmentSink::new("build/reports/videos"));
//!
//! let mut recorder = VideoRecorder::new(config, screenshot, sink)?;
//! recorder.start()?;
//! // ... run the test ...
//! let report = recorder.finish()?;
//! println!("{} frames -> {}", report.frames_captured, recorder.video_url());
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod observability;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use recording::attachment::{AttachmentSink, DirectoryAttachmentSink, NoopAttachmentSink};
pub use recording::capture::ScreenshotSource;
pub use recording::encoder::{EncoderFactory, EncoderSettings, FfmpegEncoderFactory, VideoEncoder};
pub use recording::frame::Frame;
pub use recording::recorder::{FinishReport, RecorderState, VideoRecorder};
pub use recording::scheduler::InterruptHandle;
pub use utils::config::{RecorderConfig, SaveMode};
pub use utils::errors::{RecorderError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
