// src/recording/encoder.rs
//! Video encoder backends
//!
//! The merge task talks to an encoder through [`VideoEncoder`], created by an
//! [`EncoderFactory`] once the first frame arrives. The default backend pipes
//! screenshots into FFmpeg (`image2pipe`) and produces a VP9 WebM file.

use crate::recording::frame::Frame;
use crate::utils::errors::{RecorderError, Result};
use ffmpeg_sidecar::command::FfmpegCommand;
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

/// Per-recording encoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Output frame rate
    pub frame_rate: u32,

    /// Constant rate factor
    pub quality: u32,
}

/// An open video stream being written to disk
pub trait VideoEncoder: Send {
    /// Append one frame to the video
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the video so it is playable
    fn finish(self: Box<Self>) -> Result<()>;

    /// Stop encoding without producing a valid file
    fn abort(self: Box<Self>) {}
}

/// Opens encoders for new artifacts
pub trait EncoderFactory: Send + Sync + 'static {
    /// File extension of produced artifacts, without the dot
    fn extension(&self) -> &str;

    /// Start a new video at `output`
    fn open(&self, output: &Path, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>>;
}

/// FFmpeg-backed encoder factory
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoderFactory {
    /// Explicit FFmpeg binary; defaults to the one next to the executable or on PATH
    ffmpeg_path: Option<PathBuf>,
}

impl FfmpegEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ffmpeg_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: Some(path.into()),
        }
    }

    fn command(&self) -> FfmpegCommand {
        match &self.ffmpeg_path {
            Some(path) => FfmpegCommand::new_with_path(path),
            None => FfmpegCommand::new(),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn extension(&self) -> &str {
        "webm"
    }

    fn open(&self, output: &Path, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        let mut command = self.command();
        command
            .args(["-hide_banner", "-loglevel", "error"])
            // Input: encoded screenshots from stdin
            .args(["-f", "image2pipe"])
            .args(["-framerate", &settings.frame_rate.to_string()])
            .args(["-i", "-"])
            // Output: VP9 in constant quality mode
            .args(["-c:v", "libvpx-vp9"])
            .args(["-crf", &settings.quality.to_string()])
            .args(["-b:v", "0"])
            .args(["-deadline", "realtime", "-cpu-used", "8"])
            .args(["-pix_fmt", "yuv420p"])
            .arg("-y")
            .arg(output.to_string_lossy().to_string());

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::piped());
        inner.stdout(Stdio::null());
        inner.stderr(Stdio::piped());

        let mut child = inner
            .spawn()
            .map_err(|e| RecorderError::EncodingFailed(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecorderError::EncodingFailed("Failed to get FFmpeg stdin".to_string()))?;

        let last_error = Arc::new(Mutex::new(None));
        let stderr_reader = child.stderr.take().map(|stderr| {
            let last_error = Arc::clone(&last_error);
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                    trace!("[FFmpeg] {}", line);
                    *last_error.lock() = Some(line);
                }
            })
        });

        debug!("FFmpeg encoding {:?} at {} fps, crf {}", output, settings.frame_rate, settings.quality);

        Ok(Box::new(FfmpegEncoder {
            child,
            stdin: Some(stdin),
            stderr_reader,
            last_error,
        }))
    }
}

/// Running FFmpeg process fed through stdin
struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_reader: Option<JoinHandle<()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl VideoEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::EncodingFailed("FFmpeg stdin closed".to_string()))?;

        stdin.write_all(&frame.image).map_err(|e| {
            RecorderError::EncodingFailed(format!("Failed to write frame #{}: {}", frame.sequence, e))
        })
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // Closing stdin signals end of input
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .map_err(|e| RecorderError::EncodingFailed(format!("FFmpeg process error: {}", e)))?;

        if let Some(reader) = self.stderr_reader.take() {
            let _ = reader.join();
        }

        if !status.success() {
            let detail = self
                .last_error
                .lock()
                .take()
                .unwrap_or_else(|| format!("exit code {:?}", status.code()));
            return Err(RecorderError::EncodingFailed(format!("FFmpeg failed: {}", detail)));
        }

        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill FFmpeg: {}", e);
        }
        let _ = self.child.wait();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Neither finish nor abort ran; make sure the process is reaped
        if let Some(stdin) = self.stdin.take() {
            drop(stdin);
            let _ = self.child.kill();
            let _ = self.child.wait();
            debug!("FFmpeg stopped by drop");
        }
    }
}
