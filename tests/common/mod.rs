// tests/common/mod.rs
//! Test doubles shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ui_video_recorder::{
    AttachmentSink, EncoderFactory, EncoderSettings, Frame, RecorderError, Result, VideoEncoder,
};

/// Screenshot source producing small fake PNG payloads
pub fn fake_screenshots() -> impl FnMut() -> Result<Bytes> + Send + 'static {
    let mut n: u64 = 0;
    move || {
        n += 1;
        Ok(Bytes::from(format!("\u{89}PNG screenshot {}", n).into_bytes()))
    }
}

/// Screenshot source that always fails
pub fn broken_screenshots() -> impl FnMut() -> Result<Bytes> + Send + 'static {
    || Err(RecorderError::CaptureFailed("no browser".to_string()))
}

/// Encoder backend writing raw frame bytes to the artifact file
#[derive(Default, Clone)]
pub struct FileEncoderFactory {
    /// Sequence numbers written, repeats included
    pub written: Arc<Mutex<Vec<u64>>>,

    /// Artificial per-frame encoding cost
    pub frame_cost: Duration,

    /// Encoders that were finished
    pub finished: Arc<AtomicU64>,
}

impl FileEncoderFactory {
    pub fn slow(frame_cost: Duration) -> Self {
        Self {
            frame_cost,
            ..Default::default()
        }
    }

    pub fn written(&self) -> Vec<u64> {
        self.written.lock().clone()
    }

    pub fn finished_count(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

struct FileEncoder {
    file: File,
    written: Arc<Mutex<Vec<u64>>>,
    frame_cost: Duration,
    finished: Arc<AtomicU64>,
}

impl VideoEncoder for FileEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if !self.frame_cost.is_zero() {
            std::thread::sleep(self.frame_cost);
        }
        self.file.write_all(&frame.image)?;
        self.written.lock().push(frame.sequence);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.file.sync_all()?;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl EncoderFactory for FileEncoderFactory {
    fn extension(&self) -> &str {
        "frames"
    }

    fn open(&self, output: &Path, _settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(FileEncoder {
            file: File::create(output)?,
            written: Arc::clone(&self.written),
            frame_cost: self.frame_cost,
            finished: Arc::clone(&self.finished),
        }))
    }
}

/// Sink remembering every attached file
#[derive(Default, Clone)]
pub struct RecordingSink {
    pub attached: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingSink {
    pub fn attached(&self) -> Vec<PathBuf> {
        self.attached.lock().clone()
    }
}

impl AttachmentSink for RecordingSink {
    fn attach(&self, file: &Path) -> Result<()> {
        self.attached.lock().push(file.to_path_buf());
        Ok(())
    }
}

/// Log output captured from a scoped tracing subscriber
#[derive(Default, Clone)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Plain-text subscriber writing every event into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || capture.clone())
            .finish()
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Files currently in `dir`
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
