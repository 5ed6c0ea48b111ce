// src/recording/attachment.rs
//! Attachment sinks
//!
//! After a successful `finish` the recorder hands the video file to an
//! [`AttachmentSink`] exactly once, typically the test report. A cancelled
//! recording never reaches the sink.

use crate::utils::errors::{RecorderError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Receives the finished video file
pub trait AttachmentSink: Send + Sync {
    fn attach(&self, file: &Path) -> Result<()>;
}

impl<F> AttachmentSink for F
where
    F: Fn(&Path) -> Result<()> + Send + Sync,
{
    fn attach(&self, file: &Path) -> Result<()> {
        self(file)
    }
}

/// Sink that ignores attachments
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAttachmentSink;

impl AttachmentSink for NoopAttachmentSink {
    fn attach(&self, _file: &Path) -> Result<()> {
        Ok(())
    }
}

/// Copies finished videos into a report directory
#[derive(Debug, Clone)]
pub struct DirectoryAttachmentSink {
    /// Report directory
    dir: PathBuf,
}

impl DirectoryAttachmentSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AttachmentSink for DirectoryAttachmentSink {
    fn attach(&self, file: &Path) -> Result<()> {
        let name = file.file_name().ok_or_else(|| {
            RecorderError::AttachmentFailed(format!("{:?} has no file name", file))
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| {
            RecorderError::AttachmentFailed(format!("Failed to create {:?}: {}", self.dir, e))
        })?;

        let target = self.dir.join(name);
        let bytes = fs::copy(file, &target).map_err(|e| {
            RecorderError::AttachmentFailed(format!("Failed to copy {:?}: {}", file, e))
        })?;

        info!("Attached video {:?} ({} bytes)", target, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_sink_copies_file() {
        let source_dir = tempdir().unwrap();
        let report_dir = tempdir().unwrap();
        let video = source_dir.path().join("run.webm");
        fs::write(&video, b"video bytes").unwrap();

        let sink = DirectoryAttachmentSink::new(report_dir.path().join("videos"));
        sink.attach(&video).unwrap();

        let copied = sink.dir().join("run.webm");
        assert_eq!(fs::read(copied).unwrap(), b"video bytes");
    }

    #[test]
    fn test_directory_sink_missing_file() {
        let dir = tempdir().unwrap();
        let sink = DirectoryAttachmentSink::new(dir.path());

        let result = sink.attach(&dir.path().join("missing.webm"));
        assert!(matches!(result, Err(RecorderError::AttachmentFailed(_))));
    }

    #[test]
    fn test_closure_sink() {
        let sink = |file: &Path| -> Result<()> {
            assert_eq!(file, Path::new("/tmp/video.webm"));
            Ok(())
        };
        assert!(sink.attach(Path::new("/tmp/video.webm")).is_ok());
        assert!(NoopAttachmentSink.attach(Path::new("/tmp/video.webm")).is_ok());
    }
}
