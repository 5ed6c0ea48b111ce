// src/utils/config.rs
//! Recorder configuration
//!
//! A `RecorderConfig` is an immutable value handed to the recorder at
//! construction. Hosts may build it directly or load it with
//! [`RecorderConfig::load`], which layers defaults, an optional file and
//! `VIDEO_RECORDER_*` environment variables.

use crate::utils::errors::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "VIDEO_RECORDER";

/// Highest CRF value accepted by the VP8/VP9 encoders
pub const MAX_QUALITY: u32 = 63;

/// When merging happens relative to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Merge continuously while capturing
    Streaming,

    /// Defer all merging until `finish`
    Batch,
}

impl SaveMode {
    /// Whether the merge worker runs during capture
    pub fn merges_on_the_fly(&self) -> bool {
        matches!(self, SaveMode::Streaming)
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Frames per second
    pub frame_rate: u32,

    /// Directory the video artifact is written to
    pub output_dir: PathBuf,

    /// Encoder constant rate factor (lower is better quality)
    pub quality: u32,

    /// Streaming or batch merging
    pub save_mode: SaveMode,

    /// How long `finish` waits for the merge worker (milliseconds)
    pub merge_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            frame_rate: 10,
            output_dir: PathBuf::from("build/videos"),
            quality: 23,
            save_mode: SaveMode::Streaming,
            merge_timeout_ms: 30_000,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("frame_rate", i64::from(defaults.frame_rate))?
            .set_default("output_dir", defaults.output_dir.to_string_lossy().to_string())?
            .set_default("quality", i64::from(defaults.quality))?
            .set_default("save_mode", "streaming")?
            .set_default("merge_timeout_ms", defaults.merge_timeout_ms as i64)?;

        if let Some(path) = path {
            debug!("Loading recorder configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(RecorderError::InvalidConfig(
                "frame rate must be positive".to_string(),
            ));
        }

        if self.quality > MAX_QUALITY {
            return Err(RecorderError::InvalidConfig(format!(
                "quality {} exceeds maximum {}",
                self.quality, MAX_QUALITY
            )));
        }

        if self.merge_timeout_ms == 0 {
            return Err(RecorderError::InvalidConfig(
                "merge timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Time between two captured frames
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frame_rate.max(1)))
    }

    /// Merge worker shutdown timeout
    pub fn merge_timeout(&self) -> Duration {
        Duration::from_millis(self.merge_timeout_ms)
    }

    pub fn with_save_mode(mut self, save_mode: SaveMode) -> Self {
        self.save_mode = save_mode;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }
}
