// src/utils/mod.rs
//! Common utilities shared by the recording pipeline
//!
//! - **config**: Immutable per-session recorder configuration and its loader
//! - **errors**: Crate-wide error type

pub mod config;
pub mod errors;

pub use config::{RecorderConfig, SaveMode};
pub use errors::{RecorderError, Result};
