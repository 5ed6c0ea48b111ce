// src/recording/frame.rs
//! Captured frame
//!
//! A frame is one encoded screenshot (PNG/JPEG bytes as returned by the
//! driver) tagged with its capture sequence number, the capture tick that
//! produced it and its capture instant.
//! Once pushed to the [`FrameQueue`](super::FrameQueue) it belongs to the
//! merge side.

use bytes::Bytes;
use std::time::Instant;

/// One captured screenshot
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing sequence number, starting at 0
    pub sequence: u64,

    /// Index of the fixed-rate capture tick that produced the frame. Failed
    /// screenshots consume a tick, so slots may skip values where sequence
    /// numbers do not.
    pub slot: u64,

    /// When the screenshot was taken
    pub captured_at: Instant,

    /// Opaque image payload
    pub image: Bytes,
}

impl Frame {
    /// Create a frame whose capture tick equals its sequence number
    pub fn new(sequence: u64, captured_at: Instant, image: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            slot: sequence,
            captured_at,
            image: image.into(),
        }
    }

    pub fn with_slot(mut self, slot: u64) -> Self {
        self.slot = slot;
        self
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_payload() {
        let frame = Frame::new(7, Instant::now(), vec![1u8, 2, 3]);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.slot, 7);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_with_slot() {
        let frame = Frame::new(3, Instant::now(), Bytes::new()).with_slot(5);
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.slot, 5);
    }
}
