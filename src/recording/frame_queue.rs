// src/recording/frame_queue.rs
//! Lock-free unbounded frame queue
//!
//! The only structure shared between the capture worker and the merge
//! worker. Frames are dequeued in exactly the order they were enqueued.
//!
//! There is no capacity bound and pushing never blocks: if the merge side
//! stalls, memory grows with the number of pending frames.

use crate::recording::frame::Frame;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free FIFO of captured frames
#[derive(Debug, Default)]
pub struct FrameQueue {
    /// Underlying unbounded queue
    queue: SegQueue<Frame>,

    /// Push counter
    push_count: AtomicU64,

    /// Pop counter
    pop_count: AtomicU64,
}

impl FrameQueue {
    /// Create an empty frame queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame (non-blocking, lock-free)
    pub fn push(&self, frame: Frame) {
        self.queue.push(frame);
        self.push_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Try to pop the oldest frame (non-blocking)
    pub fn try_pop(&self) -> Option<Frame> {
        let frame = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Pop up to `max` frames in FIFO order
    pub fn drain_up_to(&self, max: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(max.min(self.len()));
        while frames.len() < max {
            match self.try_pop() {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        frames
    }

    /// Drop every pending frame, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut discarded = 0;
        while self.queue.pop().is_some() {
            discarded += 1;
        }
        discarded
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Total frames pushed
    pub push_count: u64,

    /// Total frames handed to the merge side
    pub pop_count: u64,

    /// Frames currently waiting
    pub current_size: usize,
}

impl QueueStats {
    /// Frames pushed but neither popped nor pending (discarded by `clear`)
    pub fn discarded(&self) -> u64 {
        self.push_count
            .saturating_sub(self.pop_count)
            .saturating_sub(self.current_size as u64)
    }
}
