//! A single channel's sample history.

use super::Sample;
use std::collections::VecDeque;

/// Newest-first sample sequence for one channel.
///
/// Ingress pushes to the front, egress pops from the back, so [`drain_oldest`]
/// returns samples in the order they were ingressed. There is no capacity bound;
/// the buffer grows until drained.
///
/// [`drain_oldest`]: ChannelBuffer::drain_oldest
#[derive(Debug, Default, Clone)]
pub struct ChannelBuffer {
    samples: VecDeque<Sample>,
}

impl ChannelBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample as the newest entry.
    pub fn push_newest(&mut self, sample: Sample) {
        self.samples.push_front(sample);
    }

    /// Remove and return up to `count` of the oldest samples, oldest first.
    pub fn drain_oldest(&mut self, count: u64) -> Vec<Sample> {
        let take = usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(self.samples.len());

        let mut drained = Vec::with_capacity(take);
        for _ in 0..take {
            match self.samples.pop_back() {
                Some(sample) => drained.push(sample),
                None => break,
            }
        }
        drained
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Newest retained sample, if any.
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Oldest retained sample, if any.
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.back()
    }
}
