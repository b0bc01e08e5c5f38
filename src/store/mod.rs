//! Per-channel in-memory sample store.
//!
//! Samples arrive one at a time per channel and are pushed to the front of that
//! channel's [`ChannelBuffer`]. Egress pops from the back, so callers always receive the
//! oldest retained samples first.
//!
//! - [`SignalStore`]: the mutex-serialized map of channel buffers plus drop accounting.
//! - [`StoreFacade`]: the trait callers program against; `SignalStore` implements it.
//! - [`ChannelTap`]: a facade handle pre-bound to one channel and one egress count.

pub mod channel_buffer;
pub mod facade;
pub mod signal_store;

pub use channel_buffer::ChannelBuffer;
pub use facade::{ChannelTap, IngressReport, StoreFacade};
pub use signal_store::{SignalStore, StoreStats};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque name of a signal channel, e.g. `"Signal_0"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a channel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The channel name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One (value, timestamp) observation of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Sample value
    pub value: u64,
    /// Producer-supplied timestamp
    pub timestamp: u64,
}

impl Sample {
    /// Create a sample.
    pub fn new(value: u64, timestamp: u64) -> Self {
        Self { value, timestamp }
    }
}

impl From<Sample> for (u64, u64) {
    fn from(sample: Sample) -> Self {
        (sample.value, sample.timestamp)
    }
}
