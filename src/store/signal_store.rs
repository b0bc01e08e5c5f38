//! Mutex-serialized channel map with drop accounting.

use super::{ChannelBuffer, ChannelId, Sample};
use crate::error::StoreError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{trace, warn};

/// Point-in-time view of the store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Channels currently present in the map (drained channels included)
    pub channel_count: usize,
    /// Ingress/egress operations rejected for unknown channels or malformed records
    pub records_dropped: u64,
    /// Samples retained across all channels
    pub samples_buffered: usize,
}

/// In-memory time-series store keyed by channel.
///
/// Every ingress and egress takes the single map lock, so each call is one atomic unit
/// of work. `records_dropped` lives outside the lock and only ever increases.
#[derive(Debug, Default)]
pub struct SignalStore {
    channels: Mutex<HashMap<ChannelId, ChannelBuffer>>,
    records_dropped: AtomicU64,
}

impl SignalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `sample` as the newest entry of `id`'s buffer, creating the buffer on first use.
    pub fn ingress(&self, id: impl Into<ChannelId>, sample: Sample) {
        let id = id.into();
        trace!(channel = %id, value = sample.value, timestamp = sample.timestamp, "ingress");
        self.channels.lock().entry(id).or_default().push_newest(sample);
    }

    /// Remove and return up to `requested` of the oldest samples of `id`.
    ///
    /// Unknown channels yield an empty result and count one drop.
    pub fn egress(&self, id: &str, requested: u64) -> Vec<Sample> {
        self.try_egress(id, requested).unwrap_or_default()
    }

    /// Like [`egress`](Self::egress), but reports an unknown channel as an error.
    ///
    /// The drop is counted and logged before the error is returned.
    pub fn try_egress(&self, id: &str, requested: u64) -> Result<Vec<Sample>, StoreError> {
        let drained = {
            let mut channels = self.channels.lock();
            channels
                .get_mut(id)
                .map(|buffer| buffer.drain_oldest(requested))
        };

        match drained {
            Some(samples) => {
                trace!(channel = id, requested, returned = samples.len(), "egress");
                Ok(samples)
            }
            None => {
                warn!(channel = id, "requested channel does not exist in store");
                self.record_drop();
                Err(StoreError::UnknownChannel(id.to_string()))
            }
        }
    }

    /// Count one rejected operation.
    pub fn record_drop(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Total rejected operations so far.
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    /// Number of channels present in the map.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Known channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Retained sample count for `id`, `None` if the channel was never ingressed.
    pub fn buffered(&self, id: &str) -> Option<usize> {
        self.channels.lock().get(id).map(ChannelBuffer::len)
    }

    /// Snapshot of the store counters.
    pub fn stats(&self) -> StoreStats {
        let channels = self.channels.lock();
        StoreStats {
            channel_count: channels.len(),
            records_dropped: self.records_dropped(),
            samples_buffered: channels.values().map(ChannelBuffer::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_creates_channel_lazily() {
        let store = SignalStore::new();
        assert_eq!(store.channel_count(), 0);
        assert_eq!(store.buffered("Signal_0"), None);

        store.ingress("Signal_0", Sample::new(1, 1));
        assert_eq!(store.channel_count(), 1);
        assert_eq!(store.buffered("Signal_0"), Some(1));
    }

    #[test]
    fn out_of_order_timestamps_are_kept_as_is() {
        let store = SignalStore::new();
        store.ingress("c", Sample::new(1, 50));
        store.ingress("c", Sample::new(2, 10));
        store.ingress("c", Sample::new(2, 10));

        let out = store.egress("c", 3);
        assert_eq!(
            out,
            vec![Sample::new(1, 50), Sample::new(2, 10), Sample::new(2, 10)]
        );
    }

    #[test]
    fn drained_channel_remains_present() {
        let store = SignalStore::new();
        store.ingress("c", Sample::new(7, 1));
        assert_eq!(store.egress("c", 10).len(), 1);

        assert_eq!(store.buffered("c"), Some(0));
        assert_eq!(store.channel_count(), 1);
        assert!(store.egress("c", 1).is_empty());
        assert_eq!(store.records_dropped(), 0);
    }

    #[test]
    fn try_egress_reports_unknown_channel() {
        let store = SignalStore::new();
        let err = store.try_egress("missing", 4).unwrap_err();
        assert_eq!(err, StoreError::UnknownChannel("missing".to_string()));
        assert_eq!(store.records_dropped(), 1);
    }

    #[test]
    fn stats_track_channels_and_samples() {
        let store = SignalStore::new();
        store.ingress("a", Sample::new(1, 1));
        store.ingress("a", Sample::new(2, 2));
        store.ingress("b", Sample::new(3, 3));
        store.egress("zzz", 1);

        let stats = store.stats();
        assert_eq!(stats.channel_count, 2);
        assert_eq!(stats.samples_buffered, 3);
        assert_eq!(stats.records_dropped, 1);
        assert_eq!(
            store.channel_ids(),
            vec![ChannelId::from("a"), ChannelId::from("b")]
        );
    }
}
