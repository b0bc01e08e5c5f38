//! Implementation-agnostic store boundary.
//!
//! Callers that ingest decoded records or withdraw samples depend on [`StoreFacade`]
//! only, so the map and buffer types behind [`SignalStore`] can change freely.

use super::{ChannelId, Sample, SignalStore};
use crate::record::{RecordDecoder, StructuredRecord};
use std::sync::Arc;
use tracing::warn;

/// Outcome of one `ingress_records` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngressReport {
    /// Records decoded and stored
    pub accepted: usize,
    /// Records rejected as malformed (each counted as a drop)
    pub rejected: usize,
}

impl IngressReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: IngressReport) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

/// Ingress records in, egress samples out.
pub trait StoreFacade: Send + Sync {
    /// Decode and store each record in order. Malformed records are dropped and
    /// counted; the remaining records are still stored.
    fn ingress_records(&self, records: &[StructuredRecord]) -> IngressReport;

    /// Withdraw up to `count` of the oldest samples of channel `id`.
    fn egress_records(&self, id: &str, count: u64) -> Vec<(u64, u64)>;

    /// Count a rejection that happened before a record could be built.
    fn record_dropped(&self);
}

impl StoreFacade for SignalStore {
    fn ingress_records(&self, records: &[StructuredRecord]) -> IngressReport {
        let mut report = IngressReport::default();
        for record in records {
            match RecordDecoder::decode(record) {
                Ok((id, sample)) => {
                    self.ingress(id, sample);
                    report.accepted += 1;
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed record");
                    self.record_drop();
                    report.rejected += 1;
                }
            }
        }
        report
    }

    fn egress_records(&self, id: &str, count: u64) -> Vec<(u64, u64)> {
        self.egress(id, count).into_iter().map(Into::into).collect()
    }

    fn record_dropped(&self) {
        self.record_drop();
    }
}

/// Egress handle pre-bound to one channel and one count.
///
/// One tap is created per downstream consumer of a channel.
#[derive(Clone)]
pub struct ChannelTap {
    facade: Arc<dyn StoreFacade>,
    channel: ChannelId,
    count: u64,
}

impl ChannelTap {
    /// Bind `channel` and `count` on top of `facade`.
    pub fn new(facade: Arc<dyn StoreFacade>, channel: impl Into<ChannelId>, count: u64) -> Self {
        Self {
            facade,
            channel: channel.into(),
            count,
        }
    }

    /// The bound channel.
    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// The bound egress count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Withdraw up to the bound count of the oldest samples.
    pub fn egress_records(&self) -> Vec<(u64, u64)> {
        self.facade.egress_records(self.channel.as_str(), self.count)
    }

    /// Same as [`egress_records`](Self::egress_records), as typed samples.
    pub fn egress_samples(&self) -> Vec<Sample> {
        self.egress_records()
            .into_iter()
            .map(|(value, timestamp)| Sample::new(value, timestamp))
            .collect()
    }
}

impl std::fmt::Debug for ChannelTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTap")
            .field("channel", &self.channel)
            .field("count", &self.count)
            .finish()
    }
}
