//! Ingress/egress policy of the signal store, exercised through its public API.

use serde_json::json;
use signal_scope::error::RecordError;
use signal_scope::record::{RecordDecoder, StructuredRecord};
use signal_scope::store::{ChannelTap, Sample, SignalStore, StoreFacade};
use std::sync::Arc;
use std::thread;
use tracing_test::traced_test;

fn record(value: serde_json::Value) -> StructuredRecord {
    StructuredRecord::from_value(value).expect("test records are objects")
}

#[test]
fn test_oldest_ingressed_sample_egresses_first() {
    let store = SignalStore::new();
    let s1 = Sample::new(1, 100);
    let s2 = Sample::new(2, 200);
    let s3 = Sample::new(3, 300);
    store.ingress("c", s1);
    store.ingress("c", s2);
    store.ingress("c", s3);

    assert_eq!(store.egress("c", 3), vec![s1, s2, s3]);
}

#[test]
fn test_egress_is_clamped_to_available() {
    for available in 0..6u64 {
        for requested in [0u64, 1, 3, 5, 8, u64::MAX] {
            let store = SignalStore::new();
            store.ingress("c", Sample::new(0, 0));
            let _ = store.egress("c", 1);
            for i in 0..available {
                store.ingress("c", Sample::new(i, i));
            }

            let out = store.egress("c", requested);
            let expected = available.min(requested) as usize;
            assert_eq!(out.len(), expected, "available={available} requested={requested}");
            assert_eq!(
                store.buffered("c"),
                Some(available as usize - expected),
                "available={available} requested={requested}"
            );
        }
    }
}

#[test]
#[traced_test]
fn test_unknown_channel_counts_exactly_one_drop() {
    let store = SignalStore::new();
    store.ingress("Signal_0", Sample::new(1, 1));

    for (n, requested) in [0u64, 1, 50].into_iter().enumerate() {
        assert!(store.egress("nonexistent", requested).is_empty());
        assert_eq!(store.records_dropped(), n as u64 + 1);
    }
    assert!(logs_contain("nonexistent"));
    assert_eq!(store.buffered("Signal_0"), Some(1));
}

#[test]
fn test_record_without_time_is_rejected_without_mutation() {
    let store = SignalStore::new();
    store.ingress("Signal_0", Sample::new(4, 4));

    let bad = record(json!({"Signal_0": "7"}));
    assert_eq!(RecordDecoder::decode(&bad), Err(RecordError::MissingTime));

    let report = store.ingress_records(&[bad]);
    assert_eq!(report.accepted, 0);
    assert_eq!(report.rejected, 1);
    assert_eq!(store.buffered("Signal_0"), Some(1));
    assert_eq!(store.channel_count(), 1);
    assert_eq!(store.records_dropped(), 1);
}

#[test]
fn test_record_round_trip() {
    let store = SignalStore::new();
    store.ingress_records(&[record(json!({"Time": "12", "Signal_0": "7"}))]);

    assert_eq!(store.egress("Signal_0", 1), vec![Sample::new(7, 12)]);
}

#[test]
fn test_zero_count_egress_never_mutates() {
    let store = SignalStore::new();
    store.ingress("c", Sample::new(1, 1));
    store.ingress("c", Sample::new(2, 2));

    assert!(store.egress("c", 0).is_empty());
    assert_eq!(store.buffered("c"), Some(2));
    assert_eq!(store.records_dropped(), 0);

    assert!(store.egress("missing", 0).is_empty());
    assert_eq!(store.buffered("missing"), None);
    assert_eq!(store.buffered("c"), Some(2));
}

#[test]
fn test_interleaved_channels_do_not_leak() {
    let store = SignalStore::new();
    store.ingress_records(&[
        record(json!({"Time": "1", "Signal_0": "10"})),
        record(json!({"Time": "2", "Signal_1": "20"})),
        record(json!({"Time": "3", "Signal_0": "30"})),
    ]);

    let zero = store.egress_records("Signal_0", 10);
    let one = store.egress_records("Signal_1", 10);

    assert_eq!(zero, vec![(10, 1), (30, 3)]);
    assert_eq!(one, vec![(20, 2)]);
    assert_eq!(store.records_dropped(), 0);
}

#[test]
fn test_concurrent_ingress_and_egress_lose_nothing() {
    let store = Arc::new(SignalStore::new());
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let store = store.clone();
            thread::spawn(move || {
                for t in 0..500u64 {
                    store.ingress(format!("Signal_{p}"), Sample::new(t, t));
                }
            })
        })
        .collect();

    let consumer = {
        let store = store.clone();
        thread::spawn(move || {
            let tap = ChannelTap::new(store, "Signal_0", 7);
            let mut seen = Vec::new();
            while seen.len() < 500 {
                seen.extend(tap.egress_samples());
                thread::yield_now();
            }
            seen
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let seen = consumer.join().unwrap();

    let timestamps: Vec<u64> = seen.iter().map(|s| s.timestamp).collect();
    assert_eq!(timestamps, (0..500).collect::<Vec<_>>());
    assert_eq!(store.stats().samples_buffered, 1500);
}
