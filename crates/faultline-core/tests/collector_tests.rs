use faultline_core::{HistoryCollector, Severity};
use faultline_test_utils::event;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

fn severity() -> impl Strategy<Value = Severity> {
    prop::sample::select(Severity::ALL.to_vec())
}

#[test]
fn test_capacity_three_keeps_newest() {
    let collector = HistoryCollector::new(3);
    for (i, severity) in [Severity::Panic, Severity::Debug, Severity::Info, Severity::Warning]
        .into_iter()
        .enumerate()
    {
        collector.add(event(&format!("e{i}"), severity));
    }

    assert_eq!(collector.messages(), vec!["e1", "e2", "e3"]);
    assert_eq!(collector.snapshot().severe_count(), 0);
}

#[test]
fn test_drain_leaves_history() {
    let collector = HistoryCollector::new(4);
    collector.add(event("a", Severity::Error));
    collector.add(event("b", Severity::Fatal));

    let drained: Vec<String> = collector.drain().map(|e| e.message()).collect();
    assert_eq!(drained, vec!["a", "b"]);
    assert_eq!(collector.len(), 2);
    assert_eq!(collector.drain().len(), 2);
}

#[tokio::test]
async fn test_drain_as_stream() {
    let collector = HistoryCollector::new(2);
    collector.add(event("x", Severity::Info));
    collector.add(event("y", Severity::Info));
    collector.add(event("z", Severity::Info));

    let messages: Vec<String> = collector
        .drain()
        .into_stream()
        .map(|e| e.message())
        .collect()
        .await;
    assert_eq!(messages, vec!["y", "z"]);
}

#[test]
fn test_concurrent_writers_fill_to_capacity() {
    let collector = Arc::new(HistoryCollector::new(20));
    let handles: Vec<_> = (0..32)
        .map(|t| {
            let collector = Arc::clone(&collector);
            thread::spawn(move || {
                for i in 0..50 {
                    collector.add(event(&format!("t{t}-{i}"), Severity::Error));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.len(), 20);
    assert!(snapshot.iter().all(|e| e.severity() == Severity::Error));
}

proptest! {
    #[test]
    fn prop_history_is_newest_suffix(
        capacity in 1usize..16,
        severities in prop::collection::vec(severity(), 0..64),
    ) {
        let collector = HistoryCollector::new(capacity);
        let messages: Vec<String> = severities
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let message = format!("m{i}");
                collector.add(event(&message, *s));
                message
            })
            .collect();

        let keep = messages.len().min(capacity);
        let expected = messages[messages.len() - keep..].to_vec();
        prop_assert_eq!(collector.messages(), expected);
        prop_assert_eq!(collector.len(), keep);
    }

    #[test]
    fn prop_snapshot_severities_match_input(
        severities in prop::collection::vec(severity(), 1..20),
    ) {
        let collector = HistoryCollector::new(20);
        for (i, s) in severities.iter().enumerate() {
            collector.add(event(&format!("m{i}"), *s));
        }

        let seen: Vec<Severity> = collector.snapshot().iter().map(|e| e.severity()).collect();
        prop_assert_eq!(seen, severities);
    }
}
