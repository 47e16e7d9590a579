use faultline_core::advisor::sample_stream;
use faultline_core::{Advisor, Degradation, DiagnosticSample, MajorityAdvisor, Severity};
use faultline_test_utils::snapshot_of;
use proptest::prelude::*;
use tokio::sync::mpsc;

#[test]
fn test_severe_majority_is_not_ok() {
    let advisor = MajorityAdvisor::new();
    let snapshot = snapshot_of(&[
        Severity::Critical,
        Severity::Critical,
        Severity::Critical,
        Severity::Info,
        Severity::Info,
    ]);
    assert!(!advisor.assess_static(&snapshot));
}

#[test]
fn test_non_severe_majority_is_ok() {
    let advisor = MajorityAdvisor::new();
    let snapshot = snapshot_of(&[
        Severity::Panic,
        Severity::Fatal,
        Severity::Error,
        Severity::Warning,
        Severity::Debug,
    ]);
    assert!(advisor.assess_static(&snapshot));
}

#[test]
fn test_empty_and_tie_are_not_ok() {
    let advisor = MajorityAdvisor::new();
    assert!(!advisor.assess_static(&snapshot_of(&[])));
    assert!(!advisor.assess_static(&snapshot_of(&[Severity::Fatal, Severity::Error])));
}

#[tokio::test]
async fn test_dynamic_default_is_ok_and_never_blocks_producer() {
    let advisor = MajorityAdvisor::new();
    let (tx, rx) = mpsc::channel(1);
    tx.send(DiagnosticSample::new("worker", "heap 80%")).await.unwrap();

    let verdict = advisor.assess_dynamic(sample_stream(rx)).await;
    assert_eq!(verdict, Degradation::Ok);
    assert!(tx.send(DiagnosticSample::capture("worker")).await.is_err());
}

proptest! {
    #[test]
    fn prop_verdict_is_strict_majority(severe in 0usize..12, mild in 0usize..12) {
        let severities: Vec<Severity> = std::iter::repeat(Severity::Critical)
            .take(severe)
            .chain(std::iter::repeat(Severity::Warning).take(mild))
            .collect();

        let ok = MajorityAdvisor::new().assess_static(&snapshot_of(&severities));
        prop_assert_eq!(ok, mild > severe);
    }
}
