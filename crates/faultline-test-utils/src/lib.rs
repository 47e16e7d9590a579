//! Testing utilities for the faultline workspace
//!
//! Shared test helpers, fixtures, and assertions.

#![allow(missing_docs)]

use faultline_core::{
    ErrorEvent, FaultlineConfig, LogChannel, Logger, Observer, ScopeConfig, Severity, Snapshot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Log channel that keeps every message it receives
#[derive(Debug, Default)]
pub struct RecordingChannel {
    lines: Mutex<Vec<(Severity, String)>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Severity, String)> {
        self.lines.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.lines.lock().iter().filter(|(s, _)| *s == severity).count()
    }
}

impl LogChannel for RecordingChannel {
    fn emit(&self, severity: Severity, message: &str) -> bool {
        self.lines.lock().push((severity, message.to_string()));
        severity.is_problem()
    }
}

pub fn event(message: &str, severity: Severity) -> ErrorEvent {
    ErrorEvent::from_message(message, severity)
}

pub fn events(severities: &[Severity]) -> Vec<ErrorEvent> {
    severities
        .iter()
        .enumerate()
        .map(|(i, s)| event(&format!("event {i}"), *s))
        .collect()
}

pub fn snapshot_of(severities: &[Severity]) -> Snapshot {
    Snapshot::from_events(events(severities))
}

/// Scope settings with a millisecond timeout and a deadline one second out
pub fn fast_scope_config(timeout_ms: u64) -> ScopeConfig {
    ScopeConfig {
        deadline_horizon_secs: 1,
        ..ScopeConfig::default()
    }
    .with_timeout(Duration::from_millis(timeout_ms))
}

/// Observer logging only to a fresh recording channel
pub fn recording_observer(config: &FaultlineConfig) -> (Observer, Arc<RecordingChannel>) {
    let channel = RecordingChannel::new();
    let observer =
        Observer::from_config(config).with_logger(Logger::new().with_channel(channel.clone()));
    (observer, channel)
}
