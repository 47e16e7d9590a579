//! Health advisors
//!
//! An advisor turns history into a verdict. Two entry points exist:
//! - [`Advisor::assess_static`] is a cheap pass over a [`Snapshot`]
//! - [`Advisor::assess_dynamic`] consumes a caller-fed stream of diagnostic
//!   samples and reports a [`Degradation`] level
//!
//! Advisors never mutate the collector. Callers snapshot first, then classify.

use crate::collector::Snapshot;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use tokio::sync::mpsc;

/// Coarse degradation level, ordered `Ok < Degraded < Bad < Dead`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Degradation {
    /// Healthy
    Ok,
    /// Working with reduced quality
    Degraded,
    /// Failing in ways that need intervention
    Bad,
    /// Not functioning
    Dead,
}

/// One piece of diagnostic metadata fed to a dynamic advisor
#[derive(Debug, Clone)]
pub struct DiagnosticSample {
    /// Where the sample was taken
    pub source: String,
    /// Opaque payload, e.g. a rendered call stack
    pub payload: String,
    /// Capture time
    pub captured_at: DateTime<Utc>,
}

impl DiagnosticSample {
    /// Create a sample with an explicit payload
    #[must_use]
    pub fn new(source: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: payload.into(),
            captured_at: Utc::now(),
        }
    }

    /// Capture the current call stack as a sample
    #[must_use]
    pub fn capture(source: impl Into<String>) -> Self {
        Self::new(source, Backtrace::force_capture().to_string())
    }
}

/// Sampling parameters handed to advisors from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampler {
    /// Samples per cycle
    pub frequency: u32,
    /// Number of cycles considered
    pub cycles: usize,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            frequency: 1,
            cycles: 10,
        }
    }
}

/// Strategy that classifies program health from error history
///
/// Implementations must not raise: absent data yields the most cautious
/// answer. Dynamic implementations own their concurrency and must keep
/// draining (or drop) the stream so the producer is never blocked forever.
#[async_trait::async_trait]
pub trait Advisor: Send + Sync + std::fmt::Debug {
    /// Fast classification; `true` means OK
    fn assess_static(&self, snapshot: &Snapshot) -> bool;

    /// Streaming classification over diagnostic samples
    async fn assess_dynamic(&self, samples: BoxStream<'static, DiagnosticSample>) -> Degradation;
}

/// Default advisor: strict majority vote of non-severe over severe events
///
/// Ties, including the empty history, are not OK.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityAdvisor {
    sampler: Sampler,
}

impl MajorityAdvisor {
    /// Create with default sampling
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With sampling parameters
    #[inline]
    #[must_use]
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Sampling parameters this advisor was configured with
    #[inline]
    #[must_use]
    pub fn sampler(&self) -> Sampler {
        self.sampler
    }
}

#[async_trait::async_trait]
impl Advisor for MajorityAdvisor {
    fn assess_static(&self, snapshot: &Snapshot) -> bool {
        let severe = snapshot.severe_count();
        let non_severe = snapshot.len() - severe;
        non_severe > severe
    }

    async fn assess_dynamic(&self, samples: BoxStream<'static, DiagnosticSample>) -> Degradation {
        // Dropping the stream releases any producer waiting on it.
        drop(samples);
        Degradation::Ok
    }
}

/// Adapt a bounded channel into the stream taken by [`Advisor::assess_dynamic`]
///
/// The producer keeps the sender; its sends fail instead of blocking once the
/// advisor drops the stream.
pub fn sample_stream(rx: mpsc::Receiver<DiagnosticSample>) -> BoxStream<'static, DiagnosticSample> {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|sample| (sample, rx))
    }))
}
