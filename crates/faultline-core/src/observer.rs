//! The front door
//!
//! Callers report failures through an [`Observer`]. A report:
//! 1. drops absent causes
//! 2. appends the event to the history collector
//! 3. forwards the message to the logger
//! 4. optionally asks the advisor for a verdict, dispatching remediation on a
//!    bad one
//!
//! The observer is an ordinary value; construct one and share it (for
//! example behind an `Arc`). There is no process-wide instance.

use crate::advisor::{Advisor, Degradation, DiagnosticSample, MajorityAdvisor};
use crate::collector::{HistoryCollector, Snapshot};
use crate::config::FaultlineConfig;
use crate::event::{BoxedCause, ErrorEvent, Severity};
use crate::guard::Guard;
use crate::logging::Logger;
use crate::remediation::{Dispatcher, Intent, RemediationPolicy};
use crate::scope::ScopeManager;
use futures::stream::BoxStream;
use std::fmt::Display;
use std::sync::Arc;

/// Error observation front door
#[derive(Debug)]
pub struct Observer {
    advise_on_report: bool,
    collector: Arc<HistoryCollector>,
    advisor: Arc<dyn Advisor>,
    logger: Logger,
    scopes: Arc<ScopeManager>,
    dispatcher: Dispatcher,
    policy: RemediationPolicy,
}

impl Observer {
    /// Build from configuration, logging through `tracing`
    ///
    /// The default `Recover` action cancels every open scope.
    #[must_use]
    pub fn from_config(config: &FaultlineConfig) -> Self {
        let scopes = Arc::new(ScopeManager::new(config.scopes));
        let dispatcher = Dispatcher::new().with_recovery({
            let scopes = Arc::clone(&scopes);
            move || {
                let cancelled = scopes.cancel_all();
                tracing::info!(cancelled, "recovery cancelled open scopes");
            }
        });

        Self {
            advise_on_report: config.advisor.advise_on_report,
            collector: Arc::new(HistoryCollector::new(config.history.capacity)),
            advisor: Arc::new(MajorityAdvisor::new().with_sampler(config.advisor.sampler())),
            logger: Logger::tracing(),
            scopes,
            dispatcher,
            policy: config.remediation.policy(),
        }
    }

    /// With a custom advisor
    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = advisor;
        self
    }

    /// With a custom logger
    #[must_use]
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// With a custom dispatcher, replacing the default recovery action too
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// With a custom severity to intent policy
    #[must_use]
    pub fn with_policy(mut self, policy: RemediationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record and log one failure
    ///
    /// `None` records nothing and returns `false`. Otherwise returns whether
    /// the logger flagged the message as a problem.
    pub fn report<E>(&self, severity: Severity, cause: Option<E>) -> bool
    where
        E: Into<BoxedCause>,
    {
        let Some(cause) = cause else {
            return false;
        };

        let event = ErrorEvent::new(cause, severity);
        let message = event.message();
        self.collector.add(event.clone());
        let problem = self.logger.send(severity, &[&message]);

        if self.advise_on_report {
            self.advise(Some(&event));
        }

        problem
    }

    /// Record and log a batch of failures at one severity
    ///
    /// Returns whether any of them was flagged as a problem.
    pub fn handle<I, E>(&self, severity: Severity, causes: I) -> bool
    where
        I: IntoIterator<Item = E>,
        E: Into<BoxedCause>,
    {
        causes
            .into_iter()
            .fold(false, |problem, cause| self.report(severity, Some(cause)) || problem)
    }

    /// Log without recording history
    pub fn log(&self, severity: Severity, values: &[&dyn Display]) -> bool {
        self.logger.send(severity, values)
    }

    /// Static verdict over the current history; `true` means OK
    #[must_use]
    pub fn ok(&self) -> bool {
        let snapshot = self.collector.snapshot();
        self.advisor.assess_static(&snapshot)
    }

    /// Ask for a verdict and remediate if it is bad
    ///
    /// The intent comes from the most severe live event, newest first on ties.
    /// Returns the verdict.
    pub fn check(&self) -> bool {
        let snapshot = self.collector.snapshot();
        let worst = most_severe(&snapshot);
        self.advise_with(&snapshot, worst)
    }

    /// Streaming verdict over caller-fed diagnostic samples
    pub async fn degradation(&self, samples: BoxStream<'static, DiagnosticSample>) -> Degradation {
        self.advisor.assess_dynamic(samples).await
    }

    /// Run the policy's action for `severity`, returning the intent used
    pub fn remediate(&self, severity: Severity) -> Intent {
        let intent = self.policy.intent_for(severity);
        self.dispatcher.dispatch(intent, None);
        intent
    }

    /// Run `work`, recording a `Panic` event instead of unwinding if it panics
    pub fn guard<T, F>(&self, work: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let collector = Arc::clone(&self.collector);
        let logger = self.logger.clone();
        Guard::with_handler(move |message| {
            collector.add(ErrorEvent::from_message(message, Severity::Panic));
            logger.send(Severity::Panic, &[&message]);
        })
        .rescue(work)
    }

    /// History collector
    #[inline]
    #[must_use]
    pub fn collector(&self) -> &Arc<HistoryCollector> {
        &self.collector
    }

    /// Scope manager
    #[inline]
    #[must_use]
    pub fn scopes(&self) -> &Arc<ScopeManager> {
        &self.scopes
    }

    /// Remediation dispatcher
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Severity to intent policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> RemediationPolicy {
        self.policy
    }

    fn advise(&self, trigger: Option<&ErrorEvent>) -> bool {
        let snapshot = self.collector.snapshot();
        self.advise_with(&snapshot, trigger)
    }

    fn advise_with(&self, snapshot: &Snapshot, trigger: Option<&ErrorEvent>) -> bool {
        let ok = self.advisor.assess_static(snapshot);
        if !ok {
            if let Some(event) = trigger {
                let intent = self.policy.intent_for(event.severity());
                tracing::warn!(
                    events = snapshot.len(),
                    severe = snapshot.severe_count(),
                    %intent,
                    "health verdict is not OK"
                );
                self.dispatcher.dispatch(intent, Some(event));
            }
        }
        ok
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::from_config(&FaultlineConfig::default())
    }
}

fn most_severe(snapshot: &Snapshot) -> Option<&ErrorEvent> {
    snapshot
        .iter()
        .rev()
        .reduce(|worst, e| if e.severity() > worst.severity() { e } else { worst })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogChannel;
    use crate::scope::ScopeFlags;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Capture {
        lines: Mutex<Vec<(Severity, String)>>,
    }

    impl LogChannel for Capture {
        fn emit(&self, severity: Severity, message: &str) -> bool {
            self.lines.lock().push((severity, message.to_string()));
            severity.is_problem()
        }
    }

    fn observer_with_capture(config: &FaultlineConfig) -> (Observer, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let observer =
            Observer::from_config(config).with_logger(Logger::new().with_channel(capture.clone()));
        (observer, capture)
    }

    #[test]
    fn report_records_and_logs() {
        let (observer, capture) = observer_with_capture(&FaultlineConfig::default());

        assert!(observer.report(Severity::Error, Some("disk full")));
        assert!(!observer.report(Severity::Info, Some("retrying")));
        assert!(!observer.report(Severity::Fatal, None::<&str>));

        assert_eq!(observer.collector().messages(), vec!["disk full", "retrying"]);
        assert_eq!(capture.lines.lock().len(), 2);
    }

    #[test]
    fn handle_reports_each_cause() {
        let (observer, _) = observer_with_capture(&FaultlineConfig::default());
        assert!(observer.handle(Severity::Critical, ["a", "b", "c"]));
        assert_eq!(observer.collector().len(), 3);
    }

    #[test]
    fn log_leaves_history_alone() {
        let (observer, capture) = observer_with_capture(&FaultlineConfig::default());
        assert!(!observer.log(Severity::Info, &[&"hello", &42]));
        assert!(observer.collector().is_empty());
        assert_eq!(capture.lines.lock()[0].1, "hello 42");
    }

    #[test]
    fn ok_follows_majority() {
        let (observer, _) = observer_with_capture(&FaultlineConfig::default());
        assert!(!observer.ok());

        observer.report(Severity::Warning, Some("w1"));
        assert!(observer.ok());

        observer.report(Severity::Critical, Some("c1"));
        assert!(!observer.ok());
    }

    #[test]
    fn bad_verdict_on_report_dispatches_policy_intent() {
        let config = FaultlineConfig::default().with_advise_on_report(true);
        let recovered = Arc::new(AtomicUsize::new(0));
        let (observer, _) = observer_with_capture(&config);
        let observer = observer.with_dispatcher(Dispatcher::new().with_recovery({
            let recovered = Arc::clone(&recovered);
            move || {
                recovered.fetch_add(1, Ordering::SeqCst);
            }
        }));

        observer.report(Severity::Info, Some("fine"));
        observer.report(Severity::Info, Some("fine"));
        assert_eq!(recovered.load(Ordering::SeqCst), 0);

        // 2 vs 1 is still OK; 2 vs 2 is a tie and triggers recovery.
        observer.report(Severity::Critical, Some("db down"));
        assert_eq!(recovered.load(Ordering::SeqCst), 0);
        observer.report(Severity::Critical, Some("db down again"));
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_recovery_cancels_scopes() {
        let (observer, _) = observer_with_capture(&FaultlineConfig::default());
        let id = observer.scopes().set(ScopeFlags::default().cancellable());
        let scope = observer.scopes().get(id).unwrap();

        observer.report(Severity::Critical, Some("cache corrupted"));
        assert!(!observer.check());

        assert!(scope.context().is_cancelled());
        assert!(observer.scopes().is_empty());
    }

    #[test]
    fn remediate_uses_policy() {
        let (observer, _) = observer_with_capture(&FaultlineConfig::default());
        let observer = observer.with_policy(RemediationPolicy::observe_only());
        assert_eq!(observer.remediate(Severity::Panic), Intent::NoOp);
    }

    #[test]
    fn guard_records_panic() {
        let (observer, capture) = observer_with_capture(&FaultlineConfig::default());
        let value: Option<u32> = observer.guard(|| panic!("worker crashed"));
        assert!(value.is_none());

        let snapshot = observer.collector().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.events()[0].severity(), Severity::Panic);
        assert_eq!(capture.lines.lock()[0], (Severity::Panic, "worker crashed".to_string()));
    }

    #[test]
    fn most_severe_prefers_newest_on_tie() {
        let snapshot = Snapshot::from_events(vec![
            ErrorEvent::from_message("old", Severity::Fatal),
            ErrorEvent::from_message("mid", Severity::Info),
            ErrorEvent::from_message("new", Severity::Fatal),
        ]);
        assert_eq!(most_severe(&snapshot).unwrap().message(), "new");
    }
}
