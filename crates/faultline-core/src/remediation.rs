//! Remediation dispatch
//!
//! A closed set of [`Intent`]s maps to concrete actions through a lookup
//! table. [`RemediationPolicy`] picks the intent for a severity; the
//! [`Dispatcher`] runs the action registered for that intent.

use crate::event::{ErrorEvent, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What to do about a bad verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Do nothing
    NoOp,
    /// Terminate the process
    Kill,
    /// Unwind in-flight work through the recovery callback
    Recover,
    /// Reserved; does nothing by default
    Retry,
    /// Reserved; does nothing by default
    Return,
}

impl Intent {
    /// All intents
    pub const ALL: [Intent; 5] = [
        Intent::NoOp,
        Intent::Kill,
        Intent::Recover,
        Intent::Retry,
        Intent::Return,
    ];

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::NoOp => "noop",
            Intent::Kill => "kill",
            Intent::Recover => "recover",
            Intent::Retry => "retry",
            Intent::Return => "return",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown intent name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown remediation intent: {0}")]
pub struct ParseIntentError(pub String);

impl FromStr for Intent {
    type Err = ParseIntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noop" | "no-op" | "none" => Ok(Intent::NoOp),
            "kill" | "exit" => Ok(Intent::Kill),
            "recover" => Ok(Intent::Recover),
            "retry" => Ok(Intent::Retry),
            "return" => Ok(Intent::Return),
            other => Err(ParseIntentError(other.to_string())),
        }
    }
}

/// Table from severity to intent
///
/// Default: Panic and Fatal kill, Critical recovers, everything else is
/// observation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemediationPolicy {
    table: [Intent; 7],
}

impl RemediationPolicy {
    /// Policy that never acts
    #[must_use]
    pub fn observe_only() -> Self {
        Self {
            table: [Intent::NoOp; 7],
        }
    }

    /// Intent for a severity
    #[inline]
    #[must_use]
    pub fn intent_for(&self, severity: Severity) -> Intent {
        self.table[severity.index()]
    }

    /// With one entry replaced
    #[inline]
    #[must_use]
    pub fn with(mut self, severity: Severity, intent: Intent) -> Self {
        self.table[severity.index()] = intent;
        self
    }
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self::observe_only()
            .with(Severity::Critical, Intent::Recover)
            .with(Severity::Fatal, Intent::Kill)
            .with(Severity::Panic, Intent::Kill)
    }
}

/// Action run for an intent; receives the triggering event when there is one
pub type Action = Arc<dyn Fn(Option<&ErrorEvent>) + Send + Sync>;

/// Lookup table from intent to action
#[derive(Clone)]
pub struct Dispatcher {
    actions: HashMap<Intent, Action>,
}

impl Dispatcher {
    /// Dispatcher with the built-in actions
    ///
    /// `Kill` exits the process with status 1; every other intent does nothing
    /// until an action is registered for it.
    #[must_use]
    pub fn new() -> Self {
        let mut actions: HashMap<Intent, Action> = Intent::ALL
            .into_iter()
            .map(|intent| (intent, noop()))
            .collect();
        actions.insert(Intent::Kill, Arc::new(exit));
        Self { actions }
    }

    /// Replace the action for an intent
    #[must_use]
    pub fn on<F>(mut self, intent: Intent, action: F) -> Self
    where
        F: Fn(Option<&ErrorEvent>) + Send + Sync + 'static,
    {
        self.actions.insert(intent, Arc::new(action));
        self
    }

    /// Register the recovery callback run for `Intent::Recover`
    #[must_use]
    pub fn with_recovery<F>(self, recovery: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(Intent::Recover, move |_| recovery())
    }

    /// Action registered for an intent
    #[must_use]
    pub fn action(&self, intent: Intent) -> Action {
        self.actions.get(&intent).cloned().unwrap_or_else(noop)
    }

    /// Run the action for an intent
    pub fn dispatch(&self, intent: Intent, event: Option<&ErrorEvent>) {
        tracing::debug!(%intent, "dispatching remediation");
        (self.action(intent))(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut intents: Vec<&str> = self.actions.keys().map(|i| i.as_str()).collect();
        intents.sort_unstable();
        f.debug_struct("Dispatcher").field("intents", &intents).finish()
    }
}

fn noop() -> Action {
    Arc::new(|_: Option<&ErrorEvent>| {})
}

fn exit(event: Option<&ErrorEvent>) {
    match event {
        Some(event) => tracing::error!(%event, "terminating process"),
        None => tracing::error!("terminating process"),
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_policy_table() {
        let policy = RemediationPolicy::default();
        assert_eq!(policy.intent_for(Severity::Panic), Intent::Kill);
        assert_eq!(policy.intent_for(Severity::Fatal), Intent::Kill);
        assert_eq!(policy.intent_for(Severity::Critical), Intent::Recover);
        for severity in [Severity::Error, Severity::Warning, Severity::Info, Severity::Debug] {
            assert_eq!(policy.intent_for(severity), Intent::NoOp);
        }
    }

    #[test]
    fn recovery_callback_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new().with_recovery({
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(Intent::Recover, None);
        dispatcher.dispatch(Intent::Retry, None);
        dispatcher.dispatch(Intent::NoOp, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn kill_is_replaceable() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new().on(Intent::Kill, {
            let seen = Arc::clone(&seen);
            move |event| seen.lock().push(event.map(ErrorEvent::message))
        });

        let event = ErrorEvent::from_message("out of memory", Severity::Fatal);
        dispatcher.dispatch(Intent::Kill, Some(&event));
        assert_eq!(*seen.lock(), vec![Some("out of memory".to_string())]);
    }

    #[test]
    fn intent_parse() {
        assert_eq!("Recover".parse::<Intent>().unwrap(), Intent::Recover);
        assert_eq!("exit".parse::<Intent>().unwrap(), Intent::Kill);
        assert!("explode".parse::<Intent>().is_err());
    }
}
