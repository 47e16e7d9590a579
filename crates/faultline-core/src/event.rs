//! Error events and their severity
//!
//! An [`ErrorEvent`] is the unit stored by the history collector and
//! classified by advisors. Events are immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Boxed cause accepted when constructing an event
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Severity of a reported failure
///
/// Variants are declared least to most severe so the derived ordering gives
/// `Panic > Fatal > Critical > Error > Warning > Info > Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Diagnostic noise
    Debug,
    /// Informational
    Info,
    /// Something looks off
    Warning,
    /// An operation failed
    Error,
    /// A subsystem failed
    Critical,
    /// The process cannot continue normally
    Fatal,
    /// Unrecoverable
    Panic,
}

impl Severity {
    /// All severities, least to most severe
    pub const ALL: [Severity; 7] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Fatal,
        Severity::Panic,
    ];

    /// Whether the advisor counts this severity against health
    #[inline]
    #[must_use]
    pub fn is_severe(self) -> bool {
        self >= Severity::Critical
    }

    /// Whether a message at this severity represents an actual problem
    #[inline]
    #[must_use]
    pub fn is_problem(self) -> bool {
        self >= Severity::Error
    }

    /// Stable index, `Debug = 0` through `Panic = 6`
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Fatal => "fatal",
            Severity::Panic => "panic",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "fatal" => Ok(Severity::Fatal),
            "panic" => Ok(Severity::Panic),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

/// Plain-text cause used when an event is built from a message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Message(pub String);

/// A recorded failure tagged with a severity
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    cause: Arc<dyn StdError + Send + Sync + 'static>,
    severity: Severity,
    recorded_at: DateTime<Utc>,
}

impl ErrorEvent {
    /// Create an event from any error (or anything convertible into a boxed error)
    #[must_use]
    pub fn new(cause: impl Into<BoxedCause>, severity: Severity) -> Self {
        Self {
            cause: Arc::from(cause.into()),
            severity,
            recorded_at: Utc::now(),
        }
    }

    /// Create an event from a plain message
    #[must_use]
    pub fn from_message(message: impl Into<String>, severity: Severity) -> Self {
        Self::new(Message(message.into()), severity)
    }

    /// The original cause
    #[inline]
    #[must_use]
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Message text of the cause
    #[must_use]
    pub fn message(&self) -> String {
        self.cause.to_string()
    }

    /// Severity tag
    #[inline]
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Wall-clock time the event was created
    #[inline]
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn severity_total_order() {
        assert!(Severity::Panic > Severity::Fatal);
        assert!(Severity::Fatal > Severity::Critical);
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Debug);

        let mut sorted = Severity::ALL;
        sorted.sort();
        assert_eq!(sorted, Severity::ALL);
    }

    #[test]
    fn severe_bucket() {
        let severe: Vec<_> = Severity::ALL.into_iter().filter(|s| s.is_severe()).collect();
        assert_eq!(severe, vec![Severity::Critical, Severity::Fatal, Severity::Panic]);
    }

    #[test]
    fn event_round_trip() {
        let event = ErrorEvent::from_message("disk full", Severity::Error);
        assert_eq!(event.message(), "disk full");
        assert_eq!(event.severity(), Severity::Error);
    }

    #[test]
    fn event_keeps_original_cause() {
        let err = io::Error::new(io::ErrorKind::NotFound, "missing manifest");
        let event = ErrorEvent::new(err, Severity::Warning);

        let io_err = event
            .cause()
            .downcast_ref::<io::Error>()
            .expect("cause should stay an io::Error");
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
        assert_eq!(event.to_string(), "[warning] missing manifest");
    }

    #[test]
    fn severity_parse() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" critical ".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("loud".parse::<Severity>().is_err());
    }
}
