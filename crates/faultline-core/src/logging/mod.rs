//! Logging collaborator interface
//!
//! The core never writes to a terminal or file itself. It hands messages to
//! [`LogChannel`]s through a [`Logger`], which fans each message out to every
//! registered channel.

mod setup;
mod tracing_channel;

pub use setup::{init_tracing, init_tracing_with_filter};
pub use tracing_channel::TracingChannel;

use crate::event::Severity;
use std::fmt::{self, Display};
use std::sync::Arc;

/// A sink for severity-tagged messages
///
/// Every method reports whether the message represented an actual problem.
/// Implementations must not panic; dropping messages under load is allowed.
pub trait LogChannel: Send + Sync + fmt::Debug {
    /// Deliver one rendered message
    fn emit(&self, severity: Severity, message: &str) -> bool;

    /// Debug-level message
    fn debug(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Debug, &render(values))
    }

    /// Info-level message
    fn info(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Info, &render(values))
    }

    /// Warning-level message
    fn warning(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Warning, &render(values))
    }

    /// Error-level message
    fn error(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Error, &render(values))
    }

    /// Critical-level message
    fn critical(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Critical, &render(values))
    }

    /// Fatal-level message
    fn fatal(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Fatal, &render(values))
    }

    /// Panic-level message
    fn panic(&self, values: &[&dyn Display]) -> bool {
        self.emit(Severity::Panic, &render(values))
    }
}

/// Join values with single spaces
#[must_use]
pub fn render(values: &[&dyn Display]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fan-out over any number of channels
#[derive(Debug, Clone, Default)]
pub struct Logger {
    channels: Vec<Arc<dyn LogChannel>>,
}

impl Logger {
    /// Logger without channels; every send is dropped
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger writing to `tracing`
    #[must_use]
    pub fn tracing() -> Self {
        Self::new().with_channel(Arc::new(TracingChannel::new()))
    }

    /// With an additional channel
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn LogChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Send one message to every channel
    ///
    /// Returns whether any channel flagged it as a problem. With no channels
    /// the severity alone decides.
    pub fn send(&self, severity: Severity, values: &[&dyn Display]) -> bool {
        if self.channels.is_empty() {
            return severity.is_problem();
        }

        let message = render(values);
        self.channels
            .iter()
            .fold(false, |problem, channel| channel.emit(severity, &message) || problem)
    }

    /// Number of channels
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
