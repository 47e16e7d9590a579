use super::LogChannel;
use crate::event::Severity;

/// Default channel: forwards messages to the `tracing` ecosystem
///
/// Panic, Fatal, Critical and Error map to `error!`; the rest map to the
/// level of the same name. The original severity is kept as a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannel;

impl TracingChannel {
    /// Create the channel
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LogChannel for TracingChannel {
    fn emit(&self, severity: Severity, message: &str) -> bool {
        match severity {
            Severity::Panic | Severity::Fatal | Severity::Critical | Severity::Error => {
                tracing::error!(target: "faultline", %severity, "{message}");
            }
            Severity::Warning => tracing::warn!(target: "faultline", %severity, "{message}"),
            Severity::Info => tracing::info!(target: "faultline", %severity, "{message}"),
            Severity::Debug => tracing::debug!(target: "faultline", %severity, "{message}"),
        }
        severity.is_problem()
    }
}
