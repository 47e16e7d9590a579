//! Faultline Core - in-process error observation
//!
//! Three cooperating pieces:
//! - A bounded, concurrency-safe history of severity-tagged error events
//! - A pluggable advisor that turns that history into a health verdict
//! - A manager of nested cancellable execution scopes keyed by id
//!
//! [`Observer`] is the front door tying them to a logger and a remediation
//! dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline_core::prelude::*;
//!
//! let observer = Observer::default();
//! observer.report(Severity::Error, Some("disk full"));
//!
//! let id = observer.scopes().set(ScopeFlags::default().cancellable().with_timeout());
//! if !observer.ok() {
//!     observer.scopes().cancel(id);
//! }
//! ```

#![warn(unreachable_pub)]

pub mod advisor;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod guard;
pub mod logging;
pub mod observer;
pub mod remediation;
pub mod scope;

// Re-exports for convenience
pub use advisor::{Advisor, Degradation, DiagnosticSample, MajorityAdvisor, Sampler};
pub use collector::{Drain, HistoryCollector, Snapshot, DEFAULT_CAPACITY};
pub use config::{AdvisorConfig, FaultlineConfig, HistoryConfig, RemediationConfig, ScopeConfig};
pub use error::{ConfigError, FaultlineError, ScopeError};
pub use event::{BoxedCause, ErrorEvent, Message, Severity};
pub use guard::Guard;
pub use logging::{LogChannel, Logger, TracingChannel};
pub use observer::Observer;
pub use remediation::{Dispatcher, Intent, RemediationPolicy};
pub use scope::{CancelHandle, CancelReason, Scope, ScopeContext, ScopeFlags, ScopeId, ScopeManager};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Faultline Core
    pub use crate::{
        Advisor, Degradation, ErrorEvent, FaultlineConfig, Intent, Observer, ScopeContext,
        ScopeFlags, ScopeId, ScopeManager, Severity,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
