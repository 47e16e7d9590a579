//! Panic rescue
//!
//! A [`Guard`] runs a unit of work and turns a panic (or an `Err` handed to
//! [`Guard::check`]) into a handled failure: the optional handler is invoked
//! with the failure message and the caller gets `None` instead of unwinding.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type Handler = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs work and rescues it from panics
#[derive(Clone, Default)]
pub struct Guard {
    handler: Option<Handler>,
}

impl Guard {
    /// Guard that only logs rescued failures
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard that hands rescued failures to `handler`
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
        }
    }

    /// Run `work`, returning `None` if it panicked
    pub fn rescue<T, F>(&self, work: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.handle(&panic_message(payload.as_ref()));
                None
            }
        }
    }

    /// Run a fallible `work`, treating both `Err` and panics as failures
    pub fn check<T, E, F>(&self, work: F) -> Option<T>
    where
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        match self.rescue(work)? {
            Ok(value) => Some(value),
            Err(e) => {
                self.handle(&e.to_string());
                None
            }
        }
    }

    fn handle(&self, message: &str) {
        match &self.handler {
            Some(handler) => handler(message),
            None => tracing::warn!(%message, "rescued failure"),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Best-effort text of a panic payload
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
