//! Cancellable execution contexts
//!
//! Contexts form a tree. A child layered on a parent is cancelled whenever
//! the parent is, with the parent's reason. Timeout and deadline layers carry
//! an instant after which they report [`CancelReason::DeadlineExceeded`]; the
//! expiry is recorded the first time anyone observes or awaits it. The first
//! recorded reason is final.

use crate::error::ScopeError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Why a context ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    /// A cancel handle was invoked
    Cancelled,
    /// A timeout or deadline elapsed
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("context cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

#[derive(Debug)]
struct ContextNode {
    parent: Option<Arc<ContextNode>>,
    deadline: Option<Instant>,
    reason: Mutex<Option<CancelReason>>,
    children: Mutex<Vec<Weak<ContextNode>>>,
    notify: Notify,
}

impl ContextNode {
    fn root() -> Self {
        Self {
            parent: None,
            deadline: None,
            reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Record `reason` unless one is already set, then wake waiters and
    /// propagate to descendants. Returns whether this call ended the context.
    fn cancel_with(&self, reason: CancelReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }

        self.notify.notify_waiters();

        let children: Vec<Arc<ContextNode>> = {
            let mut children = self.children.lock();
            let live = children.iter().filter_map(Weak::upgrade).collect();
            children.clear();
            live
        };
        for child in children {
            child.cancel_with(reason);
        }

        true
    }

    fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = *self.reason.lock() {
            return Some(reason);
        }

        if let Some(reason) = self.parent.as_ref().and_then(|p| p.reason()) {
            self.cancel_with(reason);
            return self.recorded();
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel_with(CancelReason::DeadlineExceeded);
                self.recorded()
            }
            _ => None,
        }
    }

    fn recorded(&self) -> Option<CancelReason> {
        *self.reason.lock()
    }

    fn effective_deadline(&self) -> Option<Instant> {
        let inherited = self.parent.as_ref().and_then(|p| p.effective_deadline());
        match (self.deadline, inherited) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }
}

/// Handle to one node in the context tree
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Debug, Clone)]
pub struct ScopeContext {
    node: Arc<ContextNode>,
}

impl ScopeContext {
    /// Inert root that is never cancelled and has no deadline
    #[must_use]
    pub fn background() -> Self {
        Self {
            node: Arc::new(ContextNode::root()),
        }
    }

    fn child(&self, deadline: Option<Instant>) -> (ScopeContext, CancelHandle) {
        let node = Arc::new(ContextNode {
            parent: Some(Arc::clone(&self.node)),
            deadline,
            reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });

        {
            let mut children = self.node.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&node));
        }

        // A parent that ended before the child was registered would never
        // reach it through propagation.
        if let Some(reason) = self.node.reason() {
            node.cancel_with(reason);
        }

        let handle = CancelHandle {
            node: Arc::clone(&node),
        };
        (ScopeContext { node }, handle)
    }

    /// Layer a sub-context that ends when its handle is invoked
    #[must_use]
    pub fn with_cancel(&self) -> (ScopeContext, CancelHandle) {
        self.child(None)
    }

    /// Layer a sub-context that ends after `timeout`
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (ScopeContext, CancelHandle) {
        let now = Instant::now();
        let deadline = now.checked_add(timeout);
        self.child(deadline)
    }

    /// Layer a sub-context that ends at the monotonic instant `deadline`
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (ScopeContext, CancelHandle) {
        self.child(Some(deadline))
    }

    /// Layer a sub-context that ends at the wall-clock time `deadline`
    ///
    /// A deadline in the past yields an already-expired context.
    #[must_use]
    pub fn with_deadline_at(&self, deadline: DateTime<Utc>) -> (ScopeContext, CancelHandle) {
        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.with_timeout(remaining)
    }

    /// Why the context ended, if it has
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.node.reason()
    }

    /// Whether the context has ended for any reason
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Earliest deadline on this context or any ancestor
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.node.effective_deadline()
    }

    /// Wait until the context ends
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            let notified = self.node.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel cannot slip between.
            notified.as_mut().enable();

            if let Some(reason) = self.reason() {
                return reason;
            }

            match self.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Drive `work` until it completes or the context ends
    ///
    /// # Errors
    /// - `ScopeError::Cancelled` if a cancel handle fired first
    /// - `ScopeError::DeadlineExceeded` if a timeout or deadline elapsed first
    pub async fn run<F>(&self, work: F) -> Result<F::Output, ScopeError>
    where
        F: Future,
    {
        if let Some(reason) = self.reason() {
            return Err(ScopeError::from(reason));
        }

        tokio::select! {
            biased;
            reason = self.cancelled() => Err(ScopeError::from(reason)),
            output = work => Ok(output),
        }
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Zero-argument cancel function for one context layer
///
/// Safe to invoke any number of times; only the first call has an effect,
/// and none at all if the layer already ended.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    node: Arc<ContextNode>,
}

impl CancelHandle {
    /// End the layer and everything nested beneath it
    ///
    /// Returns whether this call ended the layer.
    pub fn cancel(&self) -> bool {
        self.node.cancel_with(CancelReason::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_inert() {
        let root = ScopeContext::background();
        assert!(!root.is_cancelled());
        assert!(root.deadline().is_none());
    }

    #[test]
    fn cancel_propagates_down_not_up() {
        let root = ScopeContext::background();
        let (outer, outer_cancel) = root.with_cancel();
        let (inner, inner_cancel) = outer.with_cancel();

        assert!(inner_cancel.cancel());
        assert_eq!(inner.reason(), Some(CancelReason::Cancelled));
        assert!(!outer.is_cancelled());

        let (sibling, _sibling_cancel) = outer.with_cancel();
        assert!(outer_cancel.cancel());
        assert_eq!(sibling.reason(), Some(CancelReason::Cancelled));
        assert!(!root.is_cancelled());
    }

    #[test]
    fn handles_are_idempotent() {
        let (ctx, cancel) = ScopeContext::background().with_cancel();
        assert!(cancel.cancel());
        assert!(!cancel.cancel());
        assert!(!cancel.clone().cancel());
        assert_eq!(ctx.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn child_of_ended_parent_starts_ended() {
        let (parent, cancel) = ScopeContext::background().with_cancel();
        cancel.cancel();
        let (child, _) = parent.with_cancel();
        assert_eq!(child.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn past_deadline_is_expired() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let (ctx, cancel) = ScopeContext::background().with_deadline_at(past);
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
        // Too late to change the recorded reason.
        assert!(!cancel.cancel());
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn effective_deadline_is_earliest() {
        let root = ScopeContext::background();
        let (outer, _) = root.with_timeout(Duration::from_millis(50));
        let (inner, _) = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[test]
    fn parent_expiry_reaches_child() {
        let root = ScopeContext::background();
        let (outer, _) = root.with_timeout(Duration::ZERO);
        let (inner, _) = outer.with_cancel();
        assert_eq!(inner.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wakes_on_handle() {
        let (ctx, cancel) = ScopeContext::background().with_cancel();
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });

        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), CancelReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wakes_on_timeout() {
        let (ctx, _cancel) = ScopeContext::background().with_timeout(Duration::from_millis(20));
        assert_eq!(ctx.cancelled().await, CancelReason::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_in_flight_work() {
        let (ctx, cancel) = ScopeContext::background().with_cancel();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(30)))
            .await;
        assert!(matches!(result, Err(ScopeError::Cancelled)));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_follows_runtime_clock() {
        let (ctx, _cancel) = ScopeContext::background().with_timeout(Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!ctx.is_cancelled());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(ctx.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_output_when_work_wins() {
        let (ctx, _cancel) = ScopeContext::background().with_timeout(Duration::from_secs(30));
        let result = ctx.run(async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
