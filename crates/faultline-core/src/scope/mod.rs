//! Scope & cancellation manager
//!
//! A scope is a stack of cancellable context layers keyed by a [`ScopeId`].
//! Layers are applied in a fixed order on top of an inert root:
//! 1. cancel-capable layer (`cancellable`)
//! 2. timeout layer (`timeout`)
//! 3. deadline layer (`deadline`)
//!
//! Each layer's cancellation also ends every layer nested beneath it.
//! Scopes move `Open -> Cancelled` exactly once; the id is never reused.

pub mod context;

pub use context::{CancelHandle, CancelReason, ScopeContext};

use crate::config::ScopeConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque scope identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub Uuid);

impl ScopeId {
    /// Mint a fresh identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which layers a scope is composed of
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFlags {
    /// Root is the background context (both roots are inert)
    pub background: bool,
    /// Add a cancel-capable layer
    pub cancellable: bool,
    /// Add a timeout layer using the configured duration
    pub timeout: bool,
    /// Add a deadline layer using the configured absolute time
    pub deadline: bool,
}

impl ScopeFlags {
    /// Background root with no layers
    #[inline]
    #[must_use]
    pub fn background() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    /// With a cancel-capable layer
    #[inline]
    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// With a timeout layer
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self) -> Self {
        self.timeout = true;
        self
    }

    /// With a deadline layer
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self) -> Self {
        self.deadline = true;
        self
    }
}

/// A registered scope: its composition, effective context and cancel handles
#[derive(Debug, Clone)]
pub struct Scope {
    id: ScopeId,
    flags: ScopeFlags,
    context: ScopeContext,
    handles: Vec<CancelHandle>,
}

impl Scope {
    /// Scope identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Requested composition
    #[inline]
    #[must_use]
    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    /// Innermost context; work bound to the scope observes this one
    #[inline]
    #[must_use]
    pub fn context(&self) -> &ScopeContext {
        &self.context
    }

    /// Cancel handles in registration order
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[CancelHandle] {
        &self.handles
    }

    fn cancel(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }
}

/// Creates, tracks and tears down scopes
#[derive(Debug, Default)]
pub struct ScopeManager {
    config: ScopeConfig,
    scopes: DashMap<ScopeId, Scope>,
}

impl ScopeManager {
    /// Create a manager using `config` for timeout and deadline layers
    #[must_use]
    pub fn new(config: ScopeConfig) -> Self {
        Self {
            config,
            scopes: DashMap::new(),
        }
    }

    /// Build a scope from `flags` and register it
    ///
    /// Scopes whose timeout or deadline already fired are torn down first.
    pub fn set(&self, flags: ScopeFlags) -> ScopeId {
        self.reap_expired();

        let mut context = ScopeContext::background();
        let mut handles = Vec::new();

        if flags.cancellable {
            let (ctx, handle) = context.with_cancel();
            context = ctx;
            handles.push(handle);
        }

        if flags.timeout {
            let (ctx, handle) = context.with_timeout(self.config.timeout());
            context = ctx;
            handles.push(handle);
        }

        if flags.deadline {
            let (ctx, handle) = context.with_deadline_at(self.config.deadline());
            context = ctx;
            handles.push(handle);
        }

        let id = ScopeId::new();
        tracing::debug!(scope = %id, ?flags, layers = handles.len(), "scope opened");
        self.scopes.insert(
            id,
            Scope {
                id,
                flags,
                context,
                handles,
            },
        );
        id
    }

    /// Look up an open scope
    ///
    /// Unknown and cancelled ids yield `None`. A scope whose timeout or
    /// deadline already fired is torn down here and also yields `None`.
    #[must_use]
    pub fn get(&self, id: ScopeId) -> Option<Scope> {
        let scope = self.scopes.get(&id).map(|entry| entry.value().clone())?;
        if scope.context.is_cancelled() {
            self.cancel(id);
            return None;
        }
        Some(scope)
    }

    /// Invoke every cancel handle for `id` in registration order, then forget it
    ///
    /// Unknown or already-cancelled ids are a no-op. Returns whether a scope
    /// was torn down by this call.
    pub fn cancel(&self, id: ScopeId) -> bool {
        // Handles run after the entry is gone, outside the map's shard lock.
        let Some((_, scope)) = self.scopes.remove(&id) else {
            return false;
        };
        scope.cancel();
        tracing::debug!(scope = %id, reason = ?scope.context.reason(), "scope cancelled");
        true
    }

    /// Cancel every open scope, returning how many were torn down
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<ScopeId> = self.scopes.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Tear down scopes whose timeout or deadline has fired
    pub fn reap_expired(&self) -> usize {
        let expired: Vec<ScopeId> = self
            .scopes
            .iter()
            .filter(|entry| entry.value().context.is_cancelled())
            .map(|entry| *entry.key())
            .collect();
        expired.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Ids of the open scopes, skipping any whose timeout or deadline fired
    #[must_use]
    pub fn ids(&self) -> Vec<ScopeId> {
        self.scopes
            .iter()
            .filter(|entry| !entry.value().context.is_cancelled())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of open scopes, skipping any whose timeout or deadline fired
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes
            .iter()
            .filter(|entry| !entry.value().context.is_cancelled())
            .count()
    }

    /// Whether no scope is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Settings used for timeout and deadline layers
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }
}
