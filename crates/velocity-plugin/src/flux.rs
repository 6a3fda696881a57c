// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscriptions to the host's action dispatcher.
//!
//! Plugins subscribe handlers by action type. Dispatch runs the handlers for
//! one action in subscription order; a handler that fails or panics is
//! logged and the rest still run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};
use velocity_core::{ExportValue, VelocityError};

use crate::boundary::guarded;

/// Handler for one action type.
pub type FluxHandler = Arc<dyn Fn(&ExportValue) -> Result<(), VelocityError> + Send + Sync>;

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    owner: String,
    handler: FluxHandler,
}

/// What happened during one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Owners whose handlers failed, in dispatch order.
    pub failed: Vec<String>,
}

/// Routes actions to plugin handlers.
#[derive(Default)]
pub struct FluxDispatcher {
    handlers: RwLock<BTreeMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl FluxDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, owner: &str, action: &str, handler: FluxHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(action.to_string())
            .or_default()
            .push(Subscription {
                id,
                owner: owner.to_string(),
                handler,
            });
        debug!(plugin = owner, action, "flux handler subscribed");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        for subs in handlers.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            removed |= subs.len() != before;
        }
        handlers.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Drop every handler `owner` subscribed. Returns how many were removed.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for subs in handlers.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.owner != owner);
            removed += before - subs.len();
        }
        handlers.retain(|_, subs| !subs.is_empty());
        removed
    }

    pub fn handler_count(&self, action: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action)
            .map_or(0, Vec::len)
    }

    /// Deliver `payload` to every handler of `action`.
    ///
    /// Handlers are copied out first, so a handler may subscribe or
    /// unsubscribe without deadlocking; such changes apply from the next
    /// dispatch.
    pub fn dispatch(&self, action: &str, payload: &ExportValue) -> DispatchReport {
        let targets: Vec<(String, FluxHandler)> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(action) {
                Some(subs) => subs
                    .iter()
                    .map(|s| (s.owner.clone(), Arc::clone(&s.handler)))
                    .collect(),
                None => return DispatchReport::default(),
            }
        };

        let mut report = DispatchReport::default();
        for (owner, handler) in targets {
            match guarded(&owner, action, || handler(payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    error!(plugin = %owner, action, error = %e, "flux handler failed");
                    report.failed.push(owner);
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for FluxDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let actions: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("FluxDispatcher")
            .field("actions", &actions)
            .finish()
    }
}
