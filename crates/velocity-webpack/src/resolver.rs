// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module lookups, eager and deferred.
//!
//! Eager lookups scan modules that have already executed. Deferred lookups
//! hand back a [`LazyRef`] right away and are fulfilled the moment a
//! matching module executes. Waiters are drained synchronously, in
//! registration order, before the executing factory returns to the host.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, trace, warn};
use velocity_core::{Cardinality, ExportValue, ModuleId, VelocityError};

use crate::filter::{Filter, MatchRequest};
use crate::registry::{ModuleRecord, ModuleRegistry};

/// Extra check a candidate must pass before it fulfils a lookup.
///
/// A `HostShape` error means "not this one, keep waiting".
pub type ShapeGuard = Arc<dyn Fn(&ExportValue) -> Result<(), VelocityError> + Send + Sync>;

type Callback = Box<dyn FnOnce(&ExportValue) + Send>;

/// State of a deferred lookup. Never moves backwards out of a terminal state.
#[derive(Debug, Clone, Default)]
pub enum RefState {
    #[default]
    Pending,
    Fulfilled(ExportValue),
    /// An exactly-one lookup found this many candidates.
    Ambiguous(usize),
    NotFound,
}

impl RefState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RefState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefState::Pending => "pending",
            RefState::Fulfilled(_) => "fulfilled",
            RefState::Ambiguous(_) => "ambiguous",
            RefState::NotFound => "not_found",
        }
    }
}

struct Slot {
    request: String,
    state: watch::Sender<RefState>,
    callbacks: Mutex<Vec<Callback>>,
}

impl Slot {
    fn new(request: String) -> Arc<Self> {
        let (state, _) = watch::channel(RefState::Pending);
        Arc::new(Self {
            request,
            state,
            callbacks: Mutex::new(Vec::new()),
        })
    }

    fn current(&self) -> RefState {
        self.state.borrow().clone()
    }

    /// Move out of `Pending`. Later settles are ignored.
    fn settle(&self, next: RefState) -> bool {
        let value = match &next {
            RefState::Fulfilled(v) => Some(v.clone()),
            _ => None,
        };
        let label = next.label();
        let moved = self.state.send_if_modified(|current| {
            if current.is_pending() {
                *current = next;
                true
            } else {
                false
            }
        });
        if !moved {
            return false;
        }
        trace!(request = %self.request, state = label, "lazy reference settled");

        let callbacks = std::mem::take(
            &mut *self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if let Some(value) = value {
            for callback in callbacks {
                run_guarded(&self.request, || callback(&value));
            }
        }
        true
    }

    fn on_fulfilled(&self, callback: Callback) {
        let value = {
            let mut callbacks = self
                .callbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match self.current() {
                RefState::Pending => {
                    callbacks.push(callback);
                    return;
                }
                RefState::Fulfilled(value) => value,
                RefState::Ambiguous(_) | RefState::NotFound => return,
            }
        };
        run_guarded(&self.request, || callback(&value));
    }
}

/// Run a subscriber callback so that a panic inside it cannot reach the
/// module that triggered it or the waiters queued after it.
pub(crate) fn run_guarded(request: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(request, "lookup callback panicked");
    }
}

/// Handle to the result of a lookup that may not have resolved yet.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct LazyRef {
    slot: Arc<Slot>,
}

impl LazyRef {
    fn settled(request: String, state: RefState) -> Self {
        let slot = Slot::new(request);
        slot.settle(state);
        Self { slot }
    }

    /// Description of what this reference is waiting for.
    pub fn request(&self) -> &str {
        &self.slot.request
    }

    pub fn state(&self) -> RefState {
        self.slot.current()
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    /// The resolved value, if there is one yet.
    pub fn get(&self) -> Option<ExportValue> {
        match self.state() {
            RefState::Fulfilled(v) => Some(v),
            _ => None,
        }
    }

    /// The resolved value, or the reason there is none.
    pub fn require(&self) -> Result<ExportValue, VelocityError> {
        state_to_result(&self.slot.request, self.state())
    }

    /// Wait until the reference leaves `Pending`.
    pub async fn resolved(&self) -> Result<ExportValue, VelocityError> {
        let mut rx = self.slot.state.subscribe();
        let state = rx
            .wait_for(RefState::is_terminal)
            .await
            .map(|state| (*state).clone())
            .map_err(|_| VelocityError::Internal("lookup state channel closed".into()))?;
        state_to_result(&self.slot.request, state)
    }

    /// Run `callback` once with the value. Runs immediately when the value
    /// is already there and never runs if the lookup ends without one.
    pub fn on_resolved<F>(&self, callback: F)
    where
        F: FnOnce(&ExportValue) + Send + 'static,
    {
        self.slot.on_fulfilled(Box::new(callback));
    }
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("request", &self.slot.request)
            .field("state", &self.state().label())
            .finish()
    }
}

fn state_to_result(request: &str, state: RefState) -> Result<ExportValue, VelocityError> {
    match state {
        RefState::Fulfilled(v) => Ok(v),
        RefState::Ambiguous(count) => Err(VelocityError::AmbiguousMatch {
            request: request.to_string(),
            count,
        }),
        RefState::Pending | RefState::NotFound => Err(VelocityError::NotFound {
            request: request.to_string(),
        }),
    }
}

struct Waiter {
    seq: u64,
    filter: Filter,
    guard: Option<ShapeGuard>,
    slot: Arc<Slot>,
}

/// Answers lookups against the module registry.
pub struct LazyResolver {
    registry: Arc<ModuleRegistry>,
    waiters: Mutex<Vec<Waiter>>,
    next_seq: AtomicU64,
}

impl LazyResolver {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            waiters: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Exactly one executed module must match.
    pub fn find(&self, filter: &Filter) -> Result<ExportValue, VelocityError> {
        let mut hits = self.registry.select(filter, None);
        match hits.len() {
            0 => Err(VelocityError::NotFound {
                request: filter.to_string(),
            }),
            1 => Ok(hits.remove(0).1),
            count => {
                warn!(request = %filter, count, "lookup is ambiguous");
                Err(VelocityError::AmbiguousMatch {
                    request: filter.to_string(),
                    count,
                })
            }
        }
    }

    /// The first executed match in definition order.
    pub fn find_first(&self, filter: &Filter) -> Option<ExportValue> {
        self.registry
            .select(filter, Some(1))
            .into_iter()
            .next()
            .map(|(_, v)| v)
    }

    /// Every executed match in definition order.
    pub fn find_all(&self, filter: &Filter) -> Vec<ExportValue> {
        self.registry
            .select(filter, None)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    /// Dispatch on the request's cardinality.
    pub fn find_request(&self, request: &MatchRequest) -> Result<Vec<ExportValue>, VelocityError> {
        match request.cardinality {
            Cardinality::One => self.find(&request.filter).map(|v| vec![v]),
            Cardinality::Any => self
                .find_first(&request.filter)
                .map(|v| vec![v])
                .ok_or_else(|| VelocityError::NotFound {
                    request: request.to_string(),
                }),
            Cardinality::All => Ok(self.find_all(&request.filter)),
        }
    }

    /// Id of the single executed module matching `filter`.
    pub fn find_module_id(&self, filter: &Filter) -> Result<ModuleId, VelocityError> {
        let hits = self.registry.select(filter, None);
        match hits.as_slice() {
            [] => Err(VelocityError::NotFound {
                request: filter.to_string(),
            }),
            [(id, _)] => Ok(id.clone()),
            _ => Err(VelocityError::AmbiguousMatch {
                request: filter.to_string(),
                count: hits.len(),
            }),
        }
    }

    /// A reference for an exactly-one lookup.
    ///
    /// If modules already match, the reference is settled right away:
    /// fulfilled for one, ambiguous for several. Otherwise the first module
    /// to match later fulfils it, and the reference keeps that value: a second
    /// match executing afterwards is not reported as ambiguous. Use
    /// [`find`](Self::find) once the host has settled to check uniqueness.
    pub fn find_lazy(&self, filter: Filter) -> LazyRef {
        self.register(filter, None, Cardinality::One)
    }

    /// Run `callback` with the first module matching `filter`, now if one
    /// has already executed, otherwise as soon as one does.
    pub fn wait_for<F>(&self, filter: Filter, callback: F) -> LazyRef
    where
        F: FnOnce(&ExportValue) + Send + 'static,
    {
        let lazy = self.register(filter, None, Cardinality::Any);
        lazy.on_resolved(callback);
        lazy
    }

    /// Like [`wait_for`](Self::wait_for) without a callback, but candidates
    /// must also pass `guard`.
    pub fn wait_for_shape(&self, filter: Filter, guard: ShapeGuard) -> LazyRef {
        self.register(filter, Some(guard), Cardinality::Any)
    }

    /// Number of lookups still waiting for a module.
    pub fn pending_count(&self) -> usize {
        self.lock_waiters().len()
    }

    /// Descriptions of the lookups still waiting, in registration order.
    pub fn pending_requests(&self) -> Vec<String> {
        self.lock_waiters()
            .iter()
            .map(|w| w.slot.request.clone())
            .collect()
    }

    fn register(&self, filter: Filter, guard: Option<ShapeGuard>, cardinality: Cardinality) -> LazyRef {
        let request = filter.to_string();
        if filter.is_empty() {
            debug!(%request, "empty filter can never match");
            return LazyRef::settled(request, RefState::NotFound);
        }

        // Scanning under the waiter lock means a module that executes
        // concurrently is seen either by the scan or by the waiter list.
        let mut waiters = self.lock_waiters();
        let hits: Vec<ExportValue> = self
            .registry
            .select(&filter, None)
            .into_iter()
            .map(|(_, v)| v)
            .filter(|v| passes(guard.as_ref(), &request, v))
            .collect();

        let state = match (cardinality, hits.len()) {
            (_, 0) => {
                let slot = Slot::new(request);
                waiters.push(Waiter {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    filter,
                    guard,
                    slot: Arc::clone(&slot),
                });
                return LazyRef { slot };
            }
            (Cardinality::One, count) if count > 1 => {
                warn!(%request, count, "lazy lookup is ambiguous");
                RefState::Ambiguous(count)
            }
            _ => RefState::Fulfilled(hits.into_iter().next().unwrap_or_default()),
        };
        drop(waiters);
        LazyRef::settled(request, state)
    }

    /// Offer a freshly executed module to every waiter.
    ///
    /// Called by the interceptor after the module's exports are published.
    /// Matching waiters are removed and fulfilled in registration order once
    /// the waiter lock is released, so their callbacks may register new
    /// lookups.
    pub(crate) fn on_module_executed(&self, record: &ModuleRecord) {
        let Some(exports) = &record.exports else {
            return;
        };

        let ready: Vec<(u64, Arc<Slot>, ExportValue)> = {
            let mut waiters = self.lock_waiters();
            let mut ready = Vec::new();
            waiters.retain(|w| {
                let Some(value) = w.filter.select(&record.source, exports) else {
                    return true;
                };
                if !passes(w.guard.as_ref(), &w.slot.request, &value) {
                    return true;
                }
                ready.push((w.seq, Arc::clone(&w.slot), value));
                false
            });
            ready
        };

        for (seq, slot, value) in ready {
            trace!(module = %record.id, seq, request = %slot.request, "waiter matched");
            slot.settle(RefState::Fulfilled(value));
        }
    }

    fn lock_waiters(&self) -> std::sync::MutexGuard<'_, Vec<Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn passes(guard: Option<&ShapeGuard>, request: &str, value: &ExportValue) -> bool {
    let Some(guard) = guard else {
        return true;
    };
    match guard(value) {
        Ok(()) => true,
        Err(e) => {
            debug!(request, error = %e, "candidate rejected, still waiting");
            false
        }
    }
}

impl fmt::Debug for LazyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyResolver")
            .field("pending", &self.pending_count())
            .finish()
    }
}
