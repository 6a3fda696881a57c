// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock module loader for deterministic testing.
//!
//! `MockHost` stores factories as they are defined, passing each through the
//! attached definition hook first, and runs them on `require` with a cache,
//! the way a bundle runtime does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use velocity_core::{
    DefineHook, ExportValue, ModuleFactory, ModuleHost, ModuleId, ModuleScope, Require,
    VelocityError,
};

use crate::fixtures::ModuleFixture;

struct Defined {
    source: Arc<str>,
    factory: ModuleFactory,
}

/// A module host with injectable definitions.
#[derive(Default)]
pub struct MockHost {
    hook: Mutex<Option<Arc<dyn DefineHook>>>,
    defined: Mutex<HashMap<ModuleId, Defined>>,
    order: Mutex<Vec<ModuleId>>,
    cache: Mutex<HashMap<ModuleId, ExportValue>>,
    started: AtomicBool,
    executions: AtomicUsize,
    reject_hook: bool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose loader cannot be hooked.
    pub fn rejecting_hooks() -> Self {
        Self {
            reject_hook: true,
            ..Self::default()
        }
    }

    /// Define a module, handing it to the hook if one is attached.
    pub fn define(&self, id: impl Into<ModuleId>, source: &str, factory: ModuleFactory) {
        let id = id.into();
        let hook = self.hook.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let factory = match hook {
            Some(hook) => hook.on_module_define(id.clone(), factory, source),
            None => factory,
        };
        self.defined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                Defined {
                    source: Arc::from(source),
                    factory,
                },
            );
        self.order.lock().unwrap_or_else(PoisonError::into_inner).push(id);
    }

    pub fn define_fixture(&self, fixture: &ModuleFixture) {
        self.define(fixture.id.clone(), &fixture.source, fixture.factory());
    }

    /// Mark the host as running its own modules.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Ids in definition order.
    pub fn defined_ids(&self) -> Vec<ModuleId> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// How many factories have actually run.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn is_hooked(&self) -> bool {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Require every defined module in definition order, collecting failures.
    pub fn require_all(&self) -> Vec<(ModuleId, VelocityError)> {
        self.defined_ids()
            .into_iter()
            .filter_map(|id| self.require(&id).err().map(|e| (id, e)))
            .collect()
    }
}

impl Require for MockHost {
    fn require(&self, id: &ModuleId) -> Result<ExportValue, VelocityError> {
        if let Some(cached) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(id) {
            return Ok(cached.clone());
        }
        let (source, factory) = {
            let defined = self.defined.lock().unwrap_or_else(PoisonError::into_inner);
            let module = defined.get(id).ok_or_else(|| VelocityError::NotFound {
                request: format!("module {id}"),
            })?;
            (Arc::clone(&module.source), module.factory.clone())
        };

        self.started.store(true, Ordering::SeqCst);
        self.executions.fetch_add(1, Ordering::SeqCst);
        let exports = factory.invoke(&ModuleScope::new(id, &source, self))?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), exports.clone());
        Ok(exports)
    }
}

impl ModuleHost for MockHost {
    fn attach_define_hook(&self, hook: Arc<dyn DefineHook>) -> Result<(), VelocityError> {
        if self.reject_hook {
            return Err(VelocityError::Internal("module loader is sealed".into()));
        }
        let mut slot = self.hook.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(VelocityError::Internal("a define hook is already attached".into()));
        }
        *slot = Some(hook);
        Ok(())
    }

    fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHost")
            .field("defined", &self.defined_ids().len())
            .field("executions", &self.executions())
            .field("hooked", &self.is_hooked())
            .finish()
    }
}
