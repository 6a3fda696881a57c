// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arena of every module the host has defined.
//!
//! Only the interceptor writes to the registry. Everyone else receives
//! cloned [`ModuleRecord`] snapshots.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use velocity_core::{ExportValue, ModuleFactory, ModuleId, ModuleState};
use velocity_patcher::RuleId;

use crate::filter::Filter;

/// Everything known about one module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub id: ModuleId,
    /// Source as the host defined it.
    pub source: Arc<str>,
    /// Source after rewriting, when any rule changed it.
    pub patched_source: Option<Arc<str>>,
    pub raw_factory: ModuleFactory,
    pub patched_factory: Option<ModuleFactory>,
    /// Set once, the first time the factory returns.
    pub exports: Option<ExportValue>,
    pub state: ModuleState,
    pub applied_rules: Vec<RuleId>,
}

impl ModuleRecord {
    pub(crate) fn intercepted(id: ModuleId, source: Arc<str>, raw_factory: ModuleFactory) -> Self {
        Self {
            id,
            source,
            patched_source: None,
            raw_factory,
            patched_factory: None,
            exports: None,
            state: ModuleState::Intercepted,
            applied_rules: Vec::new(),
        }
    }

    /// The source the host actually runs.
    pub fn effective_source(&self) -> &str {
        self.patched_source.as_deref().unwrap_or(&self.source)
    }

    pub fn is_executed(&self) -> bool {
        self.state == ModuleState::Executed
    }
}

#[derive(Default)]
struct Arena {
    records: HashMap<ModuleId, ModuleRecord>,
    order: Vec<ModuleId>,
}

/// Module records keyed by id, iterated in definition order.
#[derive(Default)]
pub struct ModuleRegistry {
    arena: RwLock<Arena>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read(|a| a.order.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.read(|a| a.records.contains_key(id))
    }

    pub fn get(&self, id: &ModuleId) -> Option<ModuleRecord> {
        self.read(|a| a.records.get(id).cloned())
    }

    /// Ids of every defined module in definition order.
    pub fn ids(&self) -> Vec<ModuleId> {
        self.read(|a| a.order.clone())
    }

    /// Snapshots of every defined module in definition order.
    pub fn records(&self) -> Vec<ModuleRecord> {
        self.read(|a| {
            a.order
                .iter()
                .filter_map(|id| a.records.get(id).cloned())
                .collect()
        })
    }

    pub fn count_in_state(&self, state: ModuleState) -> usize {
        self.read(|a| a.records.values().filter(|r| r.state == state).count())
    }

    /// Run `filter` over executed modules in definition order, stopping
    /// after `limit` hits when given.
    pub fn select(&self, filter: &Filter, limit: Option<usize>) -> Vec<(ModuleId, ExportValue)> {
        self.read(|a| {
            let mut hits = Vec::new();
            for id in &a.order {
                if limit.is_some_and(|l| hits.len() >= l) {
                    break;
                }
                let Some(record) = a.records.get(id) else {
                    continue;
                };
                let Some(exports) = &record.exports else {
                    continue;
                };
                if let Some(value) = filter.select(&record.source, exports) {
                    hits.push((id.clone(), value));
                }
            }
            hits
        })
    }

    /// Insert a newly defined module. Returns false, leaving the existing
    /// record untouched, when the id is already known.
    pub(crate) fn insert(&self, record: ModuleRecord) -> bool {
        self.write(|a| {
            if a.records.contains_key(&record.id) {
                return false;
            }
            a.order.push(record.id.clone());
            a.records.insert(record.id.clone(), record);
            true
        })
    }

    pub(crate) fn mark_patched(
        &self,
        id: &ModuleId,
        source: Arc<str>,
        factory: ModuleFactory,
        rules: &[RuleId],
    ) {
        self.write(|a| {
            if let Some(record) = a.records.get_mut(id) {
                record.patched_source = Some(source);
                record.patched_factory = Some(factory);
                record.applied_rules.extend_from_slice(rules);
                if record.state == ModuleState::Intercepted {
                    record.state = ModuleState::Patched;
                }
            }
        });
    }

    /// Publish a module's exports. Returns the record the first time only.
    pub(crate) fn publish(&self, id: &ModuleId, exports: &ExportValue) -> Option<ModuleRecord> {
        self.write(|a| {
            let record = a.records.get_mut(id)?;
            if record.exports.is_some() {
                return None;
            }
            record.exports = Some(exports.clone());
            record.state = ModuleState::Executed;
            Some(record.clone())
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Arena) -> T) -> T {
        let guard = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Arena) -> T) -> T {
        let mut guard = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocity_core::HostObject;

    fn record(id: u64, source: &str) -> ModuleRecord {
        ModuleRecord::intercepted(
            ModuleId::Numeric(id),
            Arc::from(source),
            ModuleFactory::exporting(ExportValue::Undefined),
        )
    }

    #[test]
    fn duplicate_ids_keep_first_definition() {
        let registry = ModuleRegistry::new();
        assert!(registry.insert(record(1, "first")));
        assert!(!registry.insert(record(1, "second")));
        assert_eq!(&*registry.get(&ModuleId::Numeric(1)).unwrap().source, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lifecycle_moves_forward() {
        let registry = ModuleRegistry::new();
        let id = ModuleId::Numeric(7);
        registry.insert(record(7, "a"));
        registry.mark_patched(
            &id,
            Arc::from("b"),
            ModuleFactory::exporting(ExportValue::Undefined),
            &[RuleId(3)],
        );
        let patched = registry.get(&id).unwrap();
        assert_eq!(patched.state, ModuleState::Patched);
        assert_eq!(patched.effective_source(), "b");

        assert!(registry.publish(&id, &ExportValue::from("x")).is_some());
        assert!(registry.publish(&id, &ExportValue::from("y")).is_none());
        let executed = registry.get(&id).unwrap();
        assert!(executed.is_executed());
        assert_eq!(executed.exports.unwrap().as_str(), Some("x"));
        assert_eq!(executed.applied_rules, vec![RuleId(3)]);
    }

    #[test]
    fn select_walks_definition_order_and_skips_unexecuted() {
        let registry = ModuleRegistry::new();
        for (id, src) in [(30, "marker one"), (10, "marker two"), (20, "marker three")] {
            registry.insert(record(id, src));
        }
        let exports: ExportValue = HostObject::builder().build().into();
        registry.publish(&ModuleId::Numeric(10), &exports);
        registry.publish(&ModuleId::Numeric(30), &exports);

        let filter = Filter::by_code(["marker"]);
        let ids: Vec<ModuleId> = registry
            .select(&filter, None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![ModuleId::Numeric(30), ModuleId::Numeric(10)]);
        assert_eq!(registry.select(&filter, Some(1)).len(), 1);
    }
}
