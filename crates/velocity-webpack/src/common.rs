// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookups nearly every plugin needs, registered once at startup.

use velocity_core::{ExportValue, VelocityError};

use crate::filter::Filter;
use crate::resolver::{LazyRef, LazyResolver};

/// Lazy references to the host's shared utility modules.
#[derive(Debug, Clone)]
pub struct CommonModules {
    /// The state container toolkit (`connectStores`, `Store`, ...).
    pub flux: LazyRef,
    /// The hook that subscribes a component to a list of stores.
    pub use_state_from_stores: LazyRef,
    /// Draft kinds used when editing the message composer.
    pub draft_type: LazyRef,
}

impl CommonModules {
    pub fn watch(resolver: &LazyResolver) -> Self {
        Self {
            flux: resolver.find_lazy(Filter::by_props(["connectStores"])),
            use_state_from_stores: resolver.find_lazy(Filter::by_code(["useStateFromStores"])),
            draft_type: resolver.find_lazy(Filter::by_props(["ChannelMessage", "SlashCommand"])),
        }
    }

    /// Run `connectStores` from the resolved toolkit.
    pub fn connect_stores(&self, args: &[ExportValue]) -> Result<ExportValue, VelocityError> {
        self.flux.require()?.call_method("connectStores", args)
    }

    /// True once every common module has resolved.
    pub fn all_resolved(&self) -> bool {
        [&self.flux, &self.use_state_from_stores, &self.draft_type]
            .iter()
            .all(|r| r.get().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use velocity_core::{HostObject, ModuleFactory, ModuleId};

    use crate::registry::{ModuleRecord, ModuleRegistry};

    #[test]
    fn flux_resolves_from_later_module() {
        let registry = Arc::new(ModuleRegistry::new());
        let resolver = LazyResolver::new(Arc::clone(&registry));
        let common = CommonModules::watch(&resolver);
        assert!(common.connect_stores(&[]).is_err());

        let flux: ExportValue = HostObject::builder()
            .function("connectStores", "function(e,t){}", |_| Ok("connected".into()))
            .build()
            .into();
        let id = ModuleId::Numeric(11);
        registry.insert(ModuleRecord::intercepted(
            id.clone(),
            Arc::from("connectStores"),
            ModuleFactory::exporting(flux.clone()),
        ));
        let record = registry.publish(&id, &flux).unwrap();
        resolver.on_module_executed(&record);

        assert_eq!(common.connect_stores(&[]).unwrap().as_str(), Some("connected"));
        assert!(!common.all_resolved());
    }
}
