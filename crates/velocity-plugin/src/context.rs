// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handles a running plugin gets to the engine.

use std::sync::Arc;

use velocity_patcher::template::self_reference;
use velocity_webpack::{CommonModules, LazyResolver, StoreRegistry};

use crate::context_menu::ContextMenuApi;
use crate::flux::FluxDispatcher;

/// Shared services, created once per runtime.
#[derive(Debug, Clone)]
pub struct Services {
    pub resolver: Arc<LazyResolver>,
    pub stores: Arc<StoreRegistry>,
    pub common: CommonModules,
    pub flux: Arc<FluxDispatcher>,
    pub menus: Arc<ContextMenuApi>,
}

impl Services {
    /// Services over `resolver`, with the common modules already watched.
    pub fn new(resolver: Arc<LazyResolver>) -> Self {
        Self {
            stores: Arc::new(StoreRegistry::new(Arc::clone(&resolver))),
            common: CommonModules::watch(&resolver),
            flux: Arc::new(FluxDispatcher::new()),
            menus: Arc::new(ContextMenuApi::new()),
            resolver,
        }
    }
}

/// What `start` and `stop` receive.
#[derive(Debug, Clone)]
pub struct PluginContext {
    name: String,
    settings: toml::Table,
    services: Services,
}

impl PluginContext {
    pub fn new(name: impl Into<String>, settings: toml::Table, services: Services) -> Self {
        Self {
            name: name.into(),
            settings,
            services,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `[plugins.<Name>.settings]` table from configuration.
    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<&toml::Value> {
        self.settings.get(key)
    }

    /// A boolean setting, or `default` when absent or not a boolean.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.setting(key)
            .and_then(toml::Value::as_bool)
            .unwrap_or(default)
    }

    pub fn resolver(&self) -> &LazyResolver {
        &self.services.resolver
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.services.stores
    }

    pub fn common(&self) -> &CommonModules {
        &self.services.common
    }

    pub fn flux(&self) -> &FluxDispatcher {
        &self.services.flux
    }

    pub fn menus(&self) -> &ContextMenuApi {
        &self.services.menus
    }

    /// The expression patched host code uses to reach this plugin.
    pub fn self_reference(&self) -> String {
        self_reference(&self.name)
    }
}
