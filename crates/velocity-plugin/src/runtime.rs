// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin lifecycle.
//!
//! The runtime owns the plugin registry and drives every plugin through
//! register, configure, collect patches, start and stop. Patches must be
//! collected before the host defines its modules; rules added later only
//! reach modules defined afterwards.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use semver::Version;
use tracing::{debug, error, info, warn};
use velocity_config::VelocityConfig;
use velocity_core::VelocityError;
use velocity_patcher::{PatchDiagnostics, RuleBook, RuleId};

use crate::boundary::guarded;
use crate::context::{PluginContext, Services};
use crate::dependency::{enable_dependencies, resolve_start_order};
use crate::plugin::Plugin;
use crate::registry::{PluginEntry, PluginRegistry, PluginStatus};

/// The Velocity release plugins are checked against.
pub fn running_version() -> Result<Version, VelocityError> {
    Version::parse(env!("CARGO_PKG_VERSION"))
        .map_err(|e| VelocityError::Internal(format!("bad crate version: {e}")))
}

/// Drives plugins through their lifecycle.
pub struct PluginRuntime {
    registry: PluginRegistry,
    rules: Arc<RwLock<RuleBook>>,
    diagnostics: Arc<PatchDiagnostics>,
    services: Services,
    settings: BTreeMap<String, toml::Table>,
    order: Vec<String>,
    version: Version,
}

impl PluginRuntime {
    pub fn new(
        rules: Arc<RwLock<RuleBook>>,
        diagnostics: Arc<PatchDiagnostics>,
        services: Services,
    ) -> Result<Self, VelocityError> {
        Ok(Self {
            registry: PluginRegistry::new(),
            rules,
            diagnostics,
            services,
            settings: BTreeMap::new(),
            order: Vec::new(),
            version: running_version()?,
        })
    }

    /// Add a plugin. Fails on a duplicate name or an incompatible manifest.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), VelocityError> {
        plugin.manifest().check_compatible(&self.version)?;
        let entry = self.registry.register(plugin)?;
        debug!(plugin = %entry.manifest.name, status = %entry.status, "plugin registered");
        Ok(())
    }

    /// Apply configuration: enable flags, settings and dependency closure.
    ///
    /// Returns the plugins that were enabled only because an enabled plugin
    /// depends on them. Fails on missing dependencies and cycles.
    pub fn configure(&mut self, config: &VelocityConfig) -> Result<Vec<String>, VelocityError> {
        for name in config.plugins.keys() {
            if self.registry.get(name).is_none() {
                warn!(plugin = %name, "configuration for unknown plugin ignored");
            }
        }

        let mut selected = BTreeSet::new();
        for entry in self.registry.entries() {
            let name = &entry.manifest.name;
            let wanted = entry.manifest.required
                || config.is_plugin_enabled(name, entry.manifest.enabled_by_default);
            if wanted || entry.status.is_running() {
                selected.insert(name.clone());
            }
        }

        let forced = self.select(selected)?;
        self.settings = config
            .plugins
            .iter()
            .map(|(name, plugin)| (name.clone(), plugin.settings.clone()))
            .collect();
        for name in &forced {
            info!(plugin = %name, "enabled as a dependency");
        }
        Ok(forced)
    }

    /// Mark exactly `selected` (plus dependencies) as enabled and recompute
    /// the start order.
    fn select(&mut self, mut selected: BTreeSet<String>) -> Result<Vec<String>, VelocityError> {
        selected.extend(
            self.registry
                .entries()
                .filter(|e| e.manifest.required)
                .map(|e| e.manifest.name.clone()),
        );
        let forced = enable_dependencies(&self.registry.manifests(), &mut selected)?;
        let chosen: Vec<_> = self
            .registry
            .manifests()
            .into_iter()
            .filter(|m| selected.contains(&m.name))
            .collect();
        let order = resolve_start_order(&chosen)?;

        let names: Vec<String> = self.registry.entries().map(|e| e.manifest.name.clone()).collect();
        for name in names {
            self.registry.set_enabled(&name, selected.contains(&name))?;
        }
        self.order = order;
        Ok(forced)
    }

    /// Register the patches of every enabled plugin, in start order.
    ///
    /// Call once before installing the interceptor. Returns how many rules
    /// were registered.
    pub fn collect_patches(&mut self) -> usize {
        if self.order.is_empty() {
            let selected = self.registry.enabled().iter().map(|e| e.manifest.name.clone()).collect();
            if let Err(e) = self.select(selected) {
                error!(error = %e, "cannot order plugins; no patches collected");
                return 0;
            }
        }
        let order = self.order.clone();
        order.iter().map(|name| self.collect_for(name)).sum()
    }

    fn collect_for(&mut self, name: &str) -> usize {
        let Some(entry) = self.registry.get_mut(name) else {
            return 0;
        };
        if entry.patches_collected || !entry.status.is_enabled() {
            return 0;
        }
        entry.patches_collected = true;

        let plugin = Arc::clone(&entry.plugin);
        let defs = match guarded(name, "patches", || Ok(plugin.patches())) {
            Ok(defs) => defs,
            Err(e) => {
                error!(plugin = name, error = %e, "collecting patches failed");
                entry.patch_errors.push(e.to_string());
                return 0;
            }
        };

        let (ids, errors) = self
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register_all(name, &defs);
        for e in &errors {
            warn!(plugin = name, error = %e, "patch rejected");
        }
        debug!(plugin = name, rules = ids.len(), "patches collected");
        let count = ids.len();
        entry.rules.extend(ids);
        entry.patch_errors.extend(errors.iter().map(ToString::to_string));
        count
    }

    /// Start every enabled plugin in dependency order.
    ///
    /// A plugin whose dependency failed is not started. Returns how many
    /// plugins are running afterwards.
    pub fn start_all(&mut self) -> usize {
        let order = self.order.clone();
        for name in &order {
            let startable = self
                .registry
                .get(name)
                .is_some_and(|e| e.status == PluginStatus::Enabled);
            if startable {
                self.start_entry(name);
            }
        }
        self.registry.entries().filter(|e| e.status.is_running()).count()
    }

    /// Enable and start one plugin, starting its dependencies first.
    pub fn start(&mut self, name: &str) -> Result<PluginStatus, VelocityError> {
        self.registry.require(name)?;
        let mut closure = BTreeSet::from([name.to_string()]);
        enable_dependencies(&self.registry.manifests(), &mut closure)?;

        let mut selected: BTreeSet<String> = self
            .registry
            .enabled()
            .iter()
            .map(|e| e.manifest.name.clone())
            .collect();
        selected.extend(closure.iter().cloned());
        self.select(selected)?;

        let order = self.order.clone();
        for dep in order.iter().filter(|n| closure.contains(*n)) {
            if self.registry.get(dep).is_some_and(|e| e.status == PluginStatus::Enabled) {
                if self.collect_for(dep) > 0 {
                    debug!(plugin = %dep, "late patches only reach modules defined from now on");
                }
                self.start_entry(dep);
            }
        }
        Ok(self.registry.require(name)?.status.clone())
    }

    fn start_entry(&mut self, name: &str) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        if let Some(dep) = entry
            .manifest
            .dependencies
            .iter()
            .find(|d| !self.registry.get(d).is_some_and(|e| e.status.is_running()))
        {
            let reason = format!("dependency {dep} is not running");
            warn!(plugin = name, %reason, "plugin not started");
            self.set_status(name, PluginStatus::Failed(reason));
            return;
        }

        let plugin = Arc::clone(&entry.plugin);
        let ctx = self.context_for(name);
        let services = &self.services;

        match guarded(name, "flux handlers", || Ok(plugin.flux_handlers())) {
            Ok(handlers) => {
                for (action, handler) in handlers {
                    services.flux.subscribe(name, &action, handler);
                }
            }
            Err(e) => error!(plugin = name, error = %e, "flux handlers unavailable"),
        }
        match guarded(name, "context menus", || Ok(plugin.context_menus())) {
            Ok(menus) => {
                for (nav_id, patch) in menus {
                    services.menus.add_patch(&nav_id, name, patch);
                }
            }
            Err(e) => error!(plugin = name, error = %e, "context menu patches unavailable"),
        }

        if let Err(e) = guarded(name, "start", || plugin.start(&ctx)) {
            error!(plugin = name, error = %e, "plugin failed to start");
            self.detach(name);
            self.set_status(name, PluginStatus::Failed(e.to_string()));
            return;
        }

        let status = match self.patch_problems(name) {
            problems if problems.is_empty() => PluginStatus::Running,
            problems => {
                warn!(
                    plugin = name,
                    failures = problems.len(),
                    "essential patches failed; plugin may not work this session"
                );
                PluginStatus::Degraded(problems)
            }
        };
        info!(plugin = name, %status, "plugin started");
        self.set_status(name, status);
    }

    /// Failures of a plugin that declares its patches essential.
    fn patch_problems(&self, name: &str) -> Vec<String> {
        let Some(entry) = self.registry.get(name) else {
            return Vec::new();
        };
        if !entry.manifest.essential_patches {
            return Vec::new();
        }
        let mut problems = entry.patch_errors.clone();
        problems.extend(
            self.diagnostics
                .failures_for_owner(name)
                .into_iter()
                .map(|(module, report)| {
                    format!("rule {} ({}) in module {module}: {:?}", report.rule, report.find, report.status)
                }),
        );
        problems
    }

    /// Stop one plugin, after every running plugin that depends on it.
    pub fn stop(&mut self, name: &str) -> Result<(), VelocityError> {
        let entry = self.registry.require(name)?;
        if entry.manifest.required {
            return Err(VelocityError::Plugin {
                plugin: name.to_string(),
                message: "required plugins cannot be stopped".to_string(),
            });
        }

        let dependents = self.dependents_of(name);
        if let Some(required) = dependents
            .iter()
            .find(|d| self.registry.get(d).is_some_and(|e| e.manifest.required))
        {
            return Err(VelocityError::Plugin {
                plugin: name.to_string(),
                message: format!("required plugin {required} depends on it"),
            });
        }
        let order = self.order.clone();
        for other in order.iter().rev().filter(|n| dependents.contains(n.as_str())) {
            self.stop_entry(other);
        }
        self.stop_entry(name);
        self.order.retain(|n| n != name && !dependents.contains(n.as_str()));
        Ok(())
    }

    /// Stop everything, in reverse start order.
    pub fn stop_all(&mut self) {
        let order = self.order.clone();
        for name in order.iter().rev() {
            self.stop_entry(name);
        }
        self.order.clear();
    }

    fn dependents_of(&self, name: &str) -> HashSet<String> {
        let mut found: HashSet<String> = HashSet::new();
        let mut frontier = vec![name.to_string()];
        while let Some(current) = frontier.pop() {
            for entry in self.registry.entries() {
                if entry.manifest.dependencies.contains(&current)
                    && found.insert(entry.manifest.name.clone())
                {
                    frontier.push(entry.manifest.name.clone());
                }
            }
        }
        found
    }

    fn stop_entry(&mut self, name: &str) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        let was_running = entry.status.is_running();
        if was_running {
            let plugin = Arc::clone(&entry.plugin);
            let ctx = self.context_for(name);
            if let Err(e) = guarded(name, "stop", || plugin.stop(&ctx)) {
                error!(plugin = name, error = %e, "plugin failed to stop cleanly");
            }
        }
        self.detach(name);
        if let Some(entry) = self.registry.get_mut(name) {
            entry.rules.clear();
            entry.patches_collected = false;
        }
        self.set_status(name, PluginStatus::Disabled);
        if was_running {
            info!(plugin = name, "plugin stopped");
        }
    }

    /// Remove everything a plugin added to the shared services.
    fn detach(&self, name: &str) {
        let handlers = self.services.flux.unsubscribe_owner(name);
        let menus = self.services.menus.remove_owner(name);
        let rules = self
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_owner(name);
        debug!(plugin = name, handlers, menus, rules, "plugin detached");
    }

    fn set_status(&mut self, name: &str, status: PluginStatus) {
        if let Some(entry) = self.registry.get_mut(name) {
            entry.status = status;
        }
    }

    fn context_for(&self, name: &str) -> PluginContext {
        let settings = self.settings.get(name).cloned().unwrap_or_default();
        PluginContext::new(name, settings, self.services.clone())
    }

    /// A context for `name`, as its lifecycle hooks would see it.
    pub fn context(&self, name: &str) -> Result<PluginContext, VelocityError> {
        self.registry.require(name)?;
        Ok(self.context_for(name))
    }

    /// Rules of `name` that have not matched any module yet.
    pub fn unmatched_rules(&self, name: &str) -> Vec<RuleId> {
        let Some(entry) = self.registry.get(name) else {
            return Vec::new();
        };
        let seen: HashSet<RuleId> = self.diagnostics.rules_seen().into_iter().collect();
        entry.rules.iter().copied().filter(|id| !seen.contains(id)).collect()
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.registry.get(name).map(|e| e.status.clone())
    }

    /// Every plugin and its status, in registration order.
    pub fn statuses(&self) -> Vec<(String, PluginStatus)> {
        self.registry
            .entries()
            .map(|e| (e.manifest.name.clone(), e.status.clone()))
            .collect()
    }

    /// The current start order of enabled plugins.
    pub fn start_order(&self) -> &[String] {
        &self.order
    }

    pub fn entry(&self, name: &str) -> Option<&PluginEntry> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("plugins", &self.registry.len())
            .field("order", &self.order)
            .field("version", &self.version)
            .finish()
    }
}
