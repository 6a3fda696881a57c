// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock plugin for deterministic testing.
//!
//! `MockPlugin` implements `Plugin` from a builder: patches, flux actions and
//! context menus are configured up front, and every lifecycle call and
//! delivered action is written to a journal for assertions.

use std::sync::{Arc, Mutex, PoisonError};

use velocity_core::{ExportValue, VelocityError};
use velocity_patcher::PatchDef;
use velocity_plugin::{
    FluxHandler, MenuItem, MenuPatch, Plugin, PluginContext, PluginManifest,
};
use velocity_webpack::Filter;

/// A plugin that records what happens to it.
pub struct MockPlugin {
    manifest: PluginManifest,
    patches: Vec<PatchDef>,
    actions: Vec<String>,
    menus: Vec<String>,
    lookups: Vec<Filter>,
    fail_start: bool,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockPlugin {
    /// A plugin enabled by default with no behaviour.
    pub fn new(name: &str) -> Self {
        Self::with_manifest(PluginManifest::new(name, "mock plugin").enabled_by_default())
    }

    pub fn with_manifest(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            patches: Vec::new(),
            actions: Vec::new(),
            menus: Vec::new(),
            lookups: Vec::new(),
            fail_start: false,
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn patch(mut self, def: PatchDef) -> Self {
        self.patches.push(def);
        self
    }

    /// Journal `flux:<action>:<payload>` for every delivery of `action`.
    pub fn on_flux(mut self, action: &str) -> Self {
        self.actions.push(action.to_string());
        self
    }

    /// Append an item with id `<name>-item` to the menu `nav_id`.
    pub fn on_menu(mut self, nav_id: &str) -> Self {
        self.menus.push(nav_id.to_string());
        self
    }

    /// At start, wait for `filter` and journal `found:<filter>` when it resolves.
    pub fn wait_for(mut self, filter: Filter) -> Self {
        self.lookups.push(filter);
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Shared handle to the journal, usable after the plugin is boxed.
    pub fn journal_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.journal)
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn note(&self, entry: String) {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
    }
}

impl Plugin for MockPlugin {
    fn manifest(&self) -> PluginManifest {
        self.manifest.clone()
    }

    fn patches(&self) -> Vec<PatchDef> {
        self.patches.clone()
    }

    fn flux_handlers(&self) -> Vec<(String, FluxHandler)> {
        self.actions
            .iter()
            .map(|action| {
                let journal = Arc::clone(&self.journal);
                let tag = action.clone();
                let handler: FluxHandler = Arc::new(move |payload: &ExportValue| {
                    let shown = payload
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| payload.describe());
                    journal
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(format!("flux:{tag}:{shown}"));
                    Ok(())
                });
                (action.clone(), handler)
            })
            .collect()
    }

    fn context_menus(&self) -> Vec<(String, MenuPatch)> {
        self.menus
            .iter()
            .map(|nav_id| {
                let id = format!("{}-item", self.manifest.name);
                let patch: MenuPatch = Arc::new(move |items: &mut Vec<MenuItem>, _: &ExportValue| {
                    items.push(MenuItem::item(id.clone(), "Mock"));
                    Ok(())
                });
                (nav_id.clone(), patch)
            })
            .collect()
    }

    fn start(&self, ctx: &PluginContext) -> Result<(), VelocityError> {
        if self.fail_start {
            return Err(VelocityError::Plugin {
                plugin: ctx.name().to_string(),
                message: "mock start failure".to_string(),
            });
        }
        for filter in &self.lookups {
            let journal = Arc::clone(&self.journal);
            let label = filter.to_string();
            ctx.resolver().wait_for(filter.clone(), move |_| {
                journal
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(format!("found:{label}"));
            });
        }
        self.note(format!("start:{}", ctx.name()));
        Ok(())
    }

    fn stop(&self, ctx: &PluginContext) -> Result<(), VelocityError> {
        self.note(format!("stop:{}", ctx.name()));
        Ok(())
    }
}
