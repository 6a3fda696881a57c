// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry.
//!
//! The `PluginRegistry` stores one `PluginEntry` per plugin, in registration
//! order. Each entry carries the manifest, the lifecycle status, the plugin
//! itself and the patch rules it registered.

use std::collections::HashMap;
use std::sync::Arc;

use velocity_core::VelocityError;
use velocity_patcher::RuleId;

use crate::manifest::PluginManifest;
use crate::plugin::Plugin;

/// Lifecycle status of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    /// Selected to run but not started yet.
    Enabled,
    /// Not selected, or stopped.
    Disabled,
    Running,
    /// Running, but some of its essential patches did not apply. Each entry
    /// describes one failure.
    Degraded(Vec<String>),
    /// `start` failed; the plugin's handlers and rules were removed.
    Failed(String),
}

impl PluginStatus {
    /// Running, degraded or not.
    pub fn is_running(&self) -> bool {
        matches!(self, PluginStatus::Running | PluginStatus::Degraded(_))
    }

    /// Selected to run, whether or not it has started.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PluginStatus::Disabled)
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginStatus::Enabled => write!(f, "enabled"),
            PluginStatus::Disabled => write!(f, "disabled"),
            PluginStatus::Running => write!(f, "running"),
            PluginStatus::Degraded(problems) => {
                write!(f, "degraded ({} patch failures)", problems.len())
            }
            PluginStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A single entry in the plugin registry.
pub struct PluginEntry {
    pub manifest: PluginManifest,
    pub status: PluginStatus,
    pub plugin: Arc<dyn Plugin>,
    /// Rules this plugin registered with the rule book.
    pub rules: Vec<RuleId>,
    /// Patches that failed to compile at registration.
    pub patch_errors: Vec<String>,
    pub patches_collected: bool,
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("manifest", &self.manifest)
            .field("status", &self.status)
            .field("rules", &self.rules)
            .field("patch_errors", &self.patch_errors)
            .finish()
    }
}

/// Registered plugins, in registration order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
    index: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Its initial status follows the manifest: required
    /// and enabled-by-default plugins start `Enabled`, the rest `Disabled`.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<&PluginEntry, VelocityError> {
        let manifest = plugin.manifest();
        let status = if manifest.required || manifest.enabled_by_default {
            PluginStatus::Enabled
        } else {
            PluginStatus::Disabled
        };
        self.register_with_status(plugin, manifest, status)
    }

    /// Register a plugin with an explicit status.
    pub fn register_with_status(
        &mut self,
        plugin: Arc<dyn Plugin>,
        manifest: PluginManifest,
        status: PluginStatus,
    ) -> Result<&PluginEntry, VelocityError> {
        if self.index.contains_key(&manifest.name) {
            return Err(VelocityError::Plugin {
                plugin: manifest.name,
                message: "already registered".to_string(),
            });
        }
        let position = self.entries.len();
        self.index.insert(manifest.name.clone(), position);
        self.entries.push(PluginEntry {
            manifest,
            status,
            plugin,
            rules: Vec::new(),
            patch_errors: Vec::new(),
            patches_collected: false,
        });
        Ok(&self.entries[position])
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginEntry> {
        self.index.get(name).map(|&i| &mut self.entries[i])
    }

    /// Like [`get`](Self::get), but a missing plugin is an error.
    pub fn require(&self, name: &str) -> Result<&PluginEntry, VelocityError> {
        self.get(name)
            .ok_or_else(|| VelocityError::PluginNotFound(name.to_string()))
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter()
    }

    /// Entries that are selected to run, in registration order.
    pub fn enabled(&self) -> Vec<&PluginEntry> {
        self.entries.iter().filter(|e| e.status.is_enabled()).collect()
    }

    /// Every manifest, in registration order.
    pub fn manifests(&self) -> Vec<&PluginManifest> {
        self.entries.iter().map(|e| &e.manifest).collect()
    }

    /// List all plugin entries, sorted by name.
    pub fn list_all(&self) -> Vec<&PluginEntry> {
        let mut entries: Vec<&PluginEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        entries
    }

    /// Select or deselect a plugin that has not started.
    ///
    /// A required plugin cannot be deselected.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), VelocityError> {
        let entry = self
            .get_mut(name)
            .ok_or_else(|| VelocityError::PluginNotFound(name.to_string()))?;
        if !enabled && entry.manifest.required {
            return Err(VelocityError::Plugin {
                plugin: name.to_string(),
                message: "required plugins cannot be disabled".to_string(),
            });
        }
        if entry.status.is_running() {
            return Ok(());
        }
        entry.status = if enabled {
            PluginStatus::Enabled
        } else {
            PluginStatus::Disabled
        };
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
