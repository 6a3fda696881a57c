// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot of engine state for status displays and scripting.

use serde::Serialize;
use velocity_core::{ModuleState, VelocityError};

use crate::bootstrap::Velocity;

/// One plugin in the status output.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PluginSummary {
    pub name: String,
    pub status: String,
}

/// Structured status output.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub installed: bool,
    pub modules_defined: usize,
    pub modules_patched: usize,
    pub modules_executed: usize,
    pub rules: usize,
    pub pending_lookups: usize,
    pub patch_failures: usize,
    pub plugins: Vec<PluginSummary>,
}

impl EngineStatus {
    pub fn collect(engine: &Velocity) -> Self {
        let registry = engine.registry();
        let rules = engine
            .rules()
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len();
        Self {
            installed: engine.interceptor().is_installed(),
            modules_defined: registry.len(),
            modules_patched: registry
                .records()
                .iter()
                .filter(|r| r.patched_source.is_some())
                .count(),
            modules_executed: registry.count_in_state(ModuleState::Executed),
            rules,
            pending_lookups: engine.resolver().pending_count(),
            patch_failures: engine.diagnostics().failures().len(),
            plugins: engine
                .runtime()
                .statuses()
                .into_iter()
                .map(|(name, status)| PluginSummary {
                    name,
                    status: status.to_string(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, VelocityError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VelocityError::Internal(format!("failed to serialize status: {e}")))
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "engine {}",
            if self.installed { "installed" } else { "not installed" }
        )?;
        writeln!(
            f,
            "modules: {} defined, {} patched, {} executed",
            self.modules_defined, self.modules_patched, self.modules_executed
        )?;
        writeln!(
            f,
            "rules: {} active, {} failures; {} lookups pending",
            self.rules, self.patch_failures, self.pending_lookups
        )?;
        for plugin in &self.plugins {
            writeln!(f, "  {:<24} {}", plugin.name, plugin.status)?;
        }
        Ok(())
    }
}
