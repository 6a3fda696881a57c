// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! Every struct uses `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VelocityConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Per-plugin overrides keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

impl VelocityConfig {
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.get(name)
    }

    /// Whether `name` should run, given the manifest's default.
    pub fn is_plugin_enabled(&self, name: &str, manifest_default: bool) -> bool {
        self.plugin(name)
            .and_then(|p| p.enabled)
            .unwrap_or(manifest_default)
    }
}

/// Patch engine behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Check each rule's output with the host compiler and revert rules
    /// whose output no longer compiles.
    #[serde(default = "default_true")]
    pub validate_patched_source: bool,

    /// Retire a rule after the first module it patches unless it is marked
    /// `all`.
    #[serde(default = "default_true")]
    pub retire_single_use_rules: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            validate_patched_source: true,
            retire_single_use_rules: true,
        }
    }
}

/// Patch diagnostics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Log required-replacement misses at warn level.
    #[serde(default = "default_true")]
    pub warn_on_miss: bool,

    /// How many per-module patch reports to keep.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            warn_on_miss: true,
            history_limit: default_history_limit(),
        }
    }
}

/// Overrides for one plugin.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Overrides the manifest's `enabled_by_default`.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Free-form settings handed to the plugin.
    #[serde(default)]
    pub settings: toml::Table,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = VelocityConfig::default();
        assert_eq!(config.engine.log_level, "info");
        assert!(config.engine.validate_patched_source);
        assert!(config.engine.retire_single_use_rules);
        assert!(config.diagnostics.warn_on_miss);
        assert_eq!(config.diagnostics.history_limit, 4096);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn plugin_override_wins_over_manifest_default() {
        let config: VelocityConfig = toml::from_str(
            r#"
[plugins.NoTrack]
enabled = false

[plugins.ShowHiddenChannels]
settings = { hideLocked = true }
"#,
        )
        .unwrap();
        assert!(!config.is_plugin_enabled("NoTrack", true));
        assert!(config.is_plugin_enabled("ShowHiddenChannels", true));
        assert!(!config.is_plugin_enabled("Unlisted", false));
        assert_eq!(
            config.plugin("ShowHiddenChannels").unwrap().settings["hideLocked"].as_bool(),
            Some(true)
        );
    }

    #[test]
    fn unknown_plugin_key_is_rejected() {
        let result = toml::from_str::<VelocityConfig>(
            r#"
[plugins.NoTrack]
enabeld = false
"#,
        );
        assert!(result.is_err());
    }
}
