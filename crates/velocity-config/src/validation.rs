// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::VelocityConfig;

/// Accepted values for `engine.log_level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first.
pub fn validate_config(config: &VelocityConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.engine.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        let hint = crate::diagnostic::suggest_key(&level, LOG_LEVELS)
            .map(|s| format!(" (did you mean `{s}`?)"))
            .unwrap_or_default();
        errors.push(ConfigError::Validation {
            message: format!(
                "engine.log_level `{}` is not one of {}{hint}",
                config.engine.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.diagnostics.history_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "diagnostics.history_limit must be greater than 0".to_string(),
        });
    }

    for name in config.plugins.keys() {
        if name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "plugin names in [plugins.<name>] must not be empty".to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
