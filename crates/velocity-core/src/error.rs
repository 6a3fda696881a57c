// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Velocity module engine.

use thiserror::Error;

use crate::types::ModuleId;

/// The primary error type used across the engine and the plugin runtime.
#[derive(Debug, Error)]
pub enum VelocityError {
    /// Configuration errors (invalid TOML, bad manifest, unknown keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// A patch or signature pattern failed to compile.
    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A required replacement found zero matches.
    #[error("patch by {plugin} had no effect (find: {find}, replacement #{replacement})")]
    PatchMiss {
        plugin: String,
        find: String,
        replacement: usize,
    },

    /// A lookup expecting exactly one module matched several.
    #[error("{count} modules matched {request}, be more specific")]
    AmbiguousMatch { request: String, count: usize },

    /// An eager lookup found no module.
    #[error("no module matched {request}")]
    NotFound { request: String },

    /// A resolved export lacks a member its consumer relies on.
    #[error("{name} does not expose `{member}`")]
    HostShape { name: String, member: String },

    /// Requested plugin was not found in the registry.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// A plugin's own code failed at the plugin boundary.
    #[error("plugin {plugin} failed: {message}")]
    Plugin { plugin: String, message: String },

    /// A module factory failed while the host executed it.
    #[error("module {id} failed to execute: {message}")]
    ModuleExecution { id: ModuleId, message: String },

    /// Plugin dependencies form a cycle.
    #[error("circular dependency detected involving plugins: {0}")]
    DependencyCycle(String),

    /// A plugin depends on a plugin that is not registered.
    #[error("plugin {plugin} depends on {dependency} which is not registered")]
    MissingDependency { plugin: String, dependency: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VelocityError {
    /// Returns true for lookup outcomes that a lazy caller treats as "not yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, VelocityError::NotFound { .. } | VelocityError::HostShape { .. })
    }
}
