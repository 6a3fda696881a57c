// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/velocity/velocity.toml`,
//! `~/.config/velocity/velocity.toml`, `./velocity.toml`, then `VELOCITY_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use tracing::debug;

use crate::model::VelocityConfig;

const SYSTEM_CONFIG: &str = "/etc/velocity/velocity.toml";
const LOCAL_CONFIG: &str = "velocity.toml";

/// Config file locations in merge order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("velocity").join(LOCAL_CONFIG));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG));
    paths
}

/// Load from the standard hierarchy with env overrides.
pub fn load_config() -> Result<VelocityConfig, figment::Error> {
    build_figment().extract()
}

/// Load from an inline TOML string only. No files, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<VelocityConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VelocityConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from one file with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<VelocityConfig, figment::Error> {
    log_layer(path);
    Figment::new()
        .merge(Serialized::defaults(VelocityConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full figment before extraction, for callers that want its metadata.
pub fn build_figment() -> Figment {
    search_paths().into_iter().fold(
        Figment::new().merge(Serialized::defaults(VelocityConfig::default())),
        |figment, path| {
            log_layer(&path);
            figment.merge(Toml::file(path))
        },
    )
    .merge(env_provider())
}

fn log_layer(path: &Path) {
    if path.exists() {
        debug!(path = %path.display(), "merging config file");
    } else {
        debug!(path = %path.display(), "config file not found, skipping");
    }
}

/// `VELOCITY_ENGINE_LOG_LEVEL` must land on `engine.log_level`, not
/// `engine.log.level`, so sections are mapped explicitly rather than split
/// on every underscore.
fn env_provider() -> Env {
    Env::prefixed("VELOCITY_").map(|key| {
        key.as_str()
            .replacen("engine_", "engine.", 1)
            .replacen("diagnostics_", "diagnostics.", 1)
            .into()
    })
}
