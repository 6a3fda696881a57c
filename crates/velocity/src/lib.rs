// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Velocity: runtime module interception and patch injection.
//!
//! This crate assembles the engine from its parts. Embedders load a
//! configuration, register plugins, install the engine on the host's module
//! loader before the host runs its entry chunk, then start plugins:
//!
//! ```ignore
//! let mut engine = Velocity::from_config(velocity::load_config()?)?;
//! engine.register_plugin(Arc::new(MyPlugin))?;
//! engine.install(&host)?;
//! engine.start_plugins();
//! ```

pub mod bootstrap;
pub mod doctor;
pub mod status;
pub mod telemetry;

pub use bootstrap::{load_config, Velocity};
pub use doctor::{render_checks, run_checks, CheckResult, CheckStatus};
pub use status::{EngineStatus, PluginSummary};
pub use telemetry::init_tracing;

pub use velocity_config::VelocityConfig;
pub use velocity_core::{
    ContextMenuType, ExportValue, HostFunction, HostObject, ModuleFactory, ModuleHost, ModuleId,
    VelocityError,
};
pub use velocity_patcher::{PatchDef, ReplacementDef};
pub use velocity_plugin::{MenuItem, Plugin, PluginContext, PluginManifest, PluginStatus};
pub use velocity_webpack::{Filter, LazyRef, RefState, SearchKind, SearchOutcome};
