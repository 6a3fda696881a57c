// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin system for Velocity.
//!
//! Plugins declare a manifest, source patches, flux handlers and
//! context-menu patches. The [`PluginRuntime`] orders them by dependency,
//! registers their patches before the host defines its modules, and runs
//! their lifecycle hooks behind an error boundary.

mod boundary;

pub mod context;
pub mod context_menu;
pub mod dependency;
pub mod flux;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod runtime;

pub use context::{PluginContext, Services};
pub use context_menu::{
    find_group_children_by_child_id, ContextMenuApi, GlobalMenuPatch, MenuItem, MenuItemKind,
    MenuPatch, MenuPatchId, MenuReport,
};
pub use dependency::{enable_dependencies, resolve_start_order};
pub use flux::{DispatchReport, FluxDispatcher, FluxHandler, SubscriptionId};
pub use manifest::{parse_plugin_manifest, PluginManifest};
pub use plugin::Plugin;
pub use registry::{PluginEntry, PluginRegistry, PluginStatus};
pub use runtime::{running_version, PluginRuntime};
