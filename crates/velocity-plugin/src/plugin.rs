// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The surface a feature module implements to join the runtime.

use velocity_core::VelocityError;
use velocity_patcher::PatchDef;

use crate::context::PluginContext;
use crate::context_menu::MenuPatch;
use crate::flux::FluxHandler;
use crate::manifest::PluginManifest;

/// A feature plugin.
///
/// Everything except the manifest is optional. Patches are collected once,
/// before the host defines its modules; handlers, menu patches and `start`
/// take effect when the plugin starts and are undone when it stops.
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> PluginManifest;

    /// Source patches to register at startup.
    fn patches(&self) -> Vec<PatchDef> {
        Vec::new()
    }

    /// Flux handlers keyed by action type.
    fn flux_handlers(&self) -> Vec<(String, FluxHandler)> {
        Vec::new()
    }

    /// Context-menu patches keyed by navigation id.
    fn context_menus(&self) -> Vec<(String, MenuPatch)> {
        Vec::new()
    }

    fn start(&self, _ctx: &PluginContext) -> Result<(), VelocityError> {
        Ok(())
    }

    fn stop(&self, _ctx: &PluginContext) -> Result<(), VelocityError> {
        Ok(())
    }
}
