// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine assembly.
//!
//! [`Velocity`] owns one instance of every component and runs the startup
//! sequence: register plugins, collect their patches, install the
//! interceptor on the host's loader, then start plugins once the host is
//! running.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use velocity_config::{render_errors, VelocityConfig};
use velocity_core::{ModuleHost, ModuleId, RebindCompiler, SourceCompiler, VelocityError};
use velocity_patcher::{PatchDiagnostics, RewriteOutcome, RuleBook, RuleId};
use velocity_plugin::{ContextMenuApi, FluxDispatcher, Plugin, PluginRuntime, Services};
use velocity_webpack::{
    rerun_rule, search, CommonModules, InterceptorOptions, LazyResolver, ModuleInterceptor,
    ModuleRegistry, SearchKind, SearchOutcome, StoreRegistry,
};

/// Load and validate configuration from the standard locations.
///
/// Diagnostics for every problem are rendered to stderr; the returned error
/// only summarises them.
pub fn load_config() -> Result<VelocityConfig, VelocityError> {
    velocity_config::load_and_validate().map_err(|errors| {
        render_errors(&errors);
        VelocityError::Config(format!("{} configuration error(s)", errors.len()))
    })
}

/// The assembled engine.
pub struct Velocity {
    config: VelocityConfig,
    rules: Arc<RwLock<RuleBook>>,
    registry: Arc<ModuleRegistry>,
    resolver: Arc<LazyResolver>,
    diagnostics: Arc<PatchDiagnostics>,
    interceptor: Arc<ModuleInterceptor>,
    runtime: PluginRuntime,
}

impl Velocity {
    /// An engine with the default source compiler.
    pub fn from_config(config: VelocityConfig) -> Result<Self, VelocityError> {
        Self::with_compiler(config, Arc::new(RebindCompiler))
    }

    pub fn with_compiler(
        config: VelocityConfig,
        compiler: Arc<dyn SourceCompiler>,
    ) -> Result<Self, VelocityError> {
        let rules = Arc::new(RwLock::new(RuleBook::new()));
        let registry = Arc::new(ModuleRegistry::new());
        let resolver = Arc::new(LazyResolver::new(Arc::clone(&registry)));
        let diagnostics = Arc::new(PatchDiagnostics::new(
            config.diagnostics.history_limit,
            config.diagnostics.warn_on_miss,
        ));
        let interceptor = Arc::new(ModuleInterceptor::with_parts(
            Arc::clone(&rules),
            Arc::clone(&registry),
            Arc::clone(&resolver),
            compiler,
            Arc::clone(&diagnostics) as _,
            InterceptorOptions {
                validate_patched_source: config.engine.validate_patched_source,
                retire_single_use_rules: config.engine.retire_single_use_rules,
            },
        ));
        let runtime = PluginRuntime::new(
            Arc::clone(&rules),
            Arc::clone(&diagnostics),
            Services::new(Arc::clone(&resolver)),
        )?;

        Ok(Self {
            config,
            rules,
            registry,
            resolver,
            diagnostics,
            interceptor,
            runtime,
        })
    }

    /// Add a plugin. Plugins must be registered before [`install`](Self::install).
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), VelocityError> {
        if self.interceptor.is_installed() {
            return Err(VelocityError::Plugin {
                plugin: plugin.manifest().name,
                message: "plugins must be registered before the engine is installed".to_string(),
            });
        }
        self.runtime.register(plugin)
    }

    /// Configure plugins, collect their patches and hook the host's loader.
    ///
    /// Returns `Ok(false)` if the engine was already installed.
    pub fn install(&mut self, host: &dyn ModuleHost) -> Result<bool, VelocityError> {
        if self.interceptor.is_installed() {
            return Ok(false);
        }
        let forced = self.runtime.configure(&self.config)?;
        if !forced.is_empty() {
            info!(plugins = ?forced, "dependencies enabled");
        }
        let rules = self.runtime.collect_patches();
        let installed = self.interceptor.install(host)?;
        info!(rules, plugins = self.runtime.start_order().len(), "engine installed");
        Ok(installed)
    }

    /// Start every enabled plugin. Returns how many are running.
    pub fn start_plugins(&mut self) -> usize {
        if !self.interceptor.is_installed() {
            warn!("starting plugins before the engine is installed; no patches will apply");
        }
        self.runtime.start_all()
    }

    /// Stop every plugin in reverse start order.
    pub fn shutdown(&mut self) {
        self.runtime.stop_all();
        info!("engine shut down");
    }

    /// Pre-subscribe every well-known store.
    pub fn watch_well_known_stores(&self) -> usize {
        self.stores().watch_well_known()
    }

    /// Developer search over the modules seen so far.
    pub fn search(&self, kind: SearchKind, inputs: &[&str]) -> SearchOutcome {
        search(&self.registry, kind, inputs)
    }

    /// Re-run one registered rule against a module's original source.
    pub fn rerun(&self, rule: RuleId, module: &ModuleId) -> Result<RewriteOutcome, VelocityError> {
        let rule = self
            .rules
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(rule)
            .ok_or_else(|| VelocityError::NotFound {
                request: format!("rule {rule}"),
            })?;
        rerun_rule(&self.registry, &rule, module)
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RwLock<RuleBook>> {
        &self.rules
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<LazyResolver> {
        &self.resolver
    }

    pub fn diagnostics(&self) -> &Arc<PatchDiagnostics> {
        &self.diagnostics
    }

    pub fn interceptor(&self) -> &Arc<ModuleInterceptor> {
        &self.interceptor
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.runtime.services().stores
    }

    pub fn common(&self) -> &CommonModules {
        &self.runtime.services().common
    }

    pub fn flux(&self) -> &FluxDispatcher {
        &self.runtime.services().flux
    }

    pub fn menus(&self) -> &ContextMenuApi {
        &self.runtime.services().menus
    }

    pub fn runtime(&self) -> &PluginRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut PluginRuntime {
        &mut self.runtime
    }
}

impl std::fmt::Debug for Velocity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Velocity")
            .field("installed", &self.interceptor.is_installed())
            .field("modules", &self.registry.len())
            .field("runtime", &self.runtime)
            .finish()
    }
}
