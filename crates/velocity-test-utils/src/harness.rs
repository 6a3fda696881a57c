// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete engine over a [`MockHost`]: rule
//! book, interceptor, resolver, plugin runtime and diagnostics. Plugins are
//! registered and their patches collected before the interceptor is
//! installed, matching the real startup sequence.

use std::sync::{Arc, RwLock};

use velocity_config::VelocityConfig;
use velocity_core::{ExportValue, ModuleId, Require, SourceCompiler, VelocityError};
use velocity_patcher::{PatchDiagnostics, RuleBook};
use velocity_plugin::{Plugin, PluginRuntime, Services};
use velocity_webpack::{InterceptorOptions, LazyResolver, ModuleInterceptor, ModuleRegistry};

use crate::compiler::BracketCompiler;
use crate::fixtures::ModuleFixture;
use crate::mock_host::MockHost;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    plugins: Vec<Arc<dyn Plugin>>,
    config: VelocityConfig,
    compiler: Arc<dyn SourceCompiler>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            plugins: Vec::new(),
            config: VelocityConfig::default(),
            compiler: Arc::new(BracketCompiler),
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_config(mut self, config: VelocityConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`BracketCompiler`].
    pub fn with_compiler(mut self, compiler: Arc<dyn SourceCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Build the engine and install it on a fresh host.
    pub fn build(self) -> Result<TestHarness, VelocityError> {
        let rules = Arc::new(RwLock::new(RuleBook::new()));
        let registry = Arc::new(ModuleRegistry::new());
        let resolver = Arc::new(LazyResolver::new(Arc::clone(&registry)));
        let diagnostics = Arc::new(PatchDiagnostics::new(
            self.config.diagnostics.history_limit,
            self.config.diagnostics.warn_on_miss,
        ));

        let mut runtime = PluginRuntime::new(
            Arc::clone(&rules),
            Arc::clone(&diagnostics),
            Services::new(Arc::clone(&resolver)),
        )?;
        for plugin in self.plugins {
            runtime.register(plugin)?;
        }
        runtime.configure(&self.config)?;
        runtime.collect_patches();

        let interceptor = Arc::new(ModuleInterceptor::with_parts(
            Arc::clone(&rules),
            Arc::clone(&registry),
            Arc::clone(&resolver),
            self.compiler,
            Arc::clone(&diagnostics) as _,
            InterceptorOptions {
                validate_patched_source: self.config.engine.validate_patched_source,
                retire_single_use_rules: self.config.engine.retire_single_use_rules,
            },
        ));
        let host = Arc::new(MockHost::new());
        interceptor.install(host.as_ref())?;

        Ok(TestHarness {
            host,
            interceptor,
            registry,
            resolver,
            rules,
            diagnostics,
            runtime,
            config: self.config,
        })
    }
}

/// A complete engine over a mock host.
pub struct TestHarness {
    pub host: Arc<MockHost>,
    pub interceptor: Arc<ModuleInterceptor>,
    pub registry: Arc<ModuleRegistry>,
    pub resolver: Arc<LazyResolver>,
    pub rules: Arc<RwLock<RuleBook>>,
    pub diagnostics: Arc<PatchDiagnostics>,
    pub runtime: PluginRuntime,
    pub config: VelocityConfig,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Define `modules` on the host without running them.
    pub fn load(&self, modules: &[ModuleFixture]) {
        for module in modules {
            self.host.define_fixture(module);
        }
    }

    /// Define and then require every module, returning execution failures.
    pub fn run(&self, modules: &[ModuleFixture]) -> Vec<(ModuleId, VelocityError)> {
        self.load(modules);
        modules
            .iter()
            .filter_map(|m| self.require(&m.id).err().map(|e| (m.id.clone(), e)))
            .collect()
    }

    pub fn require(&self, id: &ModuleId) -> Result<ExportValue, VelocityError> {
        self.host.require(id)
    }

    /// Start every enabled plugin. Returns how many are running.
    pub fn start_plugins(&mut self) -> usize {
        self.runtime.start_all()
    }

    pub fn services(&self) -> &Services {
        self.runtime.services()
    }
}
