// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The module definition hook.
//!
//! Every module the host defines passes through [`ModuleInterceptor`] before
//! its factory can run. Candidate rules are picked by their find token,
//! rewritten over the source in registration order, and compiled into the
//! factory the host stores. When compilation fails the raw factory is kept,
//! so a broken patch degrades the feature instead of the module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{debug, info, warn};
use velocity_core::{
    DefineHook, ModuleFactory, ModuleHost, ModuleId, ModuleScope, RebindCompiler, SourceCompiler,
    VelocityError,
};
use velocity_patcher::{
    DiagnosticsSink, PatchDiagnostics, PatchReport, PatchRewriter, PatchRule, RuleBook, RuleId,
};

use crate::registry::{ModuleRecord, ModuleRegistry};
use crate::resolver::LazyResolver;

/// Behaviour switches for the interceptor.
#[derive(Debug, Clone, Copy)]
pub struct InterceptorOptions {
    /// Check each rule's output with the compiler and revert rules that
    /// break the module.
    pub validate_patched_source: bool,
    /// Stop offering a rule to later modules once it has patched one,
    /// unless the rule is marked `all`.
    pub retire_single_use_rules: bool,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self {
            validate_patched_source: true,
            retire_single_use_rules: true,
        }
    }
}

struct Shared {
    rules: Arc<RwLock<RuleBook>>,
    registry: Arc<ModuleRegistry>,
    resolver: Arc<LazyResolver>,
    compiler: Arc<dyn SourceCompiler>,
    rewriter: PatchRewriter,
    diagnostics: Arc<dyn DiagnosticsSink>,
    options: InterceptorOptions,
}

/// Hooks module definition and publishes executed exports.
pub struct ModuleInterceptor {
    shared: Arc<Shared>,
    installed: AtomicBool,
}

impl ModuleInterceptor {
    /// An interceptor with the default compiler, diagnostics, and options.
    pub fn new(
        rules: Arc<RwLock<RuleBook>>,
        registry: Arc<ModuleRegistry>,
        resolver: Arc<LazyResolver>,
    ) -> Self {
        Self::with_parts(
            rules,
            registry,
            resolver,
            Arc::new(RebindCompiler),
            Arc::new(PatchDiagnostics::default()),
            InterceptorOptions::default(),
        )
    }

    pub fn with_parts(
        rules: Arc<RwLock<RuleBook>>,
        registry: Arc<ModuleRegistry>,
        resolver: Arc<LazyResolver>,
        compiler: Arc<dyn SourceCompiler>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        options: InterceptorOptions,
    ) -> Self {
        let rewriter = if options.validate_patched_source {
            PatchRewriter::with_validator(Arc::clone(&compiler))
        } else {
            PatchRewriter::new()
        };
        Self {
            shared: Arc::new(Shared {
                rules,
                registry,
                resolver,
                compiler,
                rewriter,
                diagnostics,
                options,
            }),
            installed: AtomicBool::new(false),
        }
    }

    /// Attach to the host's definition path.
    ///
    /// Idempotent: a second call is a no-op returning `Ok(false)`. Modules
    /// the host defined before installation are never seen.
    pub fn install(self: &Arc<Self>, host: &dyn ModuleHost) -> Result<bool, VelocityError> {
        if self.installed.swap(true, Ordering::SeqCst) {
            debug!("module interceptor already installed");
            return Ok(false);
        }
        if host.has_started() {
            warn!("host already started executing modules, early modules cannot be patched");
        }
        let hook: Arc<dyn DefineHook> = Arc::clone(self) as Arc<dyn DefineHook>;
        if let Err(e) = host.attach_define_hook(hook) {
            self.installed.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!("module interceptor installed");
        Ok(true)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.shared.registry
    }

    pub fn resolver(&self) -> &Arc<LazyResolver> {
        &self.shared.resolver
    }

    pub fn rules(&self) -> &Arc<RwLock<RuleBook>> {
        &self.shared.rules
    }
}

impl DefineHook for ModuleInterceptor {
    fn on_module_define(&self, id: ModuleId, factory: ModuleFactory, source: &str) -> ModuleFactory {
        let shared = &self.shared;
        let source: Arc<str> = Arc::from(source);

        if !shared
            .registry
            .insert(ModuleRecord::intercepted(id.clone(), Arc::clone(&source), factory.clone()))
        {
            warn!(module = %id, "module defined twice, keeping the first definition");
            return factory;
        }

        let candidates = shared
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .candidates(&source);
        let (lazy, eager): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|r| r.lazy);

        let mut effective = Effective {
            source: Arc::clone(&source),
            factory: factory.clone(),
            applied: Vec::new(),
        };
        if !eager.is_empty() {
            if let Some(patched) = shared.patch(&id, &effective, &eager, &factory) {
                effective = patched;
            }
        }
        // With lazy rules pending, the registry learns the final text at first
        // invocation, so the module moves to PATCHED once.
        if lazy.is_empty() {
            shared.commit(&id, &effective);
        }

        Arc::clone(shared).wrap(id, factory, effective, lazy)
    }
}

#[derive(Clone)]
struct Effective {
    source: Arc<str>,
    factory: ModuleFactory,
    /// Rules whose output is in `source`. Empty for the raw module.
    applied: Vec<RuleId>,
}

impl Shared {
    /// Rewrite `base` with `rules` and compile the result. `None` when
    /// nothing changed or the result would not compile.
    fn patch(
        &self,
        id: &ModuleId,
        base: &Effective,
        rules: &[Arc<PatchRule>],
        raw: &ModuleFactory,
    ) -> Option<Effective> {
        let outcome = self.rewriter.rewrite(&base.source, rules);
        let applied = outcome.applied_rules();

        if self.options.retire_single_use_rules && !applied.is_empty() {
            let mut book = self.rules.write().unwrap_or_else(PoisonError::into_inner);
            for rule in rules.iter().filter(|r| !r.all && applied.contains(&r.id)) {
                book.retire(rule.id);
            }
        }

        let mut report = PatchReport {
            module: id.clone(),
            rules: outcome.rules,
            log: outcome.log,
            fell_back: None,
        };

        let result = if outcome.changed {
            let text: Arc<str> = Arc::from(outcome.text);
            match self.compiler.compile(id, Arc::clone(&text), raw) {
                Ok(factory) => {
                    let mut all_applied = base.applied.clone();
                    all_applied.extend(applied);
                    Some(Effective {
                        source: text,
                        factory,
                        applied: all_applied,
                    })
                }
                Err(e) => {
                    report.fell_back = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        self.diagnostics.record(report);
        result
    }

    /// Record the text the module will run with, if any rule changed it.
    fn commit(&self, id: &ModuleId, effective: &Effective) {
        if effective.applied.is_empty() {
            return;
        }
        self.registry.mark_patched(
            id,
            Arc::clone(&effective.source),
            effective.factory.clone(),
            &effective.applied,
        );
        debug!(module = %id, rules = effective.applied.len(), "module patched");
    }

    /// Lazy rules still live now. Another module may have retired a
    /// single-use rule since this one was defined.
    fn live_rules(&self, lazy: &[Arc<PatchRule>]) -> Vec<Arc<PatchRule>> {
        let book = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        lazy.iter()
            .filter(|r| !book.is_retired(r.id))
            .cloned()
            .collect()
    }

    /// The factory handed back to the host. It applies lazy rules on first
    /// call, runs the effective factory, and publishes the exports once.
    fn wrap(
        self: Arc<Self>,
        id: ModuleId,
        raw: ModuleFactory,
        effective: Effective,
        lazy: Vec<Arc<PatchRule>>,
    ) -> ModuleFactory {
        let resolved: OnceLock<Effective> = OnceLock::new();

        ModuleFactory::new(move |scope: &ModuleScope<'_>| {
            let current = resolved.get_or_init(|| {
                if lazy.is_empty() {
                    return effective.clone();
                }
                let live = self.live_rules(&lazy);
                let result = if live.is_empty() {
                    effective.clone()
                } else {
                    debug!(module = %id, rules = live.len(), "applying deferred patches");
                    self.patch(&id, &effective, &live, &raw)
                        .unwrap_or_else(|| effective.clone())
                };
                self.commit(&id, &result);
                result
            });

            let exports = current.factory.invoke(scope).inspect_err(|e| {
                debug!(module = %id, error = %e, "module factory failed");
            })?;

            if let Some(record) = self.registry.publish(&id, &exports) {
                self.resolver.on_module_executed(&record);
            }
            Ok(exports)
        })
    }
}
