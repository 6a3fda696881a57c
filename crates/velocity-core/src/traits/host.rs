// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module factories and the host's definition hook point.

use std::fmt;
use std::sync::Arc;

use crate::error::VelocityError;
use crate::types::ModuleId;
use crate::value::ExportValue;

/// Resolves another module's exports from inside a factory.
pub trait Require {
    fn require(&self, id: &ModuleId) -> Result<ExportValue, VelocityError>;
}

/// Everything a factory sees while it runs.
pub struct ModuleScope<'a> {
    id: &'a ModuleId,
    source: &'a str,
    require: &'a dyn Require,
}

impl<'a> ModuleScope<'a> {
    pub fn new(id: &'a ModuleId, source: &'a str, require: &'a dyn Require) -> Self {
        Self { id, source, require }
    }

    pub fn id(&self) -> &ModuleId {
        self.id
    }

    /// The effective source text, after any rewriting.
    pub fn source(&self) -> &str {
        self.source
    }

    pub fn require(&self, id: &ModuleId) -> Result<ExportValue, VelocityError> {
        self.require.require(id)
    }

    /// The same scope with different source text.
    pub fn with_source<'b>(&'b self, source: &'b str) -> ModuleScope<'b> {
        ModuleScope {
            id: self.id,
            source,
            require: self.require,
        }
    }
}

/// Signature of a module factory body.
pub type FactoryFn = dyn Fn(&ModuleScope<'_>) -> Result<ExportValue, VelocityError> + Send + Sync;

/// A module factory: the function the host runs once to produce exports.
#[derive(Clone)]
pub struct ModuleFactory(Arc<FactoryFn>);

impl ModuleFactory {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&ModuleScope<'_>) -> Result<ExportValue, VelocityError> + Send + Sync + 'static,
    {
        Self(Arc::new(body))
    }

    /// A factory that always exports `value`.
    pub fn exporting(value: ExportValue) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn invoke(&self, scope: &ModuleScope<'_>) -> Result<ExportValue, VelocityError> {
        (self.0)(scope)
    }

    pub fn ptr_eq(&self, other: &ModuleFactory) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleFactory(..)")
    }
}

/// Callback the host invokes with every module definition.
///
/// It runs before the factory is ever called and returns the factory the
/// host must store in place of the original.
pub trait DefineHook: Send + Sync {
    fn on_module_define(&self, id: ModuleId, factory: ModuleFactory, source: &str) -> ModuleFactory;
}

/// The host's module loader, seen from the engine.
pub trait ModuleHost: Send + Sync {
    /// Attach the definition hook. Hosts accept a single hook.
    fn attach_define_hook(&self, hook: Arc<dyn DefineHook>) -> Result<(), VelocityError>;

    /// Returns true once the host has started executing its own modules.
    fn has_started(&self) -> bool;
}
