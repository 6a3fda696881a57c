// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning rewritten source text back into a runnable factory.

use std::sync::Arc;

use crate::error::VelocityError;
use crate::traits::host::ModuleFactory;
use crate::types::ModuleId;

/// Compiles rewritten module source into a factory.
pub trait SourceCompiler: Send + Sync {
    /// Check that `source` would compile. Used to revert a rule whose output
    /// breaks the module before the whole module is lost.
    fn validate(&self, _source: &str) -> Result<(), VelocityError> {
        Ok(())
    }

    /// Produce the factory that runs `source` in place of `raw`.
    fn compile(
        &self,
        id: &ModuleId,
        source: Arc<str>,
        raw: &ModuleFactory,
    ) -> Result<ModuleFactory, VelocityError>;
}

/// Default compiler: re-runs the raw factory with the rewritten text bound
/// as its source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebindCompiler;

impl SourceCompiler for RebindCompiler {
    fn compile(
        &self,
        _id: &ModuleId,
        source: Arc<str>,
        raw: &ModuleFactory,
    ) -> Result<ModuleFactory, VelocityError> {
        let raw = raw.clone();
        Ok(ModuleFactory::new(move |scope| {
            raw.invoke(&scope.with_source(&source))
        }))
    }
}
