// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Velocity module engine.
//!
//! This crate provides the error taxonomy, identifiers, the host value model
//! and the seam traits through which the engine talks to the host's module
//! loader. Every other crate in the workspace builds on these types.

pub mod error;
pub mod traits;
pub mod types;
pub mod value;

// Re-export key items at crate root for ergonomic imports.
pub use error::VelocityError;
pub use types::{Cardinality, ContextMenuType, MatchKind, ModuleId, ModuleState};
pub use value::{ExportValue, HostFunction, HostObject, ObjectBuilder};

// Re-export the host seam at crate root.
pub use traits::{
    DefineHook, ModuleFactory, ModuleHost, ModuleScope, RebindCompiler, Require, SourceCompiler,
};
