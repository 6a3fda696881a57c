// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seam traits between the engine and the host's module loader.
//!
//! The host hands every module definition to a [`DefineHook`] before any
//! factory runs; the engine answers with the factory the host should use.

pub mod compiler;
pub mod host;

pub use compiler::{RebindCompiler, SourceCompiler};
pub use host::{DefineHook, FactoryFn, ModuleFactory, ModuleHost, ModuleScope, Require};
