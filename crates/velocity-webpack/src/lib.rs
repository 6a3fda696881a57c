// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Module resolution and patch injection.
//!
//! The [`ModuleInterceptor`] sits on the host's module definition path and
//! rewrites source before any factory runs. Executed exports land in the
//! [`ModuleRegistry`], where the [`LazyResolver`] and [`StoreRegistry`] match
//! them against structural [`Filter`]s and fulfil outstanding lookups.

pub mod common;
pub mod filter;
pub mod interceptor;
pub mod registry;
pub mod resolver;
pub mod search;
pub mod stores;

pub use common::CommonModules;
pub use filter::{Filter, MatchRequest, Token};
pub use interceptor::{InterceptorOptions, ModuleInterceptor};
pub use registry::{ModuleRecord, ModuleRegistry};
pub use resolver::{LazyRef, LazyResolver, RefState, ShapeGuard};
pub use search::{rerun_rule, search, SearchKind, SearchOutcome};
pub use stores::{StoreHandle, StoreRegistry, WELL_KNOWN_STORES};
