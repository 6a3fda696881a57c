// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Velocity integration tests.
//!
//! Provides a mock module host, captured module sources and a harness that
//! wires the whole engine together, so tests run without the real client.
//!
//! # Components
//!
//! - [`MockHost`] - Module loader with a definition hook and a require cache
//! - [`BracketCompiler`] - Source compiler that rejects unbalanced output
//! - [`MockPlugin`] - Configurable plugin that journals its lifecycle
//! - [`TestHarness`] - Complete engine over a [`MockHost`]

pub mod compiler;
pub mod fixtures;
pub mod harness;
pub mod mock_host;
pub mod mock_plugin;

pub use compiler::BracketCompiler;
pub use fixtures::ModuleFixture;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_host::MockHost;
pub use mock_plugin::MockPlugin;
