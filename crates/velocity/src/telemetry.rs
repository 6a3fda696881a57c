// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing setup for embedders that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered to `log_level`.
///
/// `RUST_LOG` takes precedence when set. Returns false when a global
/// subscriber already exists, which leaves that subscriber in place.
pub fn init_tracing(log_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("velocity={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init()
        .is_ok()
}
