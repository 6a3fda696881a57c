// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Isolation for plugin-supplied code.

use std::panic::{catch_unwind, AssertUnwindSafe};

use velocity_core::VelocityError;

/// Run `f`, turning a panic into a `Plugin` error owned by `plugin`.
pub(crate) fn guarded<T>(
    plugin: &str,
    what: &str,
    f: impl FnOnce() -> Result<T, VelocityError>,
) -> Result<T, VelocityError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(VelocityError::Plugin {
                plugin: plugin.to_string(),
                message: format!("{what} panicked: {detail}"),
            })
        }
    }
}
