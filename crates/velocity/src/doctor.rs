// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health checks over a running engine.
//!
//! Identifies the usual causes of a broken session after a host update:
//! an interceptor installed too late, patch rules that stopped matching,
//! and plugins that failed or lost essential patches.

use velocity_plugin::PluginStatus;

use crate::bootstrap::Velocity;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

fn check_installed(engine: &Velocity) -> CheckResult {
    if engine.interceptor().is_installed() {
        CheckResult::new("interceptor", CheckStatus::Pass, "hooked into the module loader")
    } else {
        CheckResult::new("interceptor", CheckStatus::Fail, "not installed; no module will be patched")
    }
}

fn check_patches(engine: &Velocity) -> CheckResult {
    let failures = engine.diagnostics().failures();
    if failures.is_empty() {
        return CheckResult::new("patches", CheckStatus::Pass, "no failed rules");
    }
    let mut owners: Vec<&str> = failures.iter().map(|(_, r)| r.owner.as_str()).collect();
    owners.sort_unstable();
    owners.dedup();
    CheckResult::new(
        "patches",
        CheckStatus::Warn,
        format!("{} failed rule(s) from {}", failures.len(), owners.join(", ")),
    )
}

fn check_unmatched(engine: &Velocity) -> CheckResult {
    let runtime = engine.runtime();
    let unmatched: Vec<String> = runtime
        .start_order()
        .iter()
        .filter_map(|name| {
            let count = runtime.unmatched_rules(name).len();
            (count > 0).then(|| format!("{name} ({count})"))
        })
        .collect();
    if unmatched.is_empty() {
        CheckResult::new("coverage", CheckStatus::Pass, "every rule matched a module")
    } else {
        CheckResult::new(
            "coverage",
            CheckStatus::Warn,
            format!("rules with no matching module: {}", unmatched.join(", ")),
        )
    }
}

fn check_plugins(engine: &Velocity) -> CheckResult {
    let mut failed = Vec::new();
    let mut degraded = Vec::new();
    for (name, status) in engine.runtime().statuses() {
        match status {
            PluginStatus::Failed(_) => failed.push(name),
            PluginStatus::Degraded(_) => degraded.push(name),
            _ => {}
        }
    }
    if !failed.is_empty() {
        CheckResult::new("plugins", CheckStatus::Fail, format!("failed: {}", failed.join(", ")))
    } else if !degraded.is_empty() {
        CheckResult::new(
            "plugins",
            CheckStatus::Warn,
            format!("essential patches missing: {}", degraded.join(", ")),
        )
    } else {
        CheckResult::new("plugins", CheckStatus::Pass, "all enabled plugins healthy")
    }
}

/// Run every check.
pub fn run_checks(engine: &Velocity) -> Vec<CheckResult> {
    vec![
        check_installed(engine),
        check_patches(engine),
        check_unmatched(engine),
        check_plugins(engine),
    ]
}

/// Plain-text report, one line per check plus a summary.
pub fn render_checks(results: &[CheckResult]) -> String {
    let mut out = String::new();
    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in results {
        let symbol = match result.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => {
                warn_count += 1;
                "warn"
            }
            CheckStatus::Fail => {
                fail_count += 1;
                "FAIL"
            }
        };
        out.push_str(&format!("  [{symbol:>4}] {:<12} {}\n", result.name, result.message));
    }
    out.push_str(&format!("  {fail_count} failed, {warn_count} warnings\n"));
    out
}
