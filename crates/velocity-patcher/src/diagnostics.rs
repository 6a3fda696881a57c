// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patch diagnostics.
//!
//! Every module the interceptor rewrites produces a [`PatchReport`]. Reports
//! are logged and kept in a bounded history so a broken patch after a host
//! update can be attributed to a specific rule.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};
use velocity_core::ModuleId;

use crate::rewriter::{ReplacementLog, ReplacementStatus, RuleReport, RuleStatus};
use crate::rule::RuleId;

/// The patching record for one module.
#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub module: ModuleId,
    pub rules: Vec<RuleReport>,
    pub log: Vec<ReplacementLog>,
    /// Set when the rewritten module failed to compile and the raw factory
    /// was used instead.
    pub fell_back: Option<String>,
}

impl PatchReport {
    pub fn has_failures(&self) -> bool {
        self.fell_back.is_some() || self.rules.iter().any(|r| r.status.is_failure())
    }
}

/// Receives patch reports.
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, report: PatchReport);
}

/// Logs reports and keeps the most recent ones.
#[derive(Debug)]
pub struct PatchDiagnostics {
    history: Mutex<VecDeque<PatchReport>>,
    limit: usize,
    warn_on_miss: bool,
}

impl PatchDiagnostics {
    pub fn new(limit: usize, warn_on_miss: bool) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            limit: limit.max(1),
            warn_on_miss,
        }
    }

    /// All retained reports, oldest first.
    pub fn reports(&self) -> Vec<PatchReport> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Failed or reverted rules, with the module they failed on.
    pub fn failures(&self) -> Vec<(ModuleId, RuleReport)> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history
            .iter()
            .flat_map(|report| {
                report
                    .rules
                    .iter()
                    .filter(|r| r.status.is_failure())
                    .map(|r| (report.module.clone(), r.clone()))
            })
            .collect()
    }

    /// Failures of rules owned by `owner`.
    pub fn failures_for_owner(&self, owner: &str) -> Vec<(ModuleId, RuleReport)> {
        self.failures()
            .into_iter()
            .filter(|(_, r)| r.owner == owner)
            .collect()
    }

    /// The most recent report for `module`.
    pub fn report_for(&self, module: &ModuleId) -> Option<PatchReport> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().find(|r| &r.module == module).cloned()
    }

    /// Ids of every rule that ran against at least one module.
    pub fn rules_seen(&self) -> Vec<RuleId> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen: Vec<RuleId> = history
            .iter()
            .flat_map(|r| r.rules.iter().map(|rule| rule.rule))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }

    fn log(&self, report: &PatchReport) {
        for rule in &report.rules {
            match &rule.status {
                RuleStatus::Failed { replacement, reverted } => {
                    if self.warn_on_miss && !rule.no_warn {
                        warn!(
                            module = %report.module,
                            rule = %rule.rule,
                            plugin = %rule.owner,
                            find = %rule.find,
                            replacement,
                            reverted,
                            "patch had no effect"
                        );
                    } else {
                        debug!(module = %report.module, rule = %rule.rule, plugin = %rule.owner, "patch had no effect");
                    }
                }
                RuleStatus::Reverted { reason } => warn!(
                    module = %report.module,
                    rule = %rule.rule,
                    plugin = %rule.owner,
                    %reason,
                    "patch broke the module and was reverted"
                ),
                _ => {}
            }
        }

        for entry in &report.log {
            if entry.status == ReplacementStatus::Missed {
                debug!(module = %report.module, rule = %entry.rule, replacement = entry.replacement, "replacement missed");
            }
        }

        if let Some(reason) = &report.fell_back {
            warn!(module = %report.module, %reason, "patched module failed to compile, using original");
        }
    }
}

impl Default for PatchDiagnostics {
    fn default() -> Self {
        Self::new(4096, true)
    }
}

impl DiagnosticsSink for PatchDiagnostics {
    fn record(&self, report: PatchReport) {
        self.log(&report);
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() == self.limit {
            history.pop_front();
        }
        history.push_back(report);
    }
}
