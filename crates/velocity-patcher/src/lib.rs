// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patch rules and the source rewriting pipeline.
//!
//! Plugins declare [`PatchDef`]s: a cheap literal `find` token plus an
//! ordered list of regex replacements. The [`RuleBook`] compiles them into
//! immutable [`PatchRule`]s in registration order and indexes them by token;
//! the [`PatchRewriter`] applies the applicable rules to one module's source
//! as a pipeline, isolating failures per rule.

pub mod book;
pub mod diagnostics;
pub mod pattern;
pub mod rewriter;
pub mod rule;
pub mod template;

pub use book::RuleBook;
pub use diagnostics::{DiagnosticsSink, PatchDiagnostics, PatchReport};
pub use pattern::{canonicalize, PatchPattern, IDENTIFIER_CLASS};
pub use rewriter::{
    PatchRewriter, ReplacementLog, ReplacementStatus, RewriteOutcome, RuleReport, RuleStatus,
};
pub use rule::{
    parse_patch_file, Gate, PatchDef, PatchRule, Replace, ReplaceFn, Replacement, ReplacementDef,
    RuleId,
};
pub use template::MatchGroups;
