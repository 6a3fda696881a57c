// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ordered source rewriting pipeline.
//!
//! Rules run in the order given; every replacement sees the text produced by
//! the replacements and rules before it. A failing rule never stops the rules
//! after it. The rewriter holds no state between calls, so the same rules on
//! the same source always give the same output.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tracing::{trace, warn};
use velocity_core::SourceCompiler;

use crate::rule::{PatchRule, Replace, Replacement, RuleId};
use crate::template::{self, MatchGroups, SELF_TOKEN};

/// What happened to one replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ReplacementStatus {
    Applied,
    /// Zero matches.
    Missed,
    /// Its predicate was false.
    Skipped,
    /// The regex engine gave up (for example, backtracking limit).
    Errored(String),
}

/// One line of the applied log: `(rule, replacement index, matched count)`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplacementLog {
    pub rule: RuleId,
    pub owner: String,
    pub replacement: usize,
    pub matched: usize,
    pub status: ReplacementStatus,
}

/// What happened to one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// At least one replacement changed the text and nothing required missed.
    Applied,
    /// Nothing changed, but nothing required missed either.
    Unchanged,
    /// The rule's gate was false.
    Skipped,
    /// A required replacement missed or errored. Earlier replacements of the
    /// rule are kept unless the rule is grouped.
    Failed { replacement: usize, reverted: bool },
    /// The rule's output did not compile and was undone.
    Reverted { reason: String },
}

impl RuleStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RuleStatus::Failed { .. } | RuleStatus::Reverted { .. })
    }
}

/// Summary of one rule against one module.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: RuleId,
    pub owner: String,
    pub find: String,
    pub no_warn: bool,
    pub status: RuleStatus,
}

/// Result of rewriting one module.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteOutcome {
    pub text: String,
    pub changed: bool,
    pub log: Vec<ReplacementLog>,
    pub rules: Vec<RuleReport>,
}

impl RewriteOutcome {
    /// Rules that failed or were reverted.
    pub fn failures(&self) -> impl Iterator<Item = &RuleReport> {
        self.rules.iter().filter(|r| r.status.is_failure())
    }

    /// Rules whose replacements made it into the final text.
    pub fn applied_rules(&self) -> Vec<RuleId> {
        self.rules
            .iter()
            .filter(|r| matches!(r.status, RuleStatus::Applied))
            .map(|r| r.rule)
            .collect()
    }

    /// Total matches recorded for `rule`.
    pub fn matched(&self, rule: RuleId) -> usize {
        self.log
            .iter()
            .filter(|l| l.rule == rule)
            .map(|l| l.matched)
            .sum()
    }
}

/// Applies patch rules to module source.
#[derive(Clone, Default)]
pub struct PatchRewriter {
    validator: Option<Arc<dyn SourceCompiler>>,
}

impl PatchRewriter {
    /// A rewriter that trusts every rule's output.
    pub fn new() -> Self {
        Self { validator: None }
    }

    /// A rewriter that validates each rule's output with `compiler` and
    /// reverts rules that break the module.
    pub fn with_validator(compiler: Arc<dyn SourceCompiler>) -> Self {
        Self {
            validator: Some(compiler),
        }
    }

    /// Run `rules`, in order, over `source`.
    pub fn rewrite<R>(&self, source: &str, rules: &[R]) -> RewriteOutcome
    where
        R: AsRef<PatchRule>,
    {
        let mut text = source.to_string();
        let mut log = Vec::new();
        let mut reports = Vec::with_capacity(rules.len());

        for rule in rules {
            let rule = rule.as_ref();
            let status = self.apply_rule(rule, &mut text, &mut log);
            reports.push(RuleReport {
                rule: rule.id,
                owner: rule.owner.clone(),
                find: rule.find.clone(),
                no_warn: rule.no_warn,
                status,
            });
        }

        RewriteOutcome {
            changed: text != source,
            text,
            log,
            rules: reports,
        }
    }

    fn apply_rule(&self, rule: &PatchRule, text: &mut String, log: &mut Vec<ReplacementLog>) -> RuleStatus {
        let gate_open = match &rule.predicate {
            Some(gate) => contained(|| gate.allows()),
            None => Ok(true),
        };
        match gate_open {
            Ok(false) => {
                trace!(rule = %rule.id, owner = %rule.owner, "rule gate closed");
                return RuleStatus::Skipped;
            }
            Err(detail) => {
                warn!(rule = %rule.id, owner = %rule.owner, %detail, "rule gate panicked");
                log.push(ReplacementLog {
                    rule: rule.id,
                    owner: rule.owner.clone(),
                    replacement: 0,
                    matched: 0,
                    status: ReplacementStatus::Errored(format!("gate panicked: {detail}")),
                });
                return RuleStatus::Failed {
                    replacement: 0,
                    reverted: true,
                };
            }
            Ok(true) => {}
        }

        let before = text.clone();
        let mut failed = None;
        let mut panicked = false;

        for (index, replacement) in rule.replacements.iter().enumerate() {
            let mut entry = ReplacementLog {
                rule: rule.id,
                owner: rule.owner.clone(),
                replacement: index,
                matched: 0,
                status: ReplacementStatus::Skipped,
            };

            let outcome = match &replacement.predicate {
                Some(gate) => contained(|| gate.allows()).map_err(|d| format!("gate panicked: {d}")),
                None => Ok(true),
            }
            .and_then(|open| {
                if !open {
                    return Ok(None);
                }
                contained(|| apply_replacement(text, replacement, &rule.self_ref))
                    .map(Some)
                    .map_err(|d| format!("replacement panicked: {d}"))
            });

            match outcome {
                Ok(None) => {}
                Ok(Some(Ok((_, 0)))) => {
                    entry.status = ReplacementStatus::Missed;
                    if !replacement.optional {
                        failed.get_or_insert(index);
                    }
                }
                Ok(Some(Ok((next, matched)))) => {
                    *text = next;
                    entry.matched = matched;
                    entry.status = ReplacementStatus::Applied;
                }
                Ok(Some(Err(e))) => {
                    entry.status = ReplacementStatus::Errored(e.to_string());
                    failed.get_or_insert(index);
                }
                Err(detail) => {
                    warn!(rule = %rule.id, owner = %rule.owner, replacement = index, %detail, "plugin code panicked while patching");
                    entry.status = ReplacementStatus::Errored(detail);
                    failed.get_or_insert(index);
                    panicked = true;
                }
            }
            log.push(entry);

            if (rule.group || panicked) && failed.is_some() {
                break;
            }
        }

        if let Some(replacement) = failed {
            let reverted = rule.group || panicked;
            if reverted {
                *text = before;
            }
            return RuleStatus::Failed {
                replacement,
                reverted,
            };
        }

        if *text == before {
            return RuleStatus::Unchanged;
        }

        if let Some(validator) = &self.validator
            && let Err(e) = validator.validate(text)
        {
            *text = before;
            return RuleStatus::Reverted {
                reason: e.to_string(),
            };
        }

        RuleStatus::Applied
    }
}

/// Run plugin-supplied code, turning a panic into its message.
fn contained<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// Apply one replacement, returning the new text and the match count.
fn apply_replacement(
    text: &str,
    replacement: &Replacement,
    self_ref: &str,
) -> Result<(String, usize), fancy_regex::Error> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut matched = 0;

    for caps in replacement.pattern.regex().captures_iter(text) {
        let caps = caps?;
        let Some(groups) = MatchGroups::from_captures(&caps, text) else {
            continue;
        };

        out.push_str(&text[last..groups.before().len()]);
        match &replacement.replace {
            Replace::Text(template) => out.push_str(&template::expand(template, &groups)),
            Replace::With(f) => out.push_str(&f.apply(&groups).replace(SELF_TOKEN, self_ref)),
        }
        last = groups.before().len() + groups.whole().len();
        matched += 1;

        if !replacement.pattern.is_global() {
            break;
        }
    }

    if matched == 0 {
        return Ok((String::new(), 0));
    }
    out.push_str(&text[last..]);
    Ok((out, matched))
}

impl AsRef<PatchRule> for PatchRule {
    fn as_ref(&self) -> &PatchRule {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{PatchDef, ReplacementDef};
    use proptest::prelude::*;
    use velocity_core::{ModuleFactory, ModuleId, VelocityError};

    fn rule(id: u64, owner: &str, def: PatchDef) -> PatchRule {
        PatchRule::compile(RuleId(id), owner, &def).unwrap()
    }

    #[test]
    fn injects_into_children_array() {
        let r = rule(
            0,
            "Speaking",
            PatchDef::new("ACCOUNT_SPEAKING").replace(r"/children:\[/", "children:[INJECTED,"),
        );
        let source = "ACCOUNT_SPEAKING...buttons,children:[A,B]...";
        let out = PatchRewriter::new().rewrite(source, &[&r]);
        assert_eq!(out.text, "ACCOUNT_SPEAKING...buttons,children:[INJECTED,A,B]...");
        assert!(out.changed);
        assert_eq!(out.matched(RuleId(0)), 1);

        // Rewriting the original again injects once, not twice.
        let again = PatchRewriter::new().rewrite(source, &[&r]);
        assert_eq!(again.text, out.text);
    }

    #[test]
    fn non_global_replaces_first_match_only() {
        let r = rule(0, "p", PatchDef::new("x").replace("a", "b"));
        assert_eq!(PatchRewriter::new().rewrite("aaa", &[&r]).text, "baa");

        let g = rule(1, "p", PatchDef::new("x").replace("/a/g", "b"));
        let out = PatchRewriter::new().rewrite("aaa", &[&g]);
        assert_eq!(out.text, "bbb");
        assert_eq!(out.log[0].matched, 3);
    }

    #[test]
    fn later_rules_see_earlier_output() {
        let r1 = rule(0, "first", PatchDef::new("start").replace("start", "start MARKER"));
        let r2 = rule(1, "second", PatchDef::new("start").replace("MARKER", "DONE"));

        let forward = PatchRewriter::new().rewrite("start", &[&r1, &r2]);
        assert_eq!(forward.text, "start DONE");
        assert!(forward.failures().next().is_none());

        let reversed = PatchRewriter::new().rewrite("start", &[&r2, &r1]);
        assert_eq!(reversed.text, "start MARKER");
        let failure = reversed.failures().next().unwrap();
        assert_eq!(failure.rule, RuleId(1));
        assert_eq!(
            failure.status,
            RuleStatus::Failed {
                replacement: 0,
                reverted: false
            }
        );
    }

    #[test]
    fn required_miss_keeps_earlier_replacements_unless_grouped() {
        let def = PatchDef::new("a")
            .replace("a", "A")
            .replace("missing", "x")
            .replace("b", "B");
        let r = rule(0, "p", def.clone());
        let out = PatchRewriter::new().rewrite("ab", &[&r]);
        assert_eq!(out.text, "AB");
        assert!(matches!(out.rules[0].status, RuleStatus::Failed { replacement: 1, .. }));

        let grouped = rule(1, "p", def.group());
        let out = PatchRewriter::new().rewrite("ab", &[&grouped]);
        assert_eq!(out.text, "ab");
        assert_eq!(
            out.rules[0].status,
            RuleStatus::Failed {
                replacement: 1,
                reverted: true
            }
        );
    }

    #[test]
    fn failing_rule_does_not_stop_later_rules() {
        let broken = rule(0, "broken", PatchDef::new("x").replace("nope", "y"));
        let fine = rule(1, "fine", PatchDef::new("x").replace("x", "z"));
        let out = PatchRewriter::new().rewrite("x", &[&broken, &fine]);
        assert_eq!(out.text, "z");
        assert_eq!(out.applied_rules(), vec![RuleId(1)]);
    }

    #[test]
    fn optional_miss_is_not_a_failure() {
        let def = PatchDef::new("x")
            .replacement(ReplacementDef::text("nope", "y").optional())
            .replace("x", "z");
        let out = PatchRewriter::new().rewrite("x", &[&rule(0, "p", def)]);
        assert_eq!(out.rules[0].status, RuleStatus::Applied);
        assert_eq!(out.log[0].status, ReplacementStatus::Missed);
    }

    #[test]
    fn gates_skip_rules_and_replacements() {
        let closed = rule(0, "p", PatchDef::new("x").replace("x", "y").when(|| false));
        let out = PatchRewriter::new().rewrite("x", &[&closed]);
        assert_eq!(out.rules[0].status, RuleStatus::Skipped);
        assert_eq!(out.text, "x");

        let def = PatchDef::new("x")
            .replacement(ReplacementDef::text("x", "y").when(|| false))
            .replace("x", "z");
        let out = PatchRewriter::new().rewrite("x", &[&rule(1, "p", def)]);
        assert_eq!(out.text, "z");
        assert_eq!(out.log[0].status, ReplacementStatus::Skipped);
    }

    #[test]
    fn function_replacement_receives_groups_and_self() {
        let def = PatchDef::new("buildLayout").replacement(ReplacementDef::with_fn(
            r"(\i)\.buildLayout\(\)(?=\.map)",
            |g| format!("$self.buildLayout({})", g.group(1)),
        ));
        let out = PatchRewriter::new().rewrite("n.buildLayout().map(f)", &[&rule(0, "Settings", def)]);
        assert_eq!(
            out.text,
            r#"Velocity.Plugins.plugins["Settings"].buildLayout(n).map(f)"#
        );
    }

    struct RejectsMarker;

    impl SourceCompiler for RejectsMarker {
        fn validate(&self, source: &str) -> Result<(), VelocityError> {
            if source.contains("BROKEN") {
                Err(VelocityError::Internal("unexpected token".into()))
            } else {
                Ok(())
            }
        }

        fn compile(
            &self,
            _id: &ModuleId,
            _source: Arc<str>,
            raw: &ModuleFactory,
        ) -> Result<ModuleFactory, VelocityError> {
            Ok(raw.clone())
        }
    }

    #[test]
    fn validator_reverts_rule_that_breaks_module() {
        let breaks = rule(0, "bad", PatchDef::new("x").replace("x", "x BROKEN"));
        let fine = rule(1, "good", PatchDef::new("x").replace("x", "y"));
        let rewriter = PatchRewriter::with_validator(Arc::new(RejectsMarker));
        let out = rewriter.rewrite("x", &[&breaks, &fine]);
        assert_eq!(out.text, "y");
        assert!(matches!(out.rules[0].status, RuleStatus::Reverted { .. }));
        assert_eq!(out.rules[1].status, RuleStatus::Applied);
    }

    #[test]
    fn panicking_plugin_code_fails_only_its_rule() {
        let replace_panics = rule(
            0,
            "Crashy",
            PatchDef::new("needle")
                .replace("needle", "needle!")
                .replacement(ReplacementDef::with_fn("needle", |_| panic!("replace exploded"))),
        );
        let gate_panics = rule(1, "Crashy", PatchDef::new("needle").replace("needle", "x").when(|| panic!("gate exploded")));
        let item_gate_panics = rule(
            2,
            "Crashy",
            PatchDef::new("needle").replacement(ReplacementDef::text("needle", "x").when(|| panic!("item gate exploded"))),
        );
        let fine = rule(3, "Fine", PatchDef::new("needle").replace("needle", "pin"));

        let out = PatchRewriter::new().rewrite("needle", &[&replace_panics, &gate_panics, &item_gate_panics, &fine]);
        assert_eq!(out.text, "pin");
        assert_eq!(
            out.rules[0].status,
            RuleStatus::Failed {
                replacement: 1,
                reverted: true
            }
        );
        assert!(matches!(out.rules[1].status, RuleStatus::Failed { reverted: true, .. }));
        assert!(matches!(out.rules[2].status, RuleStatus::Failed { reverted: true, .. }));
        assert_eq!(out.rules[3].status, RuleStatus::Applied);
        assert!(out.log.iter().any(|l| matches!(&l.status, ReplacementStatus::Errored(d) if d.contains("replace exploded"))));
    }

    proptest! {
        #[test]
        fn rewriting_is_deterministic(prefix in "[a-z ,\\[\\]]{0,40}", suffix in "[a-z ,\\[\\]]{0,40}") {
            let r = rule(0, "p", PatchDef::new("children").replace(r"/children:\[/g", "children:[X,"));
            let source = format!("{prefix}children:[{suffix}");
            let rewriter = PatchRewriter::new();
            let once = rewriter.rewrite(&source, &[&r]);
            let twice = rewriter.rewrite(&source, &[&r]);
            prop_assert_eq!(&once.text, &twice.text);
            prop_assert_eq!(once.matched(RuleId(0)), twice.matched(RuleId(0)));
        }

        #[test]
        fn rules_without_matches_leave_text_untouched(source in "[a-z ]{0,60}") {
            let r = rule(0, "p", PatchDef::new("x").replace("ZZZ", "y"));
            let out = PatchRewriter::new().rewrite(&source, &[&r]);
            prop_assert_eq!(out.text, source);
            prop_assert!(!out.changed);
        }
    }
}
