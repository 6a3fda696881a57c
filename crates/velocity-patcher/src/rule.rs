// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patch rule definitions.
//!
//! [`PatchDef`] is what a plugin declares; [`PatchRule`] is the compiled,
//! immutable form the rewriter runs. Compilation canonicalizes patterns and
//! substitutes `$self` so that a broken pattern is reported at plugin
//! registration instead of during module interception.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use velocity_core::VelocityError;

use crate::pattern::PatchPattern;
use crate::template::{self, MatchGroups, SELF_TOKEN};

/// Registration sequence number of a compiled rule.
///
/// Ids increase with registration, so sorting by id yields registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A runtime gate evaluated right before a rule or replacement is applied.
#[derive(Clone)]
pub struct Gate(Arc<dyn Fn() -> bool + Send + Sync>);

impl Gate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn allows(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Gate(..)")
    }
}

/// A function replacement. It must be pure: the same groups give the same text.
#[derive(Clone)]
pub struct ReplaceFn(Arc<dyn Fn(&MatchGroups<'_>) -> String + Send + Sync>);

impl ReplaceFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MatchGroups<'_>) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, groups: &MatchGroups<'_>) -> String {
        (self.0)(groups)
    }
}

impl fmt::Debug for ReplaceFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplaceFn(..)")
    }
}

/// Replacement text or function.
#[derive(Debug, Clone)]
pub enum Replace {
    Text(String),
    With(ReplaceFn),
}

/// One declared substitution.
#[derive(Debug, Clone)]
pub struct ReplacementDef {
    /// Raw or `/literal/flags` pattern; `\i` matches a minified identifier.
    pub pattern: String,
    pub replace: Replace,
    /// A miss on an optional replacement is not a rule failure.
    pub optional: bool,
    pub predicate: Option<Gate>,
}

impl ReplacementDef {
    pub fn text(pattern: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replace: Replace::Text(replace.into()),
            optional: false,
            predicate: None,
        }
    }

    pub fn with_fn<F>(pattern: impl Into<String>, f: F) -> Self
    where
        F: Fn(&MatchGroups<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            replace: Replace::With(ReplaceFn::new(f)),
            optional: false,
            predicate: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn when<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Gate::new(f));
        self
    }
}

/// A patch as a plugin declares it.
#[derive(Debug, Clone)]
pub struct PatchDef {
    /// Literal substring a module's source must contain for the rule to run.
    pub find: String,
    pub replacements: Vec<ReplacementDef>,
    /// Keep applying to every module containing `find`, not just the first.
    pub all: bool,
    /// Do not warn when a replacement misses.
    pub no_warn: bool,
    /// A required miss reverts every replacement of this rule.
    pub group: bool,
    /// Defer rewriting until the factory is first invoked.
    pub lazy: bool,
    pub predicate: Option<Gate>,
}

impl PatchDef {
    pub fn new(find: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacements: Vec::new(),
            all: false,
            no_warn: false,
            group: false,
            lazy: false,
            predicate: None,
        }
    }

    pub fn replacement(mut self, replacement: ReplacementDef) -> Self {
        self.replacements.push(replacement);
        self
    }

    /// Shorthand for a required text replacement.
    pub fn replace(self, pattern: impl Into<String>, replace: impl Into<String>) -> Self {
        self.replacement(ReplacementDef::text(pattern, replace))
    }

    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }

    pub fn no_warn(mut self) -> Self {
        self.no_warn = true;
        self
    }

    pub fn group(mut self) -> Self {
        self.group = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn when<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Gate::new(f));
        self
    }
}

/// A compiled replacement.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub pattern: PatchPattern,
    pub replace: Replace,
    pub optional: bool,
    pub predicate: Option<Gate>,
}

/// A compiled, immutable patch rule.
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub id: RuleId,
    pub owner: String,
    pub find: String,
    pub replacements: Vec<Replacement>,
    pub all: bool,
    pub no_warn: bool,
    pub group: bool,
    pub lazy: bool,
    pub predicate: Option<Gate>,
    /// What `$self` expands to for this rule's owner.
    pub self_ref: String,
}

impl PatchRule {
    /// Compile a declared patch for `owner`.
    ///
    /// Fails on an empty `find` token, a rule without replacements, or any
    /// pattern that does not compile.
    pub fn compile(id: RuleId, owner: &str, def: &PatchDef) -> Result<Self, VelocityError> {
        if def.find.is_empty() {
            return Err(VelocityError::Config(format!(
                "patch by {owner}: find token must not be empty"
            )));
        }
        if def.replacements.is_empty() {
            return Err(VelocityError::Config(format!(
                "patch by {owner} (find: {}): at least one replacement is required",
                def.find
            )));
        }

        let self_ref = template::self_reference(owner);
        let replacements = def
            .replacements
            .iter()
            .map(|r| {
                let replace = match &r.replace {
                    Replace::Text(text) => Replace::Text(text.replace(SELF_TOKEN, &self_ref)),
                    Replace::With(f) => Replace::With(f.clone()),
                };
                Ok(Replacement {
                    pattern: PatchPattern::parse(&r.pattern)?,
                    replace,
                    optional: r.optional,
                    predicate: r.predicate.clone(),
                })
            })
            .collect::<Result<Vec<_>, VelocityError>>()?;

        Ok(Self {
            id,
            owner: owner.to_string(),
            find: def.find.clone(),
            replacements,
            all: def.all,
            no_warn: def.no_warn,
            group: def.group,
            lazy: def.lazy,
            predicate: def.predicate.clone(),
            self_ref,
        })
    }
}

/// Intermediate TOML deserialization struct for a patch file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchFile {
    #[serde(default)]
    patch: Vec<PatchSection>,
}

/// One `[[patch]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchSection {
    find: String,
    #[serde(default)]
    all: bool,
    #[serde(default)]
    no_warn: bool,
    #[serde(default)]
    group: bool,
    #[serde(default)]
    lazy: bool,
    #[serde(default)]
    replacement: Vec<ReplacementSection>,
}

/// One `[[patch.replacement]]` entry.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReplacementSection {
    #[serde(rename = "match")]
    pattern: String,
    replace: String,
    #[serde(default)]
    optional: bool,
}

/// Parse declarative text patches from TOML.
///
/// Used to re-run patches offline against captured source snapshots.
/// Function replacements and gates cannot be expressed in TOML.
pub fn parse_patch_file(toml_content: &str) -> Result<Vec<PatchDef>, VelocityError> {
    let file: PatchFile = toml::from_str(toml_content)
        .map_err(|e| VelocityError::Config(format!("invalid patch file: {e}")))?;

    Ok(file
        .patch
        .into_iter()
        .map(|section| PatchDef {
            find: section.find,
            replacements: section
                .replacement
                .into_iter()
                .map(|r| ReplacementDef {
                    pattern: r.pattern,
                    replace: Replace::Text(r.replace),
                    optional: r.optional,
                    predicate: None,
                })
                .collect(),
            all: section.all,
            no_warn: section.no_warn,
            group: section.group,
            lazy: section.lazy,
            predicate: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_substitutes_self_reference() {
        let def = PatchDef::new("this.renderChannelButtons()").replace(
            r"this.renderChannelButtons\(\)",
            "this.renderChannelButtons(), $self.renderVoiceSettings()",
        );
        let rule = PatchRule::compile(RuleId(0), "VcPanelSettings", &def).unwrap();
        match &rule.replacements[0].replace {
            Replace::Text(t) => assert_eq!(
                t,
                r#"this.renderChannelButtons(), Velocity.Plugins.plugins["VcPanelSettings"].renderVoiceSettings()"#
            ),
            Replace::With(_) => panic!("expected text replacement"),
        }
    }

    #[test]
    fn compile_rejects_empty_find() {
        let def = PatchDef::new("").replace("a", "b");
        let err = PatchRule::compile(RuleId(0), "p", &def).unwrap_err();
        assert!(err.to_string().contains("find token must not be empty"));
    }

    #[test]
    fn compile_rejects_rule_without_replacements() {
        let err = PatchRule::compile(RuleId(0), "p", &PatchDef::new("token")).unwrap_err();
        assert!(err.to_string().contains("at least one replacement"));
    }

    #[test]
    fn compile_reports_bad_pattern() {
        let def = PatchDef::new("token").replace("(unclosed", "x");
        let err = PatchRule::compile(RuleId(0), "p", &def).unwrap_err();
        assert!(matches!(err, VelocityError::InvalidPattern { .. }));
    }

    #[test]
    fn parse_patch_file_reads_replacements_in_order() {
        let toml = r#"
[[patch]]
find = '"call_ringing_beat"'
all = true

[[patch.replacement]]
match = '500!==\i\(\)\.random\(1,1e3\)'
replace = "false"

[[patch.replacement]]
match = '/call_ringing/g'
replace = "$&_override"
optional = true
"#;
        let defs = parse_patch_file(toml).unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs[0].all);
        assert_eq!(defs[0].replacements.len(), 2);
        assert!(!defs[0].replacements[0].optional);
        assert!(defs[0].replacements[1].optional);
        assert_eq!(defs[0].replacements[1].pattern, "/call_ringing/g");
    }

    #[test]
    fn parse_patch_file_rejects_unknown_keys() {
        let toml = r#"
[[patch]]
find = "x"
fnid = "typo"
"#;
        assert!(parse_patch_file(toml).is_err());
    }
}
