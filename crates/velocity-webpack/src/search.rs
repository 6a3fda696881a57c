// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend for the developer search tool and for re-running a single patch
//! rule against a live module.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;
use velocity_core::{ModuleId, VelocityError};
use velocity_patcher::{PatchRewriter, PatchRule, RewriteOutcome};

use crate::filter::Filter;
use crate::registry::{ModuleRecord, ModuleRegistry};

/// What the search inputs describe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchKind {
    /// Each input is a substring of the module source.
    #[default]
    Code,
    /// Each input is a comma-separated list of exported property names.
    Props,
    /// Each input is a substring of an exported component's render function.
    ComponentByCode,
    /// The first input is a module id.
    ModuleId,
}

/// Result of a search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Every input was blank.
    NoInput,
    NotFound,
    /// More than one module matched.
    MultipleModules(usize),
    Found { id: ModuleId, source: Arc<str> },
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchOutcome::NoInput => f.write_str("nothing to search for"),
            SearchOutcome::NotFound => f.write_str("no modules found"),
            SearchOutcome::MultipleModules(n) => write!(f, "{n} modules found, be more specific"),
            SearchOutcome::Found { id, .. } => write!(f, "found module {id}"),
        }
    }
}

fn build_filters(kind: SearchKind, inputs: &[&str]) -> Vec<Filter> {
    match kind {
        SearchKind::Code => inputs.iter().map(|q| Filter::by_code([*q])).collect(),
        SearchKind::ComponentByCode => inputs
            .iter()
            .map(|q| Filter::component_by_code([*q]))
            .collect(),
        SearchKind::Props => inputs
            .iter()
            .filter_map(|q| {
                let props: Vec<&str> = q.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
                (!props.is_empty()).then(|| Filter::by_props(props))
            })
            .collect(),
        SearchKind::ModuleId => Vec::new(),
    }
}

/// Modules matching every input, in definition order.
///
/// Code searches look at every defined module, executed or not. The other
/// kinds need exports and only see executed modules.
pub fn find_matches(registry: &ModuleRegistry, kind: SearchKind, inputs: &[&str]) -> Vec<ModuleRecord> {
    let inputs: Vec<&str> = inputs.iter().map(|q| q.trim()).filter(|q| !q.is_empty()).collect();

    if kind == SearchKind::ModuleId {
        return inputs
            .first()
            .and_then(|raw| registry.get(&ModuleId::parse(raw)))
            .into_iter()
            .collect();
    }

    let filters = build_filters(kind, &inputs);
    if filters.is_empty() {
        return Vec::new();
    }

    registry
        .records()
        .into_iter()
        .filter(|record| {
            filters.iter().all(|filter| match filter {
                Filter::Code(_) => filter.matches_source(&record.source),
                _ => record
                    .exports
                    .as_ref()
                    .is_some_and(|exports| filter.select(&record.source, exports).is_some()),
            })
        })
        .collect()
}

/// Run a search and reduce it to a single outcome.
pub fn search(registry: &ModuleRegistry, kind: SearchKind, inputs: &[&str]) -> SearchOutcome {
    if inputs.iter().all(|q| q.trim().is_empty()) {
        return SearchOutcome::NoInput;
    }
    let mut matches = find_matches(registry, kind, inputs);
    let outcome = match matches.len() {
        0 => SearchOutcome::NotFound,
        1 => {
            let record = matches.remove(0);
            SearchOutcome::Found {
                id: record.id,
                source: record.source,
            }
        }
        n => SearchOutcome::MultipleModules(n),
    };
    debug!(%kind, ?inputs, %outcome, "search finished");
    outcome
}

/// Apply one rule to a module's original source and report what matched.
///
/// Nothing is installed: this only shows whether the rule still fits the
/// current host build.
pub fn rerun_rule(
    registry: &ModuleRegistry,
    rule: &PatchRule,
    module: &ModuleId,
) -> Result<RewriteOutcome, VelocityError> {
    let record = registry.get(module).ok_or_else(|| VelocityError::NotFound {
        request: format!("module {module}"),
    })?;
    Ok(PatchRewriter::new().rewrite(&record.source, std::slice::from_ref(rule)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocity_core::{ExportValue, HostObject, ModuleFactory};
    use velocity_patcher::{PatchDef, RuleId, RuleStatus};

    fn registry() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        let modules = [
            (1, "getUser(e){} getAvatarURL(e){}", true),
            (2, "getChannel(e){} getAvatarURL(e){}", false),
            (3, "openModal(e){}", true),
        ];
        for (id, source, executed) in modules {
            let id = ModuleId::Numeric(id);
            let exports: ExportValue = HostObject::builder()
                .member("getUser", "x")
                .member("getAvatarURL", "y")
                .build()
                .into();
            registry.insert(ModuleRecord::intercepted(
                id.clone(),
                Arc::from(source),
                ModuleFactory::exporting(exports.clone()),
            ));
            if executed {
                registry.publish(&id, &exports);
            }
        }
        registry
    }

    #[test]
    fn blank_inputs_are_no_input() {
        assert!(matches!(
            search(&registry(), SearchKind::Code, &["", "  "]),
            SearchOutcome::NoInput
        ));
    }

    #[test]
    fn code_search_sees_unexecuted_modules() {
        let reg = registry();
        let outcome = search(&reg, SearchKind::Code, &["getAvatarURL"]);
        assert!(matches!(outcome, SearchOutcome::MultipleModules(2)));
        assert_eq!(outcome.to_string(), "2 modules found, be more specific");

        match search(&reg, SearchKind::Code, &["getAvatarURL", "getChannel"]) {
            SearchOutcome::Found { id, .. } => assert_eq!(id, ModuleId::Numeric(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn props_search_splits_on_commas() {
        let reg = registry();
        let outcome = search(&reg, SearchKind::Props, &["getUser, getAvatarURL"]);
        assert!(matches!(outcome, SearchOutcome::MultipleModules(2)));
        assert!(matches!(
            search(&reg, SearchKind::Props, &["nothing"]),
            SearchOutcome::NotFound
        ));
    }

    #[test]
    fn module_id_search() {
        let reg = registry();
        assert!(matches!(
            search(&reg, SearchKind::ModuleId, &["3"]),
            SearchOutcome::Found { .. }
        ));
        assert!(matches!(
            search(&reg, SearchKind::ModuleId, &["99"]),
            SearchOutcome::NotFound
        ));
        assert_eq!("component_by_code".parse::<SearchKind>().unwrap(), SearchKind::ComponentByCode);
    }

    #[test]
    fn rerun_reports_match_counts() {
        let reg = registry();
        let def = PatchDef::new("getAvatarURL").replace("getAvatarURL", "getAvatarURL_patched");
        let rule = PatchRule::compile(RuleId(0), "Test", &def).unwrap();

        let outcome = rerun_rule(&reg, &rule, &ModuleId::Numeric(2)).unwrap();
        assert_eq!(outcome.matched(RuleId(0)), 1);
        assert!(matches!(outcome.rules[0].status, RuleStatus::Applied));

        assert!(rerun_rule(&reg, &rule, &ModuleId::Numeric(9)).is_err());
    }
}
