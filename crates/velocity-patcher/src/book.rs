// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registered patch rules, indexed by their `find` token.
//!
//! Every module source in the host bundle is tested against every token, so
//! the pre-filter is a plain substring check per distinct token; the regex
//! work only happens for rules whose token is present.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;
use velocity_core::VelocityError;

use crate::rule::{PatchDef, PatchRule, RuleId};

/// Rules in registration order plus a token index.
#[derive(Debug, Default)]
pub struct RuleBook {
    next_id: u64,
    rules: Vec<Arc<PatchRule>>,
    by_token: HashMap<String, Vec<RuleId>>,
    retired: BTreeSet<RuleId>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register one patch for `owner`.
    pub fn register(&mut self, owner: &str, def: &PatchDef) -> Result<RuleId, VelocityError> {
        let id = RuleId(self.next_id);
        let rule = PatchRule::compile(id, owner, def)?;
        self.next_id += 1;

        self.by_token.entry(rule.find.clone()).or_default().push(id);
        self.rules.push(Arc::new(rule));
        debug!(rule = %id, owner, find = %def.find, "patch rule registered");
        Ok(id)
    }

    /// Register every patch of `owner`, keeping the ones that compile.
    pub fn register_all(&mut self, owner: &str, defs: &[PatchDef]) -> (Vec<RuleId>, Vec<VelocityError>) {
        let mut ids = Vec::with_capacity(defs.len());
        let mut errors = Vec::new();
        for def in defs {
            match self.register(owner, def) {
                Ok(id) => ids.push(id),
                Err(e) => errors.push(e),
            }
        }
        (ids, errors)
    }

    /// Drop every rule owned by `owner`. Returns how many were removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.owner != owner);
        let live: BTreeSet<RuleId> = self.rules.iter().map(|r| r.id).collect();

        for ids in self.by_token.values_mut() {
            ids.retain(|id| live.contains(id));
        }
        self.by_token.retain(|_, ids| !ids.is_empty());
        self.retired.retain(|id| live.contains(id));

        before - self.rules.len()
    }

    /// Stop offering a single-use rule after it patched a module.
    pub fn retire(&mut self, id: RuleId) {
        self.retired.insert(id);
    }

    pub fn is_retired(&self, id: RuleId) -> bool {
        self.retired.contains(&id)
    }

    /// Live rules whose token occurs in `source`, in registration order.
    pub fn candidates(&self, source: &str) -> Vec<Arc<PatchRule>> {
        let mut ids: Vec<RuleId> = self
            .by_token
            .iter()
            .filter(|(token, _)| source.contains(token.as_str()))
            .flat_map(|(_, ids)| ids.iter().copied())
            .filter(|id| !self.retired.contains(id))
            .collect();
        ids.sort_unstable();

        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn get(&self, id: RuleId) -> Option<Arc<PatchRule>> {
        // Rules are appended in id order, so the list is sorted by id.
        self.rules
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| Arc::clone(&self.rules[i]))
    }

    /// Rules owned by `owner`, in registration order.
    pub fn owned_by(&self, owner: &str) -> Vec<Arc<PatchRule>> {
        self.rules.iter().filter(|r| r.owner == owner).cloned().collect()
    }

    pub fn rules(&self) -> &[Arc<PatchRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(find: &str) -> PatchDef {
        PatchDef::new(find).replace("x", "y")
    }

    #[test]
    fn candidates_follow_registration_order() {
        let mut book = RuleBook::new();
        let b = book.register("b", &def("beta")).unwrap();
        let a = book.register("a", &def("alpha")).unwrap();
        let b2 = book.register("b", &def("beta")).unwrap();

        let ids: Vec<RuleId> = book
            .candidates("alpha beta")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b, a, b2]);
    }

    #[test]
    fn candidates_require_token_as_literal_substring() {
        let mut book = RuleBook::new();
        book.register("p", &def(".versionHash")).unwrap();
        assert!(book.candidates("xversionHash").is_empty());
        assert_eq!(book.candidates("a.versionHash").len(), 1);
    }

    #[test]
    fn retired_rules_are_not_offered() {
        let mut book = RuleBook::new();
        let id = book.register("p", &def("tok")).unwrap();
        book.retire(id);
        assert!(book.candidates("tok").is_empty());
        assert!(book.get(id).is_some());
    }

    #[test]
    fn remove_owner_drops_rules_and_index_entries() {
        let mut book = RuleBook::new();
        book.register("keep", &def("shared")).unwrap();
        book.register("drop", &def("shared")).unwrap();
        book.register("drop", &def("only-drop")).unwrap();

        assert_eq!(book.remove_owner("drop"), 2);
        assert_eq!(book.len(), 1);
        assert!(book.candidates("only-drop").is_empty());
        assert_eq!(book.candidates("shared").len(), 1);
    }

    #[test]
    fn register_all_keeps_valid_rules() {
        let mut book = RuleBook::new();
        let bad = PatchDef::new("tok").replace("(", "y");
        let (ids, errors) = book.register_all("p", &[def("tok"), bad, def("tok2")]);
        assert_eq!(ids.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(book.owned_by("p").len(), 2);
    }
}
