// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context-menu injection.
//!
//! When the host renders a menu it hands the live item list to
//! [`ContextMenuApi::apply`]. Patches registered for that navigation id, then
//! global patches, mutate the list in place and the host renders whatever
//! they leave behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use velocity_core::{ContextMenuType, ExportValue, VelocityError};

use crate::boundary::guarded;

/// What a menu entry renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuItemKind {
    #[default]
    Item,
    Checkbox,
    Separator,
    /// A section whose children render together.
    Group,
}

/// One element of a context menu.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Option<String>,
    pub label: Option<String>,
    pub kind: MenuItemKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuItem>,
}

impl MenuItem {
    pub fn item(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn checkbox(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: MenuItemKind::Checkbox,
            ..Self::item(id, label)
        }
    }

    pub fn separator() -> Self {
        Self {
            kind: MenuItemKind::Separator,
            ..Self::default()
        }
    }

    pub fn group(children: Vec<MenuItem>) -> Self {
        Self {
            kind: MenuItemKind::Group,
            children,
            ..Self::default()
        }
    }

    fn id_matches(&self, ids: &[&str], match_substring: bool) -> bool {
        let Some(id) = self.id.as_deref() else {
            return false;
        };
        ids.iter().any(|wanted| {
            if match_substring {
                id.contains(wanted)
            } else {
                id == *wanted
            }
        })
    }
}

/// Index path to the list holding a matching item. Empty means the top list.
fn path_to_group(ids: &[&str], items: &[MenuItem], match_substring: bool) -> Option<Vec<usize>> {
    for (i, item) in items.iter().enumerate() {
        if item.id_matches(ids, match_substring) {
            return Some(Vec::new());
        }
        if !item.children.is_empty()
            && let Some(mut rest) = path_to_group(ids, &item.children, match_substring)
        {
            rest.insert(0, i);
            return Some(rest);
        }
    }
    None
}

/// The list that directly contains an item with one of `ids`.
///
/// The search is depth first, so the first match in render order wins. Use
/// it to insert new entries next to a known sibling.
pub fn find_group_children_by_child_id<'a>(
    ids: &[&str],
    items: &'a mut Vec<MenuItem>,
    match_substring: bool,
) -> Option<&'a mut Vec<MenuItem>> {
    let path = path_to_group(ids, items, match_substring)?;
    let mut list = items;
    for index in path {
        list = &mut list.get_mut(index)?.children;
    }
    Some(list)
}

/// Mutates one menu's items. Receives the menu props as its second argument.
pub type MenuPatch =
    Arc<dyn Fn(&mut Vec<MenuItem>, &ExportValue) -> Result<(), VelocityError> + Send + Sync>;

/// Mutates every menu. Receives the navigation id first.
pub type GlobalMenuPatch =
    Arc<dyn Fn(&str, &mut Vec<MenuItem>, &ExportValue) -> Result<(), VelocityError> + Send + Sync>;

/// Identifies a registered menu patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MenuPatchId(u64);

#[derive(Clone)]
enum Target {
    Nav(String, MenuPatch),
    Global(GlobalMenuPatch),
}

#[derive(Clone)]
struct Entry {
    id: MenuPatchId,
    owner: String,
    target: Target,
}

/// Outcome of rendering one menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuReport {
    pub applied: usize,
    /// Owners whose patch failed. Their changes were rolled back.
    pub failed: Vec<String>,
}

/// Registry of menu patches.
#[derive(Default)]
pub struct ContextMenuApi {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl ContextMenuApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, owner: &str, target: Target) -> MenuPatchId {
        let id = MenuPatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                id,
                owner: owner.to_string(),
                target,
            });
        id
    }

    /// Patch the menu with navigation id `nav_id`.
    ///
    /// Any id the host renders is accepted; [`ContextMenuType`] names the
    /// common ones.
    pub fn add_patch(&self, nav_id: &str, owner: &str, patch: MenuPatch) -> MenuPatchId {
        debug!(plugin = owner, menu = nav_id, "context menu patch added");
        self.push(owner, Target::Nav(nav_id.to_string(), patch))
    }

    pub fn add_menu_patch(&self, menu: ContextMenuType, owner: &str, patch: MenuPatch) -> MenuPatchId {
        self.add_patch(&menu.to_string(), owner, patch)
    }

    /// Patch every menu. Global patches run after the per-menu ones.
    pub fn add_global_patch(&self, owner: &str, patch: GlobalMenuPatch) -> MenuPatchId {
        debug!(plugin = owner, "global context menu patch added");
        self.push(owner, Target::Global(patch))
    }

    pub fn remove_patch(&self, id: MenuPatchId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Drop every patch `owner` added. Returns how many were removed.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.owner != owner);
        before - entries.len()
    }

    pub fn patch_count(&self, nav_id: &str) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| matches!(&e.target, Target::Nav(id, _) if id == nav_id))
            .count()
    }

    /// Run every patch for `nav_id` over `items`.
    ///
    /// A patch that fails or panics is logged and its partial edits are
    /// discarded; the next patch sees the list as it was before.
    pub fn apply(&self, nav_id: &str, items: &mut Vec<MenuItem>, props: &ExportValue) -> MenuReport {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner).clone();
        let (scoped, global): (Vec<Entry>, Vec<Entry>) = entries
            .into_iter()
            .filter(|e| match &e.target {
                Target::Nav(id, _) => id == nav_id,
                Target::Global(_) => true,
            })
            .partition(|e| matches!(e.target, Target::Nav(..)));

        let mut report = MenuReport::default();
        for entry in scoped.iter().chain(global.iter()) {
            let snapshot = items.clone();
            let result = guarded(&entry.owner, "context menu patch", || match &entry.target {
                Target::Nav(_, patch) => patch(items, props),
                Target::Global(patch) => patch(nav_id, items, props),
            });
            match result {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    error!(plugin = %entry.owner, menu = nav_id, error = %e, "context menu patch failed");
                    *items = snapshot;
                    report.failed.push(entry.owner.clone());
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for ContextMenuApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("ContextMenuApi").field("patches", &count).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn user_menu() -> Vec<MenuItem> {
        vec![
            MenuItem::group(vec![
                MenuItem::item("user-profile", "Profile"),
                MenuItem::item("mention", "Mention"),
            ]),
            MenuItem::separator(),
            MenuItem::group(vec![
                MenuItem::item("devmode-copy-id-1234", "Copy User ID"),
                MenuItem::group(vec![MenuItem::checkbox("mute", "Mute")]),
            ]),
        ]
    }

    #[test]
    fn finds_the_list_holding_a_child() {
        let mut menu = user_menu();
        let group = find_group_children_by_child_id(&["mention"], &mut menu, false).unwrap();
        group.push(MenuItem::item("copy-avatar", "Copy Avatar"));
        assert_eq!(menu[0].children.len(), 3);

        let nested = find_group_children_by_child_id(&["mute"], &mut menu, false).unwrap();
        assert_eq!(nested.len(), 1);

        assert!(find_group_children_by_child_id(&["devmode-copy-id"], &mut menu, false).is_none());
        let by_prefix = find_group_children_by_child_id(&["devmode-copy-id"], &mut menu, true).unwrap();
        assert_eq!(by_prefix[0].label.as_deref(), Some("Copy User ID"));
    }

    #[test]
    fn top_level_match_returns_the_root() {
        let mut menu = vec![MenuItem::item("a", "A")];
        let root = find_group_children_by_child_id(&["b", "a"], &mut menu, false).unwrap();
        root.push(MenuItem::item("c", "C"));
        assert_eq!(menu.len(), 2);
    }

    #[test]
    fn scoped_patches_run_before_global_ones() {
        let menus = ContextMenuApi::new();
        menus.add_global_patch(
            "Global",
            Arc::new(|nav, items, _| {
                items.push(MenuItem::item(format!("global-{nav}"), "Global"));
                Ok(())
            }),
        );
        menus.add_menu_patch(
            ContextMenuType::UserContext,
            "Scoped",
            Arc::new(|items, _| {
                items.push(MenuItem::item("scoped", "Scoped"));
                Ok(())
            }),
        );

        let mut items = Vec::new();
        let report = menus.apply("user-context", &mut items, &ExportValue::Undefined);
        assert_eq!(report.applied, 2);
        let ids: Vec<_> = items.iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(ids, vec!["scoped", "global-user-context"]);

        let mut other = Vec::new();
        menus.apply("message", &mut other, &ExportValue::Undefined);
        assert_eq!(other.len(), 1);
    }

    #[traced_test]
    #[test]
    fn failed_patches_roll_back() {
        let menus = ContextMenuApi::new();
        menus.add_patch(
            "message",
            "Half",
            Arc::new(|items, _| {
                items.clear();
                Err(VelocityError::Internal("gave up".into()))
            }),
        );
        menus.add_patch("message", "Panics", Arc::new(|_, _| panic!("render")));
        menus.add_patch(
            "message",
            "Fine",
            Arc::new(|items, _| {
                items.push(MenuItem::separator());
                Ok(())
            }),
        );

        let mut items = user_menu();
        let report = menus.apply("message", &mut items, &ExportValue::Undefined);
        assert_eq!(report.failed, vec!["Half", "Panics"]);
        assert_eq!(items.len(), 4);
        assert!(logs_contain("context menu patch failed"));
    }

    #[test]
    fn owners_can_be_removed() {
        let menus = ContextMenuApi::new();
        let noop: MenuPatch = Arc::new(|_, _| Ok(()));
        let id = menus.add_patch("message", "A", Arc::clone(&noop));
        menus.add_patch("message", "B", Arc::clone(&noop));
        menus.add_patch("user-context", "B", noop);

        assert!(menus.remove_patch(id));
        assert_eq!(menus.remove_owner("B"), 2);
        assert_eq!(menus.patch_count("message"), 0);
    }
}
