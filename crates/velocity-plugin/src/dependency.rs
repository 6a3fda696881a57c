// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Start order and dependency closure for plugins.
//!
//! Ordering uses Kahn's algorithm. Ties are broken by registration order so
//! the result is stable from run to run.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use velocity_core::VelocityError;

use crate::manifest::PluginManifest;

/// Add every transitive dependency of `enabled` to the set.
///
/// Returns the names that were pulled in only because something depends on
/// them. Fails on a dependency that is not registered.
pub fn enable_dependencies(
    manifests: &[&PluginManifest],
    enabled: &mut BTreeSet<String>,
) -> Result<Vec<String>, VelocityError> {
    let by_name: HashMap<&str, &PluginManifest> =
        manifests.iter().map(|m| (m.name.as_str(), *m)).collect();

    let mut forced = Vec::new();
    let mut queue: VecDeque<String> = enabled.iter().cloned().collect();
    while let Some(name) = queue.pop_front() {
        let Some(manifest) = by_name.get(name.as_str()) else {
            continue;
        };
        for dep in &manifest.dependencies {
            if !by_name.contains_key(dep.as_str()) {
                return Err(VelocityError::MissingDependency {
                    plugin: name.clone(),
                    dependency: dep.clone(),
                });
            }
            if enabled.insert(dep.clone()) {
                forced.push(dep.clone());
                queue.push_back(dep.clone());
            }
        }
    }
    Ok(forced)
}

/// Order `manifests` so every plugin comes after its dependencies.
pub fn resolve_start_order(manifests: &[&PluginManifest]) -> Result<Vec<String>, VelocityError> {
    let position: HashMap<&str, usize> = manifests
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    // in_degree[i] = dependencies of plugin i that must start first.
    let mut in_degree = vec![0usize; manifests.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); manifests.len()];

    for (i, manifest) in manifests.iter().enumerate() {
        for dep in &manifest.dependencies {
            let Some(&d) = position.get(dep.as_str()) else {
                return Err(VelocityError::MissingDependency {
                    plugin: manifest.name.clone(),
                    dependency: dep.clone(),
                });
            };
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    // A sorted set keeps the ready list in registration order.
    let mut ready: BTreeSet<usize> = (0..manifests.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(manifests.len());

    while let Some(i) = ready.pop_first() {
        order.push(manifests[i].name.clone());
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != manifests.len() {
        let started: HashSet<&str> = order.iter().map(String::as_str).collect();
        let in_cycle: Vec<&str> = manifests
            .iter()
            .map(|m| m.name.as_str())
            .filter(|n| !started.contains(n))
            .collect();
        return Err(VelocityError::DependencyCycle(in_cycle.join(", ")));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(name: &str, deps: &[&str]) -> PluginManifest {
        deps.iter()
            .fold(PluginManifest::new(name, ""), |m, d| m.depends_on(*d))
    }

    #[test]
    fn independent_plugins_keep_registration_order() {
        let (c, a, b) = (plugin("c", &[]), plugin("a", &[]), plugin("b", &[]));
        let order = resolve_start_order(&[&c, &a, &b]).unwrap();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn dependencies_start_first() {
        let ui = plugin("ui", &["api"]);
        let api = plugin("api", &["core"]);
        let core = plugin("core", &[]);
        let order = resolve_start_order(&[&ui, &api, &core]).unwrap();
        assert_eq!(order, vec!["core", "api", "ui"]);
    }

    #[test]
    fn diamond() {
        let d = plugin("d", &["b", "c"]);
        let b = plugin("b", &["a"]);
        let c = plugin("c", &["a"]);
        let a = plugin("a", &[]);
        let order = resolve_start_order(&[&d, &b, &c, &a]).unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_is_reported() {
        let a = plugin("a", &["b"]);
        let b = plugin("b", &["a"]);
        let solo = plugin("solo", &[]);
        match resolve_start_order(&[&a, &b, &solo]) {
            Err(VelocityError::DependencyCycle(names)) => assert_eq!(names, "a, b"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_is_reported() {
        let a = plugin("a", &["ghost"]);
        assert!(matches!(
            resolve_start_order(&[&a]),
            Err(VelocityError::MissingDependency { .. })
        ));
    }

    #[test]
    fn dependencies_are_force_enabled() {
        let ui = plugin("ui", &["api"]);
        let api = plugin("api", &["core"]);
        let core = plugin("core", &[]);
        let other = plugin("other", &[]);
        let mut enabled: BTreeSet<String> = ["ui".to_string()].into();
        let forced = enable_dependencies(&[&ui, &api, &core, &other], &mut enabled).unwrap();
        assert_eq!(forced, vec!["api", "core"]);
        assert_eq!(enabled.len(), 3);
        assert!(!enabled.contains("other"));
    }
}
