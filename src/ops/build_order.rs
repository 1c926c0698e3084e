//! Dependency-ordered build sequence.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::core::errors::CrossBuildError;
use crate::core::package::DependencyMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Compute the order packages must be built in.
///
/// Every package reachable from `roots` appears exactly once, after all of
/// its dependencies. An empty `roots` means every package in the map. Roots
/// are visited in sorted order and dependencies in declaration order, so
/// the result is deterministic.
///
/// Fails with [`CrossBuildError::DependencyCycle`] naming the cycle, or
/// [`CrossBuildError::UnknownDependency`] for a dependency missing from the
/// map.
pub fn build_order(map: &DependencyMap, roots: &[String]) -> Result<Vec<String>> {
    let mut roots: Vec<&str> = if roots.is_empty() {
        map.names().collect()
    } else {
        roots.iter().map(String::as_str).collect()
    };
    roots.sort_unstable();
    roots.dedup();

    for root in &roots {
        if !map.contains(root) {
            bail!("package `{}` not found", root);
        }
    }

    let mut state: HashMap<&str, Visit> = HashMap::new();
    let mut order = Vec::new();

    for root in roots {
        if state.contains_key(root) {
            continue;
        }

        // Worklist of (package, index of the next dependency to look at).
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        state.insert(root, Visit::InProgress);

        while let Some(top) = stack.last_mut() {
            let (name, next) = *top;
            top.1 += 1;

            let deps = map.dependencies(name).unwrap_or_default();
            let Some(dep) = deps.get(next) else {
                stack.pop();
                state.insert(name, Visit::Done);
                order.push(name.to_string());
                continue;
            };

            match state.get(dep.as_str()) {
                Some(Visit::Done) => {}
                Some(Visit::InProgress) => {
                    let start = stack
                        .iter()
                        .position(|&(n, _)| n == dep.as_str())
                        .unwrap_or_default();
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|&(n, _)| n.to_string()).collect();
                    cycle.push(dep.clone());
                    return Err(CrossBuildError::DependencyCycle { cycle }.into());
                }
                None => {
                    if !map.contains(dep) {
                        return Err(CrossBuildError::UnknownDependency {
                            package: name.to_string(),
                            dependency: dep.clone(),
                        }
                        .into());
                    }
                    state.insert(dep.as_str(), Visit::InProgress);
                    stack.push((dep.as_str(), 0));
                }
            }
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &[&str])]) -> DependencyMap {
        let mut map = DependencyMap::new();
        for (name, deps) in entries {
            map.insert(*name, deps.iter().map(|d| d.to_string()).collect());
        }
        map
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_dependency_built_first() {
        let map = map(&[("B", &["A"]), ("A", &[])]);
        let order = build_order(&map, &[]).unwrap();
        assert_eq!(order, ["A", "B"]);
    }

    #[test]
    fn test_each_package_once() {
        let map = map(&[
            ("numpy", &["six"]),
            ("pandas", &["numpy", "six", "dateutil"]),
            ("dateutil", &["six"]),
            ("six", &[]),
        ]);
        let order = build_order(&map, &[]).unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, "six") < position(&order, "numpy"));
        assert!(position(&order, "six") < position(&order, "dateutil"));
        assert!(position(&order, "numpy") < position(&order, "pandas"));
        assert!(position(&order, "dateutil") < position(&order, "pandas"));
    }

    #[test]
    fn test_roots_restrict_the_build() {
        let map = map(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        let order = build_order(&map, &["b".to_string()]).unwrap();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn test_unknown_root() {
        let map = map(&[("a", &[])]);
        let err = build_order(&map, &["zzz".to_string()]).unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn test_cycle_detected() {
        let map = map(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        let err = build_order(&map, &[]).unwrap_err();

        match err.downcast_ref::<CrossBuildError>() {
            Some(CrossBuildError::DependencyCycle { cycle }) => {
                assert_eq!(cycle, &["a", "b", "c", "a"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let map = map(&[("a", &["a"])]);
        let err = build_order(&map, &[]).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle detected: a -> a");
    }

    #[test]
    fn test_unknown_dependency() {
        let map = map(&[("b", &["a"])]);
        let err = build_order(&map, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrossBuildError>(),
            Some(CrossBuildError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_diamond_without_cycle() {
        let map = map(&[("top", &["l", "r"]), ("l", &["base"]), ("r", &["base"]), ("base", &[])]);
        let order = build_order(&map, &[]).unwrap();
        assert_eq!(order, ["base", "l", "r", "top"]);
    }

    #[test]
    fn test_empty_map() {
        assert!(build_order(&DependencyMap::new(), &[]).unwrap().is_empty());
    }
}
