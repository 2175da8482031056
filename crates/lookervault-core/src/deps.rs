use std::collections::{BTreeSet, HashMap};

use lookervault_store::ContentType;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DependencyError {
    #[error("dependency graph has a cycle among the requested content types")]
    Cycle,
}

/// Fixed edge list: `(type, its dependencies)`. Not user-configurable.
///
/// `Folder`'s parent-chain self-reference is deliberately not modeled here —
/// this graph orders content *types* for restoration, and a folder's parent
/// chain is an intra-type ordering concern resolved by the restorer walking
/// folders in depth order, not by this type-level DAG.
const EDGES: &[(ContentType, &[ContentType])] = &[
    (
        ContentType::Dashboard,
        &[ContentType::Folder, ContentType::Look, ContentType::User],
    ),
    (
        ContentType::Look,
        &[ContentType::Folder, ContentType::User, ContentType::LookmlModel],
    ),
    (ContentType::Folder, &[ContentType::User]),
    (
        ContentType::ScheduledPlan,
        &[ContentType::Dashboard, ContentType::Look, ContentType::User],
    ),
    (
        ContentType::Board,
        &[ContentType::Dashboard, ContentType::Look, ContentType::User],
    ),
    (ContentType::Group, &[ContentType::User]),
    (
        ContentType::Role,
        &[ContentType::PermissionSet, ContentType::ModelSet],
    ),
];

fn dependencies_of(content_type: ContentType) -> &'static [ContentType] {
    EDGES
        .iter()
        .find(|(t, _)| *t == content_type)
        .map(|(_, deps)| *deps)
        .unwrap_or(&[])
}

/// Topologically orders a subset of content types so that every type appears
/// after all of its dependencies. Cycle detection is defensive: the fixed
/// edge set is acyclic by construction (see the unit test below).
pub fn topological_order(subset: &[ContentType]) -> Result<Vec<ContentType>, DependencyError> {
    let included: BTreeSet<ContentType> = subset.iter().copied().collect();

    let mut indegree: HashMap<ContentType, usize> = HashMap::new();
    let mut dependents: HashMap<ContentType, Vec<ContentType>> = HashMap::new();
    for &node in &included {
        let deps: Vec<ContentType> = dependencies_of(node)
            .iter()
            .copied()
            .filter(|d| included.contains(d))
            .collect();
        indegree.insert(node, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(node);
        }
    }

    let mut ready: BTreeSet<ContentType> = included
        .iter()
        .copied()
        .filter(|n| indegree[n] == 0)
        .collect();
    let mut order = Vec::with_capacity(included.len());

    while let Some(&node) = ready.iter().next() {
        ready.remove(&node);
        order.push(node);
        if let Some(deps) = dependents.get(&node) {
            for &dependent in deps {
                let entry = indegree.get_mut(&dependent).expect("populated above");
                *entry -= 1;
                if *entry == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != included.len() {
        return Err(DependencyError::Cycle);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(order: &[ContentType], t: ContentType) -> usize {
        order.iter().position(|&x| x == t).unwrap()
    }

    #[test]
    fn full_type_set_is_acyclic() {
        let order = topological_order(&ContentType::ALL).unwrap();
        assert_eq!(order.len(), ContentType::ALL.len());
    }

    #[test]
    fn dependencies_precede_dependents() {
        let order = topological_order(&ContentType::ALL).unwrap();
        assert!(index_of(&order, ContentType::Folder) < index_of(&order, ContentType::Dashboard));
        assert!(index_of(&order, ContentType::User) < index_of(&order, ContentType::Dashboard));
        assert!(index_of(&order, ContentType::Look) < index_of(&order, ContentType::Dashboard));
        assert!(index_of(&order, ContentType::Dashboard) < index_of(&order, ContentType::Board));
        assert!(index_of(&order, ContentType::PermissionSet) < index_of(&order, ContentType::Role));
        assert!(index_of(&order, ContentType::ModelSet) < index_of(&order, ContentType::Role));
    }

    #[test]
    fn restricted_subset_drops_unincluded_dependencies() {
        // Dashboard depends on Folder/Look/User, but none of those are in
        // the subset, so Dashboard should simply have no prerequisites here.
        let order = topological_order(&[ContentType::Dashboard, ContentType::ScheduledPlan]).unwrap();
        assert!(index_of(&order, ContentType::Dashboard) < index_of(&order, ContentType::ScheduledPlan));
    }

    #[test]
    fn empty_subset_yields_empty_order() {
        assert_eq!(topological_order(&[]).unwrap(), Vec::<ContentType>::new());
    }
}
