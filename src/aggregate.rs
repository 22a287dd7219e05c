//! Bottom-up duration rollups with conflict resolution.
//!
//! A leaf's aggregated duration is its own duration. An internal node's
//! candidate is the sum of its children's aggregated durations; when the
//! node's own stored duration diverges from that candidate by more than
//! `max(20% of the larger value, 2 days)` the divergence is a conflict,
//! resolved per the configured [`ConflictPolicy`] and recorded for
//! observability. Conflicts never fail a mutation.
//!
//! Both full recomputation (post-order over the whole tree, used after
//! validation) and incremental recomputation (a changed node and its
//! ancestor chain) are supported.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::TaskTree;

/// How a divergence between a node's own duration and its children's sum is
/// resolved.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    PreferChildren,
    PreferOwn,
    Average,
    Max,
    Min,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prefer-children" => Ok(ConflictPolicy::PreferChildren),
            "prefer-own" => Ok(ConflictPolicy::PreferOwn),
            "average" => Ok(ConflictPolicy::Average),
            "max" => Ok(ConflictPolicy::Max),
            "min" => Ok(ConflictPolicy::Min),
            other => Err(Error::InvalidArgument(format!(
                "unknown conflict policy '{other}' \
                 (expected prefer-children|prefer-own|average|max|min)"
            ))),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConflictPolicy::PreferChildren => "prefer-children",
            ConflictPolicy::PreferOwn => "prefer-own",
            ConflictPolicy::Average => "average",
            ConflictPolicy::Max => "max",
            ConflictPolicy::Min => "min",
        };
        f.write_str(name)
    }
}

/// One recorded divergence and its resolution.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub task_id: String,
    pub own_duration: u32,
    pub child_sum: u32,
    pub resolved: u32,
    pub policy: ConflictPolicy,
}

/// Whether own duration and child sum differ enough to count as a conflict.
fn diverges(own: u32, child_sum: u32) -> bool {
    let larger = own.max(child_sum);
    let diff = own.abs_diff(child_sum);
    let threshold = (f64::from(larger) * 0.2).max(2.0);
    f64::from(diff) > threshold
}

/// Bottom-up duration aggregator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    policy: ConflictPolicy,
}

impl Aggregator {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Recompute `aggregated_duration` for every node, post-order. O(n).
    pub fn recompute_all(&self, tree: &mut TaskTree) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for root in tree.roots() {
            self.recompute_subtree(tree, &root, &mut conflicts);
        }
        conflicts
    }

    /// Recompute a single node from its children's stored aggregates, then
    /// walk its ancestor chain up to the root. Used after a localized
    /// mutation so the whole tree does not need revisiting.
    pub fn recompute_from(&self, tree: &mut TaskTree, task_id: &str) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        if !tree.contains(task_id) {
            return conflicts;
        }
        self.recompute_node(tree, task_id, &mut conflicts);
        for ancestor in tree.ancestors(task_id) {
            self.recompute_node(tree, &ancestor, &mut conflicts);
        }
        conflicts
    }

    /// Iterative post-order walk; recursion depth is bounded only by the
    /// nesting ceiling, but an explicit stack keeps even flagged over-deep
    /// trees safe.
    fn recompute_subtree(&self, tree: &mut TaskTree, root: &str, conflicts: &mut Vec<Conflict>) {
        let mut stack: Vec<(String, bool)> = vec![(root.to_string(), false)];
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                self.recompute_node(tree, &id, conflicts);
                continue;
            }
            stack.push((id.clone(), true));
            for child in tree.children(&id) {
                stack.push((child.clone(), false));
            }
        }
    }

    fn recompute_node(&self, tree: &mut TaskTree, id: &str, conflicts: &mut Vec<Conflict>) {
        let children = tree.children(id).to_vec();
        if children.is_empty() {
            if let Some(task) = tree.get_mut(id) {
                task.aggregated_duration = task.duration;
            }
            return;
        }

        let child_sum: u32 = children
            .iter()
            .filter_map(|child| tree.get(child))
            .map(|child| child.aggregated_duration)
            .sum();

        let own = match tree.get(id) {
            Some(task) => task.duration,
            None => return,
        };

        let resolved = if diverges(own, child_sum) {
            let resolved = match self.policy {
                ConflictPolicy::PreferChildren => child_sum,
                ConflictPolicy::PreferOwn => own,
                ConflictPolicy::Average => (own + child_sum).div_ceil(2),
                ConflictPolicy::Max => own.max(child_sum),
                ConflictPolicy::Min => own.min(child_sum),
            };
            debug!(
                task_id = %id,
                own_duration = own,
                child_sum,
                resolved,
                policy = %self.policy,
                "aggregation conflict resolved"
            );
            conflicts.push(Conflict {
                task_id: id.to_string(),
                own_duration: own,
                child_sum,
                resolved,
                policy: self.policy,
            });
            resolved
        } else {
            child_sum
        };

        if let Some(task) = tree.get_mut(id) {
            task.aggregated_duration = resolved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Calendar;
    use crate::task::{Task, TaskFields};

    fn make(title: &str, parent: Option<&str>, level: u32, duration: u32) -> Task {
        Task::create(
            TaskFields {
                title: title.to_string(),
                duration,
                ..TaskFields::default()
            },
            parent.map(str::to_string),
            level,
            &Calendar::default(),
        )
        .unwrap()
    }

    #[test]
    fn divergence_threshold_uses_larger_value() {
        // Within 2 days: no conflict.
        assert!(!diverges(5, 7));
        assert!(!diverges(7, 5));
        // Within 20% of the larger value: no conflict.
        assert!(!diverges(100, 81));
        // Beyond both bounds: conflict.
        assert!(diverges(10, 7));
        assert!(diverges(100, 79));
    }

    #[test]
    fn leaf_aggregate_equals_own_duration() {
        let task = make("leaf", None, 0, 4);
        let id = task.id.clone();
        let mut tree = TaskTree::from_tasks(vec![task]);
        let conflicts = Aggregator::default().recompute_all(&mut tree);
        assert!(conflicts.is_empty());
        assert_eq!(tree.get(&id).unwrap().aggregated_duration, 4);
    }

    #[test]
    fn internal_node_sums_children_and_prefers_them_on_conflict() {
        // Root owns 10 but its children sum to 7: divergence of 3 beats
        // max(20% of 10, 2) = 2, so the default policy takes the child sum.
        let root = make("root", None, 0, 10);
        let b = make("b", Some(&root.id), 1, 3);
        let c = make("c", Some(&root.id), 1, 4);
        let root_id = root.id.clone();
        let mut tree = TaskTree::from_tasks(vec![root, b, c]);

        let conflicts = Aggregator::default().recompute_all(&mut tree);
        assert_eq!(tree.get(&root_id).unwrap().aggregated_duration, 7);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].task_id, root_id);
        assert_eq!(conflicts[0].own_duration, 10);
        assert_eq!(conflicts[0].child_sum, 7);
        assert_eq!(conflicts[0].resolved, 7);
    }

    #[test]
    fn policies_resolve_as_specified() {
        let cases = [
            (ConflictPolicy::PreferChildren, 7),
            (ConflictPolicy::PreferOwn, 20),
            (ConflictPolicy::Average, 14),
            (ConflictPolicy::Max, 20),
            (ConflictPolicy::Min, 7),
        ];
        for (policy, expected) in cases {
            let root = make("root", None, 0, 20);
            let b = make("b", Some(&root.id), 1, 3);
            let c = make("c", Some(&root.id), 1, 4);
            let root_id = root.id.clone();
            let mut tree = TaskTree::from_tasks(vec![root, b, c]);

            Aggregator::new(policy).recompute_all(&mut tree);
            assert_eq!(
                tree.get(&root_id).unwrap().aggregated_duration,
                expected,
                "policy {policy}"
            );
        }
    }

    #[test]
    fn nested_rollup_is_bottom_up() {
        let root = make("root", None, 0, 9);
        let mid = make("mid", Some(&root.id), 1, 5);
        let leaf_a = make("leaf-a", Some(&mid.id), 2, 2);
        let leaf_b = make("leaf-b", Some(&mid.id), 2, 3);
        let sibling = make("sibling", Some(&root.id), 1, 4);
        let (root_id, mid_id) = (root.id.clone(), mid.id.clone());
        let mut tree = TaskTree::from_tasks(vec![root, mid, leaf_a, leaf_b, sibling]);

        let conflicts = Aggregator::default().recompute_all(&mut tree);
        assert!(conflicts.is_empty());
        assert_eq!(tree.get(&mid_id).unwrap().aggregated_duration, 5);
        assert_eq!(tree.get(&root_id).unwrap().aggregated_duration, 9);
    }

    #[test]
    fn incremental_recompute_walks_to_the_root() {
        let root = make("root", None, 0, 9);
        let mid = make("mid", Some(&root.id), 1, 5);
        let leaf = make("leaf", Some(&mid.id), 2, 5);
        let (root_id, mid_id, leaf_id) = (root.id.clone(), mid.id.clone(), leaf.id.clone());
        let mut tree = TaskTree::from_tasks(vec![root, mid, leaf]);
        let aggregator = Aggregator::default();
        aggregator.recompute_all(&mut tree);

        tree.get_mut(&leaf_id).unwrap().duration = 9;
        aggregator.recompute_from(&mut tree, &leaf_id);

        assert_eq!(tree.get(&leaf_id).unwrap().aggregated_duration, 9);
        assert_eq!(tree.get(&mid_id).unwrap().aggregated_duration, 9);
        assert_eq!(tree.get(&root_id).unwrap().aggregated_duration, 9);
    }
}
