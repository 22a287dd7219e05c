//! Structural mutations: create, move, delete.
//!
//! Every operation validates its constraints in full before touching any
//! record, so a rejected mutation leaves the tree byte-identical. Each
//! operation reports the set of task ids whose aggregation or timeline
//! became stale, letting the caller re-run the aggregator and deriver on the
//! affected scope only.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::schedule::Calendar;
use crate::task::{Task, TaskFields};
use crate::tree::TaskTree;

/// What happens to a deleted task's subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Remove the task together with its entire subtree.
    Cascade,
    /// Remove only the task; its direct children move to its former parent
    /// at its former level.
    Promote,
}

impl std::str::FromStr for DeleteStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(DeleteStrategy::Cascade),
            "promote" => Ok(DeleteStrategy::Promote),
            other => Err(Error::InvalidArgument(format!(
                "unknown delete strategy '{other}' (expected cascade|promote)"
            ))),
        }
    }
}

/// Result of a structural mutation.
#[derive(Debug, Default)]
pub struct MutationOutcome {
    /// Ids whose aggregation/timeline must be recomputed. Removed ids are
    /// never listed here.
    pub stale: BTreeSet<String>,
    /// Id of a newly created task, if any.
    pub created: Option<String>,
    /// Ids removed from the tree, subtree included for cascade deletes.
    pub removed: Vec<String>,
}

impl MutationOutcome {
    fn mark_stale(&mut self, id: &str) {
        self.stale.insert(id.to_string());
    }

    fn mark_chain_stale(&mut self, tree: &TaskTree, id: &str) {
        self.mark_stale(id);
        for ancestor in tree.ancestors(id) {
            self.stale.insert(ancestor);
        }
    }
}

/// Create a task under `parent_id` (or as a root).
///
/// Rejects `NestingLimitExceeded` when the new task's depth would reach the
/// configured ceiling, and `TaskNotFound` for an unknown parent.
pub fn create(
    tree: &mut TaskTree,
    config: &Config,
    calendar: &Calendar,
    parent_id: Option<&str>,
    fields: TaskFields,
) -> Result<MutationOutcome> {
    let level = match parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = tree
                .get(parent_id)
                .ok_or_else(|| Error::TaskNotFound(parent_id.to_string()))?;
            parent.level + 1
        }
    };

    let ceiling = config.limits.max_depth;
    if level >= ceiling {
        return Err(Error::NestingLimitExceeded { level, ceiling });
    }

    let task = Task::create(fields, parent_id.map(str::to_string), level, calendar)?;
    let id = task.id.clone();
    tree.insert(task);
    if let Some(parent_id) = parent_id {
        if let Some(parent) = tree.get_mut(parent_id) {
            parent.has_children = true;
            parent.touch();
        }
    }
    debug!(task_id = %id, level, "task created");

    let mut outcome = MutationOutcome {
        created: Some(id.clone()),
        ..MutationOutcome::default()
    };
    outcome.mark_chain_stale(tree, &id);
    Ok(outcome)
}

/// Re-parent a task (or make it a root with `new_parent_id = None`).
///
/// Rejects `CyclicReparent` when the new parent is the task itself or one of
/// its descendants, and `NestingLimitExceeded` when any node of the moved
/// subtree would land at the ceiling. Levels of the whole subtree are
/// renumbered after the move.
pub fn move_task(
    tree: &mut TaskTree,
    config: &Config,
    task_id: &str,
    new_parent_id: Option<&str>,
) -> Result<MutationOutcome> {
    if !tree.contains(task_id) {
        return Err(Error::TaskNotFound(task_id.to_string()));
    }

    let new_level = match new_parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = tree
                .get(parent_id)
                .ok_or_else(|| Error::TaskNotFound(parent_id.to_string()))?;
            if parent_id == task_id || tree.is_descendant(parent_id, task_id) {
                return Err(Error::CyclicReparent {
                    task_id: task_id.to_string(),
                    new_parent: parent_id.to_string(),
                });
            }
            parent.level + 1
        }
    };

    let ceiling = config.limits.max_depth;
    let deepest = new_level + tree.subtree_depth(task_id);
    if deepest >= ceiling {
        return Err(Error::NestingLimitExceeded {
            level: deepest,
            ceiling,
        });
    }

    let old_parent = tree.get(task_id).and_then(|task| task.parent.clone());

    let mut outcome = MutationOutcome::default();
    // Stale scope covers the old ancestor chain, the new one, and the moved
    // subtree itself.
    outcome.mark_chain_stale(tree, task_id);

    tree.set_parent(task_id, new_parent_id.map(str::to_string));
    if let Some(task) = tree.get_mut(task_id) {
        task.level = new_level;
        task.touch();
    }
    renumber_subtree(tree, task_id, new_level);

    if let Some(old_parent) = old_parent {
        refresh_child_flag(tree, &old_parent);
    }
    if let Some(parent_id) = new_parent_id {
        if let Some(parent) = tree.get_mut(parent_id) {
            parent.has_children = true;
            parent.touch();
        }
    }
    debug!(task_id = %task_id, new_level, "task moved");

    outcome.mark_chain_stale(tree, task_id);
    for descendant in tree.descendants(task_id) {
        outcome.mark_stale(&descendant);
    }
    Ok(outcome)
}

/// Delete a task with the chosen strategy.
pub fn delete(
    tree: &mut TaskTree,
    task_id: &str,
    strategy: DeleteStrategy,
) -> Result<MutationOutcome> {
    let target = tree
        .get(task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
    let former_parent = target.parent.clone();
    let former_level = target.level;

    let mut outcome = MutationOutcome::default();
    if let Some(parent) = &former_parent {
        outcome.mark_chain_stale(tree, parent);
    }

    match strategy {
        DeleteStrategy::Cascade => {
            let mut removed = vec![task_id.to_string()];
            removed.extend(tree.descendants(task_id));
            // Children-first so the index never holds a child of a missing
            // parent mid-removal.
            for id in removed.iter().rev() {
                tree.remove(id);
            }
            outcome.removed = removed;
        }
        DeleteStrategy::Promote => {
            let children = tree.children(task_id).to_vec();
            tree.remove(task_id);
            for child in &children {
                tree.set_parent(child, former_parent.clone());
                if let Some(task) = tree.get_mut(child) {
                    task.level = former_level;
                    task.touch();
                }
                renumber_subtree(tree, child, former_level);
                outcome.mark_stale(child);
                for descendant in tree.descendants(child) {
                    outcome.mark_stale(&descendant);
                }
            }
            outcome.removed = vec![task_id.to_string()];
        }
    }

    if let Some(parent) = &former_parent {
        refresh_child_flag(tree, parent);
    }
    debug!(task_id = %task_id, ?strategy, removed = outcome.removed.len(), "task deleted");
    Ok(outcome)
}

/// Recursively renumber the levels below `task_id`, given its own level.
fn renumber_subtree(tree: &mut TaskTree, task_id: &str, level: u32) {
    let mut frontier: Vec<(String, u32)> = tree
        .children(task_id)
        .iter()
        .map(|child| (child.clone(), level + 1))
        .collect();
    let mut cursor = 0;
    while cursor < frontier.len() {
        let (id, child_level) = frontier[cursor].clone();
        cursor += 1;
        if let Some(task) = tree.get_mut(&id) {
            task.level = child_level;
        }
        for grandchild in tree.children(&id) {
            frontier.push((grandchild.clone(), child_level + 1));
        }
    }
}

fn refresh_child_flag(tree: &mut TaskTree, task_id: &str) {
    let has_children = !tree.children(task_id).is_empty();
    if let Some(task) = tree.get_mut(task_id) {
        if task.has_children != has_children {
            task.has_children = has_children;
            task.touch();
        }
    }
}
