//! Invariant validation and structural repair.
//!
//! The validator takes an arbitrary flat task collection (a persisted
//! snapshot, an imported file, a generated candidate tree) and repairs it in
//! place so the rest of the engine can trust it:
//!
//! 1. parent links that do not resolve are cleared (the task becomes a root),
//! 2. parent cycles are broken deterministically,
//! 3. cached levels are recomputed top-down from the corrected roots,
//! 4. non-positive durations are clamped to one working day,
//! 5. the cached has-children flag is reconciled against the index,
//! 6. subtrees deeper than the configured ceiling are flagged (but kept).
//!
//! Repairs are diagnostics, never failures. Every run produces a
//! [`RepairReport`]; a clean report means the tree already satisfied all
//! structural invariants, and re-running the validator on repaired output
//! yields a clean report (idempotence).

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::tree::TaskTree;

/// What kind of structural defect a repair addressed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepairKind {
    DanglingParent,
    CycleBroken,
    LevelRecomputed,
    DurationClamped,
    ChildFlagReconciled,
    DepthOverCeiling,
}

/// One repair performed (or, for depth flags, one defect observed).
#[derive(Debug, Clone, Serialize)]
pub struct Repair {
    pub task_id: String,
    pub kind: RepairKind,
    pub note: String,
}

/// Diagnostic log of a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub repairs: Vec<Repair>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.repairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn count_of(&self, kind: RepairKind) -> usize {
        self.repairs
            .iter()
            .filter(|repair| repair.kind == kind)
            .count()
    }

    fn push(&mut self, task_id: &str, kind: RepairKind, note: String) {
        warn!(task_id = %task_id, kind = ?kind, note = %note, "structural repair");
        self.repairs.push(Repair {
            task_id: task_id.to_string(),
            kind,
            note,
        });
    }
}

/// Structural validator for a task tree.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    ceiling: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Resolved,
}

impl Validator {
    /// `ceiling` is the configured maximum depth (max level + 1).
    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    /// Validate and repair the tree in place, returning the diagnostic log.
    ///
    /// Never fails: structural corruption is always recoverable.
    pub fn run(&self, tree: &mut TaskTree) -> RepairReport {
        let mut report = RepairReport::default();
        tree.rebuild_index();
        self.repair_dangling_parents(tree, &mut report);
        self.clamp_durations(tree, &mut report);
        self.break_cycles(tree, &mut report);
        self.recompute_levels(tree, &mut report);
        self.reconcile_child_flags(tree, &mut report);
        self.flag_over_deep_subtrees(tree, &mut report);
        report
    }

    fn repair_dangling_parents(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let dangling: Vec<(String, String)> = tree
            .tasks()
            .filter_map(|task| {
                let parent = task.parent.as_deref()?;
                if tree.contains(parent) {
                    None
                } else {
                    Some((task.id.clone(), parent.to_string()))
                }
            })
            .collect();

        for (id, missing) in dangling {
            tree.set_parent(&id, None);
            if let Some(task) = tree.get_mut(&id) {
                task.level = 0;
            }
            report.push(
                &id,
                RepairKind::DanglingParent,
                format!("parent '{missing}' does not exist; task promoted to root"),
            );
        }
    }

    fn clamp_durations(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let bad: Vec<String> = tree
            .tasks()
            .filter(|task| task.duration == 0)
            .map(|task| task.id.clone())
            .collect();
        for id in bad {
            if let Some(task) = tree.get_mut(&id) {
                task.duration = 1;
            }
            report.push(
                &id,
                RepairKind::DurationClamped,
                "non-positive duration clamped to 1 working day".to_string(),
            );
        }
    }

    /// Depth-first walk up each task's parent chain with an explicit stack.
    /// When a node already on the current stack reappears as a parent, the
    /// cycle is closed by the node on top of the stack: its parent link gets
    /// cleared. Scanning in id order makes the break point deterministic.
    fn break_cycles(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let ids: Vec<String> = tree.ids().cloned().collect();
        let mut marks: HashMap<String, Mark> = HashMap::with_capacity(ids.len());

        for start in &ids {
            if marks.get(start).copied().unwrap_or(Mark::Unvisited) != Mark::Unvisited {
                continue;
            }

            let mut stack: Vec<String> = Vec::new();
            let mut current = start.clone();
            loop {
                marks.insert(current.clone(), Mark::OnStack);
                stack.push(current.clone());

                let parent = tree.get(&current).and_then(|task| task.parent.clone());
                let Some(parent) = parent else {
                    break;
                };
                match marks.get(&parent).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Resolved => break,
                    Mark::Unvisited => current = parent,
                    Mark::OnStack => {
                        tree.set_parent(&current, None);
                        if let Some(task) = tree.get_mut(&current) {
                            task.level = 0;
                        }
                        report.push(
                            &current,
                            RepairKind::CycleBroken,
                            format!("parent chain loops back through '{parent}'; link cleared"),
                        );
                        break;
                    }
                }
            }

            for id in stack {
                marks.insert(id, Mark::Resolved);
            }
        }
    }

    /// Top-down BFS from each corrected root, reconciling cached levels.
    fn recompute_levels(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let mut frontier: Vec<(String, u32)> =
            tree.roots().into_iter().map(|id| (id, 0)).collect();
        let mut cursor = 0;
        while cursor < frontier.len() {
            let (id, expected) = frontier[cursor].clone();
            cursor += 1;

            let actual = tree.get(&id).map(|task| task.level);
            if let Some(actual) = actual {
                if actual != expected {
                    if let Some(task) = tree.get_mut(&id) {
                        task.level = expected;
                    }
                    report.push(
                        &id,
                        RepairKind::LevelRecomputed,
                        format!("cached level {actual} corrected to {expected}"),
                    );
                }
            }
            for child in tree.children(&id) {
                frontier.push((child.clone(), expected + 1));
            }
        }
    }

    fn reconcile_child_flags(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let mismatched: Vec<(String, bool)> = tree
            .tasks()
            .filter_map(|task| {
                let actual = !tree.children(&task.id).is_empty();
                (task.has_children != actual).then(|| (task.id.clone(), actual))
            })
            .collect();
        for (id, actual) in mismatched {
            if let Some(task) = tree.get_mut(&id) {
                task.has_children = actual;
            }
            report.push(
                &id,
                RepairKind::ChildFlagReconciled,
                format!("has-children flag corrected to {actual}"),
            );
        }
    }

    /// Trees deeper than the ceiling are never truncated retroactively; the
    /// excess depth is only reported so a lowered ceiling becomes visible.
    fn flag_over_deep_subtrees(&self, tree: &mut TaskTree, report: &mut RepairReport) {
        let over: Vec<(String, u32)> = tree
            .tasks()
            .filter(|task| task.level + 1 > self.ceiling)
            .map(|task| (task.id.clone(), task.level))
            .collect();
        for (id, level) in over {
            report.push(
                &id,
                RepairKind::DepthOverCeiling,
                format!(
                    "depth {} exceeds the configured ceiling of {}",
                    level + 1,
                    self.ceiling
                ),
            );
        }
    }
}
