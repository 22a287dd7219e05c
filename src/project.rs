//! Project façade: one tree, one gateway, one mutation pipeline.
//!
//! Every external mutation request enters here. The pipeline is always the
//! same: validate constraints, apply the mutation, re-aggregate the stale
//! scope, persist the snapshot. On open, the validator runs unconditionally
//! before anything else touches the tree; loaded bytes are never trusted.
//!
//! A failed durable write is surfaced to the caller but the in-memory tree
//! stays the valid source of truth; callers may retry persistence later.
//!
//! All collaborators (validator, aggregator, calendar, gateway) are explicit
//! members constructed per project instance; there are no shared singletons,
//! so independent projects can live side by side in one process.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::aggregate::{Aggregator, Conflict};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mutate::{self, DeleteStrategy, MutationOutcome};
use crate::schedule::{self, Calendar, TemporalOutcome};
use crate::storage::{decode_snapshot, encode_snapshot, Gateway, TASKS_KEY, UNDO_KEY};
use crate::task::{Priority, Status, Task, TaskFields};
use crate::timeline::{self, CriticalPath, Timeline};
use crate::tree::TaskTree;
use crate::undo::{self, DateAdjustment, UndoSummary};
use crate::validate::{RepairReport, Validator};

/// A loaded, validated project tree bound to its durability gateway.
pub struct Project {
    tree: TaskTree,
    config: Config,
    calendar: Calendar,
    aggregator: Aggregator,
    validator: Validator,
    gateway: Box<dyn Gateway>,
    last_adjustment: Option<DateAdjustment>,
    load_report: RepairReport,
    last_conflicts: Vec<Conflict>,
}

impl Project {
    /// Load the snapshot from the gateway, repair it, and aggregate.
    ///
    /// A missing snapshot is an empty project. Structural corruption in the
    /// snapshot is repaired and reported via [`Project::load_report`], never
    /// an error; only undecodable bytes fail.
    pub fn open(gateway: Box<dyn Gateway>, config: Config) -> Result<Self> {
        config.validate()?;
        let calendar = Calendar::new(config.calendar.weekday()?);
        let aggregator = Aggregator::new(config.aggregation.conflict_policy);
        let validator = Validator::new(config.limits.max_depth);

        let tasks = match gateway.get(TASKS_KEY)? {
            Some(bytes) => decode_snapshot(&bytes)?,
            None => Vec::new(),
        };
        let mut tree = TaskTree::from_tasks(tasks);
        let load_report = validator.run(&mut tree);
        let last_conflicts = aggregator.recompute_all(&mut tree);

        // The undo slot survives across process boundaries; a slot that no
        // longer parses is simply dropped.
        let last_adjustment = gateway
            .get(UNDO_KEY)?
            .and_then(|bytes| serde_json::from_slice::<DateAdjustment>(&bytes).ok());

        Ok(Self {
            tree,
            config,
            calendar,
            aggregator,
            validator,
            gateway,
            last_adjustment,
            load_report,
            last_conflicts,
        })
    }

    pub fn tree(&self) -> &TaskTree {
        &self.tree
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Repairs performed while loading the snapshot.
    pub fn load_report(&self) -> &RepairReport {
        &self.load_report
    }

    /// Aggregation conflicts observed by the most recent recomputation.
    pub fn last_conflicts(&self) -> &[Conflict] {
        &self.last_conflicts
    }

    // =========================================================================
    // Structural mutations
    // =========================================================================

    pub fn create_task(&mut self, parent_id: Option<&str>, fields: TaskFields) -> Result<String> {
        let outcome = mutate::create(&mut self.tree, &self.config, &self.calendar, parent_id, fields)?;
        let id = outcome
            .created
            .clone()
            .ok_or_else(|| Error::OperationFailed("create returned no id".to_string()))?;
        self.finish_structural(outcome)?;
        Ok(id)
    }

    pub fn move_task(&mut self, task_id: &str, new_parent_id: Option<&str>) -> Result<()> {
        let outcome = mutate::move_task(&mut self.tree, &self.config, task_id, new_parent_id)?;
        self.finish_structural(outcome)
    }

    pub fn delete_task(&mut self, task_id: &str, strategy: DeleteStrategy) -> Result<Vec<String>> {
        let outcome = mutate::delete(&mut self.tree, task_id, strategy)?;
        let removed = outcome.removed.clone();
        self.finish_structural(outcome)?;
        Ok(removed)
    }

    fn finish_structural(&mut self, outcome: MutationOutcome) -> Result<()> {
        // A structural change invalidates the reversible date slot: the
        // recorded spans may no longer describe the tree.
        self.last_adjustment = None;
        self.refresh(&outcome.stale);
        self.persist()
    }

    // =========================================================================
    // Temporal mutations
    // =========================================================================

    pub fn set_duration(&mut self, task_id: &str, duration: u32) -> Result<()> {
        let outcome =
            schedule::apply_duration_change(&mut self.tree, &self.calendar, task_id, duration)?;
        self.finish_temporal(outcome)
    }

    pub fn set_dates(&mut self, task_id: &str, start: NaiveDate, end: NaiveDate) -> Result<()> {
        let outcome =
            schedule::apply_date_edit(&mut self.tree, &self.calendar, task_id, start, end)?;
        self.finish_temporal(outcome)
    }

    pub fn shift_span(&mut self, task_id: &str, delta_days: i64) -> Result<()> {
        let outcome = schedule::shift_span(&mut self.tree, &self.calendar, task_id, delta_days)?;
        self.finish_temporal(outcome)
    }

    fn finish_temporal(&mut self, outcome: TemporalOutcome) -> Result<()> {
        self.last_adjustment = Some(outcome.adjustment);
        self.refresh(&outcome.stale);
        self.persist()
    }

    /// Revert the most recent date adjustment, if one is on record.
    pub fn undo_last_adjustment(&mut self) -> Result<UndoSummary> {
        let adjustment = self.last_adjustment.take().ok_or(Error::NothingToUndo)?;
        let summary = undo::apply(&mut self.tree, adjustment)?;
        let stale: BTreeSet<String> = summary.restored.iter().cloned().collect();
        self.refresh(&stale);
        self.persist()?;
        Ok(summary)
    }

    // =========================================================================
    // Detail edits (no date or structure impact)
    // =========================================================================

    pub fn set_title(&mut self, task_id: &str, title: &str) -> Result<()> {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument("title cannot be empty".to_string()));
        }
        self.edit(task_id, |task| task.title = title.trim().to_string())
    }

    pub fn set_status(&mut self, task_id: &str, status: Status) -> Result<()> {
        self.edit(task_id, |task| task.status = status)
    }

    pub fn set_priority(&mut self, task_id: &str, priority: Priority) -> Result<()> {
        self.edit(task_id, |task| task.priority = priority)
    }

    pub fn set_anchor_end(&mut self, task_id: &str, anchor_end: bool) -> Result<()> {
        self.edit(task_id, |task| task.anchor_end = anchor_end)
    }

    fn edit(&mut self, task_id: &str, apply: impl FnOnce(&mut Task)) -> Result<()> {
        let task = self
            .tree
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        apply(task);
        task.touch();
        self.persist()
    }

    // =========================================================================
    // Validation, derivation, exchange
    // =========================================================================

    /// Re-run the validator over the whole tree, then re-aggregate.
    pub fn revalidate(&mut self) -> Result<RepairReport> {
        let report = self.validator.run(&mut self.tree);
        self.last_conflicts = self.aggregator.recompute_all(&mut self.tree);
        self.persist()?;
        Ok(report)
    }

    pub fn timeline(&self) -> Option<Timeline> {
        timeline::derive_timeline(&self.tree)
    }

    pub fn critical_path(&self, root_id: Option<&str>) -> CriticalPath {
        timeline::critical_path(&self.tree, root_id)
    }

    /// Merge an externally produced candidate tree into the store.
    ///
    /// The candidates go through the validator unconditionally; generated
    /// or hand-written input is never trusted pre-validated.
    pub fn import_tasks(&mut self, tasks: Vec<Task>) -> Result<RepairReport> {
        for task in tasks {
            self.tree.insert(task);
        }
        self.last_adjustment = None;
        self.revalidate()
    }

    pub fn export_tasks(&self) -> Vec<Task> {
        self.tree.to_tasks()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    fn refresh(&mut self, stale: &BTreeSet<String>) {
        let mut conflicts = Vec::new();
        for id in stale {
            conflicts.extend(self.aggregator.recompute_from(&mut self.tree, id));
        }
        self.last_conflicts = conflicts;
    }

    fn persist(&mut self) -> Result<()> {
        let bytes = encode_snapshot(self.tree.to_tasks())?;
        self.gateway.set(TASKS_KEY, &bytes)?;
        match &self.last_adjustment {
            Some(adjustment) => {
                let bytes = serde_json::to_vec(adjustment)?;
                self.gateway.set(UNDO_KEY, &bytes)
            }
            None => self.gateway.remove(UNDO_KEY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryGateway;
    use crate::validate::RepairKind;

    fn open_empty() -> Project {
        Project::open(Box::new(MemoryGateway::new()), Config::default()).unwrap()
    }

    fn fields(title: &str, duration: u32) -> TaskFields {
        TaskFields {
            title: title.to_string(),
            duration,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..TaskFields::default()
        }
    }

    #[test]
    fn create_then_aggregate_rolls_up() {
        let mut project = open_empty();
        let root = project.create_task(None, fields("root", 10)).unwrap();
        project.create_task(Some(&root), fields("b", 3)).unwrap();
        project.create_task(Some(&root), fields("c", 4)).unwrap();

        assert_eq!(project.tree().get(&root).unwrap().aggregated_duration, 7);
        assert_eq!(project.last_conflicts().len(), 1);
    }

    #[test]
    fn nested_create_and_move_renumber_levels() {
        let mut project = open_empty();
        let a = project.create_task(None, fields("A", 10)).unwrap();
        let b = project.create_task(Some(&a), fields("B", 3)).unwrap();
        project.create_task(Some(&a), fields("C", 4)).unwrap();
        let d = project.create_task(Some(&a), fields("D", 2)).unwrap();
        project.move_task(&b, Some(&d)).unwrap();

        assert_eq!(project.tree().get(&d).unwrap().level, 1);
        assert_eq!(project.tree().get(&b).unwrap().level, 2);
    }

    #[test]
    fn snapshot_round_trip_preserves_edges_and_levels() {
        let mut gateway = MemoryGateway::new();
        let edges: Vec<(String, Option<String>, u32)>;
        {
            let mut project =
                Project::open(Box::new(gateway.clone()), Config::default()).unwrap();
            let root = project.create_task(None, fields("root", 4)).unwrap();
            let mid = project.create_task(Some(&root), fields("mid", 2)).unwrap();
            project.create_task(Some(&mid), fields("leaf", 2)).unwrap();
            edges = project
                .export_tasks()
                .iter()
                .map(|task| (task.id.clone(), task.parent.clone(), task.level))
                .collect();
            // Copy the persisted bytes into the outer gateway.
            let bytes = encode_snapshot(project.export_tasks()).unwrap();
            gateway.set(TASKS_KEY, &bytes).unwrap();
        }

        let reloaded = Project::open(Box::new(gateway), Config::default()).unwrap();
        assert!(reloaded.load_report().is_clean());
        let reloaded_edges: Vec<(String, Option<String>, u32)> = reloaded
            .export_tasks()
            .iter()
            .map(|task| (task.id.clone(), task.parent.clone(), task.level))
            .collect();
        assert_eq!(edges, reloaded_edges);
    }

    #[test]
    fn corrupt_snapshot_is_repaired_on_open() {
        let mut gateway = MemoryGateway::new();
        let mut project = Project::open(Box::new(gateway.clone()), Config::default()).unwrap();
        let root = project.create_task(None, fields("root", 2)).unwrap();
        let child = project.create_task(Some(&root), fields("child", 2)).unwrap();

        // Corrupt the persisted records: dangling parent and a bad level.
        let mut tasks = project.export_tasks();
        for task in &mut tasks {
            if task.id == child {
                task.parent = Some("missing".to_string());
                task.level = 9;
            }
        }
        gateway
            .set(TASKS_KEY, &encode_snapshot(tasks).unwrap())
            .unwrap();

        let reloaded = Project::open(Box::new(gateway), Config::default()).unwrap();
        assert!(!reloaded.load_report().is_clean());
        assert_eq!(
            reloaded.load_report().count_of(RepairKind::DanglingParent),
            1
        );
        let repaired = reloaded.tree().get(&child).unwrap();
        assert!(repaired.parent.is_none());
        assert_eq!(repaired.level, 0);
    }

    #[test]
    fn quota_failure_keeps_the_in_memory_tree() {
        let gateway = MemoryGateway::new().with_quota(64);
        let mut project = Project::open(Box::new(gateway), Config::default()).unwrap();

        // The snapshot for even one task exceeds 64 bytes, so persistence
        // fails, but the task must exist in memory afterwards.
        let err = project.create_task(None, fields("root", 2));
        assert!(matches!(err, Err(Error::QuotaExceeded { .. })));
        assert_eq!(project.tree().len(), 1);
    }

    #[test]
    fn undo_slot_is_single_and_cleared_by_structure() {
        let mut project = open_empty();
        let root = project.create_task(None, fields("root", 4)).unwrap();
        assert!(matches!(
            project.undo_last_adjustment(),
            Err(Error::NothingToUndo)
        ));

        project.set_duration(&root, 9).unwrap();
        let summary = project.undo_last_adjustment().unwrap();
        assert_eq!(summary.restored, vec![root.clone()]);
        assert_eq!(project.tree().get(&root).unwrap().duration, 4);

        // Slot consumed: a second undo has nothing to revert.
        assert!(matches!(
            project.undo_last_adjustment(),
            Err(Error::NothingToUndo)
        ));

        // A structural mutation clears a fresh slot.
        project.set_duration(&root, 9).unwrap();
        project.create_task(Some(&root), fields("child", 1)).unwrap();
        assert!(matches!(
            project.undo_last_adjustment(),
            Err(Error::NothingToUndo)
        ));
    }

    #[test]
    fn import_runs_the_validator() {
        let mut project = open_empty();
        let calendar = *project.calendar();
        let good = Task::create(fields("good", 2), None, 0, &calendar).unwrap();
        let mut bad = Task::create(fields("bad", 2), None, 0, &calendar).unwrap();
        bad.parent = Some("nowhere".to_string());
        bad.level = 3;

        let report = project.import_tasks(vec![good, bad.clone()]).unwrap();
        assert!(!report.is_clean());
        let repaired = project.tree().get(&bad.id).unwrap();
        assert!(repaired.parent.is_none());
        assert_eq!(repaired.level, 0);
    }
}
