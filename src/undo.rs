//! Reversal of the last date adjustment.
//!
//! Undo support is deliberately shallow: exactly one slot holding the spans
//! the most recent temporal mutation touched. Applying it restores those
//! spans and clears the slot. Structural mutations (create/move/delete)
//! invalidate the slot instead of recording into it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tree::TaskTree;

/// Pre-mutation span of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanSnapshot {
    pub task_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: u32,
}

/// The reversible record of one temporal mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateAdjustment {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    /// Which trigger produced this record ("duration", "dates", "shift").
    pub operation: String,
    pub spans: Vec<SpanSnapshot>,
}

impl DateAdjustment {
    pub fn new(operation: &str, spans: Vec<SpanSnapshot>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            operation: operation.to_string(),
            spans,
        }
    }
}

/// Summary of an applied undo.
#[derive(Debug, Clone, Serialize)]
pub struct UndoSummary {
    pub adjustment_id: Uuid,
    pub operation: String,
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
}

/// Restore every span the adjustment recorded.
///
/// Tasks deleted since the adjustment was taken are skipped, not errors: the
/// record reflects an older tree shape.
pub fn apply(tree: &mut TaskTree, adjustment: DateAdjustment) -> Result<UndoSummary> {
    if adjustment.spans.is_empty() {
        return Err(Error::NothingToUndo);
    }

    let mut restored = Vec::new();
    let mut skipped = Vec::new();
    for snapshot in &adjustment.spans {
        match tree.get_mut(&snapshot.task_id) {
            Some(task) => {
                task.start_date = snapshot.start_date;
                task.end_date = snapshot.end_date;
                task.duration = snapshot.duration;
                task.touch();
                restored.push(snapshot.task_id.clone());
            }
            None => skipped.push(snapshot.task_id.clone()),
        }
    }

    Ok(UndoSummary {
        adjustment_id: adjustment.id,
        operation: adjustment.operation,
        restored,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{apply_duration_change, Calendar};
    use crate::task::{Task, TaskFields};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn undo_restores_the_previous_span() {
        let calendar = Calendar::default();
        let task = Task::create(
            TaskFields {
                title: "t".to_string(),
                duration: 3,
                start_date: Some(date(2024, 1, 1)),
                ..TaskFields::default()
            },
            None,
            0,
            &calendar,
        )
        .unwrap();
        let id = task.id.clone();
        let mut tree = TaskTree::from_tasks(vec![task]);

        let outcome = apply_duration_change(&mut tree, &calendar, &id, 8).unwrap();
        assert_eq!(tree.get(&id).unwrap().duration, 8);

        let summary = apply(&mut tree, outcome.adjustment).unwrap();
        assert_eq!(summary.restored, vec![id.clone()]);
        let task = tree.get(&id).unwrap();
        assert_eq!(task.duration, 3);
        assert_eq!(task.end_date, date(2024, 1, 3));
    }

    #[test]
    fn undo_skips_tasks_removed_in_the_meantime() {
        let mut tree = TaskTree::new();
        let adjustment = DateAdjustment::new(
            "shift",
            vec![SpanSnapshot {
                task_id: "gone".to_string(),
                start_date: date(2024, 1, 1),
                end_date: date(2024, 1, 2),
                duration: 2,
            }],
        );
        let summary = apply(&mut tree, adjustment).unwrap();
        assert!(summary.restored.is_empty());
        assert_eq!(summary.skipped, vec!["gone".to_string()]);
    }

    #[test]
    fn empty_adjustment_is_nothing_to_undo() {
        let mut tree = TaskTree::new();
        let err = apply(&mut tree, DateAdjustment::new("shift", Vec::new()));
        assert!(matches!(err, Err(Error::NothingToUndo)));
    }
}
