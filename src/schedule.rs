//! Working-day arithmetic and cascading date propagation.
//!
//! A span is inclusive: a task running `start..=end` has a duration equal to
//! the number of working days inside that range. One weekday per week is
//! non-working (default Sunday) and is skipped by both duration counting and
//! date stepping, so "start plus n working days" lands on the end of an
//! n-working-day span.
//!
//! Three temporal triggers exist:
//! - duration edits move one end of the span (which end depends on the
//!   task's `anchor_end` flag),
//! - explicit date edits recompute the duration from the span,
//! - span shifts move a whole subtree by a calendar-day delta and then widen
//!   every ancestor to the union of its own span and its descendants' spans,
//!   recursively upward.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{Error, Result};
use crate::tree::TaskTree;
use crate::undo::{DateAdjustment, SpanSnapshot};

/// Working-day calendar with one fixed non-working weekday.
#[derive(Debug, Clone, Copy)]
pub struct Calendar {
    rest_day: Weekday,
}

impl Calendar {
    pub fn new(rest_day: Weekday) -> Self {
        Self { rest_day }
    }

    pub fn rest_day(&self) -> Weekday {
        self.rest_day
    }

    pub fn is_working(&self, date: NaiveDate) -> bool {
        date.weekday() != self.rest_day
    }

    /// End date of an inclusive span starting at `start` and containing
    /// `days` working days. A `start` falling on the rest day does not count
    /// toward the span.
    pub fn add_working_days(&self, start: NaiveDate, days: u32) -> NaiveDate {
        let mut date = start;
        let mut counted = u32::from(self.is_working(date));
        while counted < days {
            let Some(next) = date.succ_opt() else {
                return date;
            };
            date = next;
            if self.is_working(date) {
                counted += 1;
            }
        }
        date
    }

    /// Start date of an inclusive span ending at `end` and containing `days`
    /// working days. Mirror of [`Calendar::add_working_days`].
    pub fn sub_working_days(&self, end: NaiveDate, days: u32) -> NaiveDate {
        let mut date = end;
        let mut counted = u32::from(self.is_working(date));
        while counted < days {
            let Some(prev) = date.pred_opt() else {
                return date;
            };
            date = prev;
            if self.is_working(date) {
                counted += 1;
            }
        }
        date
    }

    /// Count of working days in the inclusive range `start..=end`.
    ///
    /// Returns `InvalidDateRange` when `end` precedes `start`.
    pub fn working_days_between(&self, start: NaiveDate, end: NaiveDate) -> Result<u32> {
        if end < start {
            return Err(Error::InvalidDateRange { start, end });
        }
        let total = (end - start).num_days();
        let mut count = 0u32;
        let mut date = start;
        for _ in 0..=total {
            if self.is_working(date) {
                count += 1;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(count)
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(Weekday::Sun)
    }
}

fn shift_date(date: NaiveDate, delta: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(delta)).unwrap_or(date)
}

/// Result of a temporal mutation: which tasks need re-aggregation and the
/// reversible snapshot of every span the mutation touched.
#[derive(Debug)]
pub struct TemporalOutcome {
    pub stale: BTreeSet<String>,
    pub adjustment: DateAdjustment,
}

fn snapshot_of(tree: &TaskTree, id: &str) -> Option<SpanSnapshot> {
    tree.get(id).map(|task| SpanSnapshot {
        task_id: task.id.clone(),
        start_date: task.start_date,
        end_date: task.end_date,
        duration: task.duration,
    })
}

/// Change a task's own duration, moving one end of its span.
///
/// With `anchor_end` unset the start date stays and the end date moves; with
/// it set the end date stays and the start date moves.
pub fn apply_duration_change(
    tree: &mut TaskTree,
    calendar: &Calendar,
    task_id: &str,
    duration: u32,
) -> Result<TemporalOutcome> {
    if duration == 0 {
        return Err(Error::InvalidArgument(
            "duration must be at least 1 working day".to_string(),
        ));
    }
    let snapshot = snapshot_of(tree, task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

    let task = tree
        .get_mut(task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
    task.duration = duration;
    if task.anchor_end {
        task.start_date = calendar.sub_working_days(task.end_date, duration);
    } else {
        task.end_date = calendar.add_working_days(task.start_date, duration);
    }
    task.touch();

    let mut stale: BTreeSet<String> = BTreeSet::new();
    stale.insert(task_id.to_string());
    stale.extend(tree.ancestors(task_id));

    Ok(TemporalOutcome {
        stale,
        adjustment: DateAdjustment::new("duration", vec![snapshot]),
    })
}

/// Set both dates explicitly; the duration is recomputed from the span.
///
/// A span covering only rest days still counts as one working day so the
/// stored duration stays positive.
pub fn apply_date_edit(
    tree: &mut TaskTree,
    calendar: &Calendar,
    task_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<TemporalOutcome> {
    let duration = calendar.working_days_between(start_date, end_date)?.max(1);
    let snapshot = snapshot_of(tree, task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

    let task = tree
        .get_mut(task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
    task.start_date = start_date;
    task.end_date = end_date;
    task.duration = duration;
    task.touch();

    let mut stale: BTreeSet<String> = BTreeSet::new();
    stale.insert(task_id.to_string());
    stale.extend(tree.ancestors(task_id));

    Ok(TemporalOutcome {
        stale,
        adjustment: DateAdjustment::new("dates", vec![snapshot]),
    })
}

/// Shift a task's span by `delta` calendar days, cascading down and up.
///
/// Every descendant shifts by the same delta, preserving relative offsets.
/// Walking up from the shifted task, each ancestor's span widens to the
/// union of its own span and all its descendants' spans; a widened ancestor
/// may in turn force its own ancestor to widen.
pub fn shift_span(
    tree: &mut TaskTree,
    calendar: &Calendar,
    task_id: &str,
    delta: i64,
) -> Result<TemporalOutcome> {
    if !tree.contains(task_id) {
        return Err(Error::TaskNotFound(task_id.to_string()));
    }

    let mut moved: Vec<String> = vec![task_id.to_string()];
    moved.extend(tree.descendants(task_id));
    let ancestors = tree.ancestors(task_id);

    // Snapshot everything that can change before touching anything.
    let mut snapshots: Vec<SpanSnapshot> = Vec::new();
    for id in moved.iter().chain(ancestors.iter()) {
        if let Some(snapshot) = snapshot_of(tree, id) {
            snapshots.push(snapshot);
        }
    }

    for id in &moved {
        if let Some(task) = tree.get_mut(id) {
            task.start_date = shift_date(task.start_date, delta);
            task.end_date = shift_date(task.end_date, delta);
            task.touch();
        }
    }

    let mut widened: Vec<String> = Vec::new();
    for ancestor_id in &ancestors {
        let mut span = match tree.get(ancestor_id) {
            Some(task) => (task.start_date, task.end_date),
            None => continue,
        };
        let before = span;
        for descendant_id in tree.descendants(ancestor_id) {
            if let Some(descendant) = tree.get(&descendant_id) {
                span.0 = span.0.min(descendant.start_date);
                span.1 = span.1.max(descendant.end_date);
            }
        }
        if span != before {
            let duration = calendar.working_days_between(span.0, span.1)?.max(1);
            if let Some(task) = tree.get_mut(ancestor_id) {
                task.start_date = span.0;
                task.end_date = span.1;
                task.duration = duration;
                task.touch();
            }
            widened.push(ancestor_id.clone());
        }
    }

    // Keep only the spans that actually changed in the reversible record.
    let changed: BTreeSet<&str> = moved
        .iter()
        .map(String::as_str)
        .chain(widened.iter().map(String::as_str))
        .collect();
    snapshots.retain(|snapshot| changed.contains(snapshot.task_id.as_str()));

    let mut stale: BTreeSet<String> = moved.iter().cloned().collect();
    stale.extend(ancestors);

    Ok(TemporalOutcome {
        stale,
        adjustment: DateAdjustment::new("shift", snapshots),
    })
}
