//! Render-ready timeline rows and the approximate critical path.
//!
//! The deriver flattens the tree into a pre-order, depth-first sequence with
//! children ordered by start date, each row carrying its offset from the
//! project window's start, its span width in calendar days, and a color
//! classification. The critical path is the longest-duration root-to-leaf
//! walk summing each node's own duration; it knows nothing about
//! cross-branch dependencies and is an explicit approximation.

use chrono::NaiveDate;
use serde::Serialize;

use crate::task::{Priority, Status, Task};
use crate::tree::TaskTree;

/// Display color class for a timeline row. Pure lookup, no styling here.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Violet,
    Green,
    Red,
    Blue,
    Amber,
    Slate,
}

/// Status/priority/has-children to color classification.
pub fn classify(status: Status, priority: Priority, has_children: bool) -> Color {
    match (has_children, status, priority) {
        (true, _, _) => Color::Violet,
        (false, Status::Done, _) => Color::Green,
        (false, Status::Blocked, _) => Color::Red,
        (false, Status::InProgress, _) => Color::Blue,
        (false, Status::Planned, Priority::High | Priority::Critical) => Color::Amber,
        (false, Status::Planned, _) => Color::Slate,
    }
}

/// One row of the derived timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineRow {
    pub task_id: String,
    pub title: String,
    pub level: u32,
    /// Calendar days between the project window's start and this row's start.
    pub offset_days: i64,
    /// Inclusive span width in calendar days.
    pub span_days: i64,
    pub duration: u32,
    pub aggregated_duration: u32,
    pub status: Status,
    pub color: Color,
}

/// The full derived timeline.
#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub rows: Vec<TimelineRow>,
}

/// Longest-duration root-to-leaf walk within a subtree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CriticalPath {
    /// Sum of each node's own duration along the path.
    pub total_duration: u64,
    pub task_ids: Vec<String>,
}

/// Flatten the tree into ordered, positioned rows.
///
/// Returns `None` for an empty tree (there is no project window to anchor
/// offsets against).
pub fn derive_timeline(tree: &TaskTree) -> Option<Timeline> {
    let window_start = tree.tasks().map(|task| task.start_date).min()?;
    let window_end = tree.tasks().map(|task| task.end_date).max()?;

    let mut rows = Vec::with_capacity(tree.len());
    let mut stack: Vec<String> = ordered_by_start(tree, &tree.roots());
    stack.reverse();
    while let Some(id) = stack.pop() {
        let Some(task) = tree.get(&id) else {
            continue;
        };
        rows.push(row_for(task, window_start));
        let mut children = ordered_by_start(tree, tree.children(&id));
        children.reverse();
        stack.extend(children);
    }

    Some(Timeline {
        window_start,
        window_end,
        rows,
    })
}

fn ordered_by_start(tree: &TaskTree, ids: &[String]) -> Vec<String> {
    let mut ordered = ids.to_vec();
    ordered.sort_by(|left, right| {
        let left_start = tree.get(left).map(|task| task.start_date);
        let right_start = tree.get(right).map(|task| task.start_date);
        left_start.cmp(&right_start).then_with(|| left.cmp(right))
    });
    ordered
}

fn row_for(task: &Task, window_start: NaiveDate) -> TimelineRow {
    TimelineRow {
        task_id: task.id.clone(),
        title: task.title.clone(),
        level: task.level,
        offset_days: (task.start_date - window_start).num_days(),
        span_days: (task.end_date - task.start_date).num_days() + 1,
        duration: task.duration,
        aggregated_duration: task.aggregated_duration,
        status: task.status,
        color: classify(task.status, task.priority, task.has_children),
    }
}

/// Approximate critical path for the subtree rooted at `root_id`, or across
/// all roots when `root_id` is `None`. Ties break toward the smaller id so
/// the result is deterministic.
pub fn critical_path(tree: &TaskTree, root_id: Option<&str>) -> CriticalPath {
    let roots: Vec<String> = match root_id {
        Some(id) if tree.contains(id) => vec![id.to_string()],
        Some(_) => Vec::new(),
        None => tree.roots(),
    };

    let mut best = CriticalPath::default();
    for root in roots {
        let candidate = longest_walk(tree, &root);
        if candidate.total_duration > best.total_duration {
            best = candidate;
        }
    }
    best
}

fn longest_walk(tree: &TaskTree, id: &str) -> CriticalPath {
    let own = u64::from(tree.get(id).map(|task| task.duration).unwrap_or(0));
    let mut best_tail = CriticalPath::default();
    for child in tree.children(id) {
        let candidate = longest_walk(tree, child);
        if candidate.total_duration > best_tail.total_duration {
            best_tail = candidate;
        }
    }
    let mut task_ids = vec![id.to_string()];
    task_ids.extend(best_tail.task_ids);
    CriticalPath {
        total_duration: own + best_tail.total_duration,
        task_ids,
    }
}
