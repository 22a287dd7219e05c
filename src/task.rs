//! Task records and closed enumerations.
//!
//! A task is one node in the project hierarchy. Children are never stored on
//! the record; they are always derived by indexing on `parent` (see
//! [`crate::tree::TaskTree`]). Tasks are constructed only through
//! [`Task::create`] so that ids, levels and date spans have a single origin.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::schedule::Calendar;

/// Snapshot schema identifier written alongside persisted task lists.
pub const TASKS_SCHEMA_VERSION: &str = "gantry.tasks.v1";

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Planned,
    InProgress,
    Blocked,
    Done,
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(Status::Planned),
            "in_progress" | "in-progress" | "active" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "done" => Ok(Status::Done),
            other => Err(Error::InvalidArgument(format!(
                "unknown status '{other}' (expected planned|in_progress|blocked|done)"
            ))),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Planned => "planned",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Done => "done",
        };
        f.write_str(name)
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(Error::InvalidArgument(format!(
                "unknown priority '{other}' (expected low|normal|high|critical)"
            ))),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A single node of the project hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    /// Back-reference to the parent task; `None` marks a root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Cached zero-based depth; reconciled by the validator.
    pub level: u32,
    /// Own duration in working days, always >= 1.
    pub duration: u32,
    /// Bottom-up rollup of the subtree; recomputed, never authored.
    #[serde(default)]
    pub aggregated_duration: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// When true, duration edits keep `end_date` fixed and move `start_date`.
    #[serde(default)]
    pub anchor_end: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    /// Cached "has children" flag; reconciled against the index on validation.
    #[serde(default)]
    pub has_children: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating a task.
#[derive(Debug, Clone)]
pub struct TaskFields {
    pub title: String,
    pub duration: u32,
    pub start_date: Option<NaiveDate>,
    pub status: Status,
    pub priority: Priority,
    pub anchor_end: bool,
}

impl Default for TaskFields {
    fn default() -> Self {
        Self {
            title: String::new(),
            duration: 1,
            start_date: None,
            status: Status::default(),
            priority: Priority::default(),
            anchor_end: false,
        }
    }
}

impl Task {
    /// Construct a new task at the given level.
    ///
    /// This is the only place ids are minted. The end date is derived from
    /// the start date and duration using working-day stepping; a missing
    /// start date defaults to today.
    pub fn create(
        fields: TaskFields,
        parent: Option<String>,
        level: u32,
        calendar: &Calendar,
    ) -> Result<Self> {
        if fields.title.trim().is_empty() {
            return Err(Error::InvalidArgument("title cannot be empty".to_string()));
        }
        if fields.duration == 0 {
            return Err(Error::InvalidArgument(
                "duration must be at least 1 working day".to_string(),
            ));
        }

        let start_date = fields
            .start_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let end_date = calendar.add_working_days(start_date, fields.duration);
        let now = Utc::now();

        Ok(Task {
            id: Ulid::new().to_string().to_ascii_lowercase(),
            title: fields.title.trim().to_string(),
            parent,
            level,
            duration: fields.duration,
            aggregated_duration: fields.duration,
            start_date,
            end_date,
            anchor_end: fields.anchor_end,
            status: fields.status,
            priority: fields.priority,
            has_children: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Persisted form of the full flat task collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl TaskSnapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            schema_version: TASKS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            tasks,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn calendar() -> Calendar {
        Calendar::new(Weekday::Sun)
    }

    #[test]
    fn create_derives_end_date_from_duration() {
        let fields = TaskFields {
            title: "Build scaffolding".to_string(),
            duration: 3,
            start_date: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ..TaskFields::default()
        };
        let task = Task::create(fields, None, 0, &calendar()).expect("create");
        // Mon Jan 1 + 3 working days inclusive = Wed Jan 3
        assert_eq!(task.end_date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(task.aggregated_duration, 3);
        assert!(task.is_root());
        assert_eq!(task.level, 0);
    }

    #[test]
    fn create_rejects_empty_title_and_zero_duration() {
        let err = Task::create(TaskFields::default(), None, 0, &calendar());
        assert!(err.is_err());

        let fields = TaskFields {
            title: "x".to_string(),
            duration: 0,
            ..TaskFields::default()
        };
        assert!(Task::create(fields, None, 0, &calendar()).is_err());
    }

    #[test]
    fn status_and_priority_parse_round_trip() {
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().unwrap(), Status::Done);
        assert!("urgent".parse::<Status>().is_err());
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("p0".parse::<Priority>().is_err());
    }
}
