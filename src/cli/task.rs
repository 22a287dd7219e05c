//! gantry task mutation commands: add, move, rm, set, shift, undo.

use chrono::NaiveDate;
use serde::Serialize;

use crate::cli::CliContext;
use crate::error::{Error, Result};
use crate::mutate::DeleteStrategy;
use crate::output::{emit_success, HumanOutput};
use crate::project::Project;
use crate::task::TaskFields;

pub struct AddOptions {
    pub title: String,
    pub parent: Option<String>,
    pub duration: u32,
    pub start: Option<String>,
    pub status: String,
    pub priority: String,
    pub anchor_end: bool,
}

pub struct SetOptions {
    pub title: Option<String>,
    pub duration: Option<u32>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub anchor_end: Option<bool>,
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidArgument(format!("invalid date '{value}' (expected YYYY-MM-DD)")))
}

fn conflict_warning(project: &Project, human: &mut HumanOutput) {
    let conflicts = project.last_conflicts();
    if !conflicts.is_empty() {
        human.push_warning(format!(
            "{} aggregation conflict(s) resolved with the {} policy",
            conflicts.len(),
            project.config().aggregation.conflict_policy
        ));
    }
}

#[derive(Serialize)]
struct TaskSummary {
    id: String,
    title: String,
    level: u32,
    duration: u32,
    aggregated_duration: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

fn summarize(project: &Project, id: &str) -> Result<TaskSummary> {
    let task = project
        .tree()
        .get(id)
        .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
    Ok(TaskSummary {
        id: task.id.clone(),
        title: task.title.clone(),
        level: task.level,
        duration: task.duration,
        aggregated_duration: task.aggregated_duration,
        start_date: task.start_date,
        end_date: task.end_date,
    })
}

pub fn run_add(ctx: &CliContext, options: AddOptions) -> Result<()> {
    let mut project = ctx.open_project()?;
    let fields = TaskFields {
        title: options.title,
        duration: options.duration,
        start_date: options.start.as_deref().map(parse_date).transpose()?,
        status: options.status.parse()?,
        priority: options.priority.parse()?,
        anchor_end: options.anchor_end,
    };
    let id = project.create_task(options.parent.as_deref(), fields)?;

    let data = summarize(&project, &id)?;
    let mut human = HumanOutput::new(format!("Created task {id}"));
    human.push_summary("title", data.title.clone());
    human.push_summary("level", data.level.to_string());
    human.push_summary("span", format!("{} .. {}", data.start_date, data.end_date));
    conflict_warning(&project, &mut human);
    emit_success(ctx.options, "add", &data, Some(&human))
}

pub fn run_move(ctx: &CliContext, id: &str, parent: Option<&str>) -> Result<()> {
    let mut project = ctx.open_project()?;
    project.move_task(id, parent)?;

    let data = summarize(&project, id)?;
    let mut human = HumanOutput::new(format!("Moved task {id}"));
    human.push_summary(
        "parent",
        parent.map(str::to_string).unwrap_or_else(|| "(root)".to_string()),
    );
    human.push_summary("level", data.level.to_string());
    conflict_warning(&project, &mut human);
    emit_success(ctx.options, "move", &data, Some(&human))
}

pub fn run_rm(ctx: &CliContext, id: &str, strategy: &str) -> Result<()> {
    let strategy: DeleteStrategy = strategy.parse()?;
    let mut project = ctx.open_project()?;
    let removed = project.delete_task(id, strategy)?;

    #[derive(Serialize)]
    struct Removed {
        removed: Vec<String>,
    }

    let mut human = HumanOutput::new(format!("Deleted task {id}"));
    human.push_summary("removed", removed.len().to_string());
    conflict_warning(&project, &mut human);
    emit_success(ctx.options, "rm", &Removed { removed }, Some(&human))
}

pub fn run_set(ctx: &CliContext, id: &str, options: SetOptions) -> Result<()> {
    if options.start.is_some() != options.end.is_some() {
        return Err(Error::InvalidArgument(
            "--start and --end must be given together".to_string(),
        ));
    }

    let mut project = ctx.open_project()?;
    if let Some(title) = &options.title {
        project.set_title(id, title)?;
    }
    if let Some(status) = &options.status {
        project.set_status(id, status.parse()?)?;
    }
    if let Some(priority) = &options.priority {
        project.set_priority(id, priority.parse()?)?;
    }
    if let Some(anchor_end) = options.anchor_end {
        project.set_anchor_end(id, anchor_end)?;
    }
    if let (Some(start), Some(end)) = (&options.start, &options.end) {
        project.set_dates(id, parse_date(start)?, parse_date(end)?)?;
    }
    if let Some(duration) = options.duration {
        project.set_duration(id, duration)?;
    }

    let data = summarize(&project, id)?;
    let mut human = HumanOutput::new(format!("Updated task {id}"));
    human.push_summary("span", format!("{} .. {}", data.start_date, data.end_date));
    human.push_summary("duration", data.duration.to_string());
    conflict_warning(&project, &mut human);
    emit_success(ctx.options, "set", &data, Some(&human))
}

pub fn run_shift(ctx: &CliContext, id: &str, days: i64) -> Result<()> {
    let mut project = ctx.open_project()?;
    project.shift_span(id, days)?;

    let data = summarize(&project, id)?;
    let mut human = HumanOutput::new(format!("Shifted task {id} by {days} day(s)"));
    human.push_summary("span", format!("{} .. {}", data.start_date, data.end_date));
    conflict_warning(&project, &mut human);
    emit_success(ctx.options, "shift", &data, Some(&human))
}

pub fn run_undo(ctx: &CliContext) -> Result<()> {
    let mut project = ctx.open_project()?;
    let summary = project.undo_last_adjustment()?;

    let mut human = HumanOutput::new("Reverted the last date adjustment");
    human.push_summary("operation", summary.operation.clone());
    human.push_summary("restored", summary.restored.len().to_string());
    if !summary.skipped.is_empty() {
        human.push_warning(format!("{} task(s) no longer exist", summary.skipped.len()));
    }
    emit_success(ctx.options, "undo", &summary, Some(&human))
}
