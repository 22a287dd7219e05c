//! gantry derived-view commands: show, path, check.

use serde::Serialize;

use crate::cli::CliContext;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::timeline::TimelineRow;
use crate::validate::RepairReport;

fn bar(row: &TimelineRow) -> String {
    let indent = "  ".repeat(row.level as usize);
    let offset = " ".repeat(row.offset_days.max(0) as usize);
    let span = "#".repeat(row.span_days.max(1) as usize);
    format!("{indent}{:<30} |{offset}{span}", truncate(&row.title, 30))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

pub fn run_show(ctx: &CliContext) -> Result<()> {
    let project = ctx.open_project()?;

    let Some(timeline) = project.timeline() else {
        let empty = serde_json::json!({ "rows": [] });
        let human = HumanOutput::new("No tasks yet");
        return emit_success(ctx.options, "show", &empty, Some(&human));
    };

    let mut human = HumanOutput::new(format!(
        "Timeline {} .. {}",
        timeline.window_start, timeline.window_end
    ));
    for row in &timeline.rows {
        human.push_detail(bar(row));
    }
    if !project.load_report().is_clean() {
        human.push_warning(format!(
            "{} structural repair(s) applied on load; run `gantry check` for details",
            project.load_report().len()
        ));
    }
    emit_success(ctx.options, "show", &timeline, Some(&human))
}

pub fn run_path(ctx: &CliContext, root_id: Option<&str>) -> Result<()> {
    let project = ctx.open_project()?;
    let path = project.critical_path(root_id);

    let mut human = HumanOutput::new("Approximate critical path");
    human.push_summary("total working days", path.total_duration.to_string());
    for id in &path.task_ids {
        if let Some(task) = project.tree().get(id) {
            human.push_detail(format!("{} ({} days) {}", task.id, task.duration, task.title));
        }
    }
    emit_success(ctx.options, "path", &path, Some(&human))
}

pub fn run_check(ctx: &CliContext) -> Result<()> {
    let mut project = ctx.open_project()?;
    let report = project.revalidate()?;

    #[derive(Serialize)]
    struct CheckReport<'a> {
        tasks: usize,
        repairs: &'a RepairReport,
        conflicts: usize,
    }

    let data = CheckReport {
        tasks: project.tree().len(),
        repairs: &report,
        conflicts: project.last_conflicts().len(),
    };

    let mut human = HumanOutput::new(if report.is_clean() {
        "Tree is structurally sound"
    } else {
        "Tree repaired"
    });
    human.push_summary("tasks", project.tree().len().to_string());
    human.push_summary("repairs", report.len().to_string());
    human.push_summary("conflicts", project.last_conflicts().len().to_string());
    for repair in &report.repairs {
        human.push_detail(format!("{}: {}", repair.task_id, repair.note));
    }
    emit_success(ctx.options, "check", &data, Some(&human))
}
