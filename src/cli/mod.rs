//! Command-line interface for gantry
//!
//! This module defines the CLI structure using clap derive macros.
//! Subcommands live in their own submodules: task edits in `task`,
//! derived views in `show`, file exchange and configuration in `data`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::output::OutputOptions;
use crate::project::Project;
use crate::storage::FileGateway;

mod data;
mod show;
mod task;

/// gantry - hierarchical task timelines
///
/// Tracks a project as a tree of tasks with duration rollups, working-day
/// scheduling, cascading date propagation and an approximate critical path.
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding the task snapshot and configuration
    #[arg(long, global = true, env = "GANTRY_DIR", default_value = ".gantry")]
    pub data_dir: PathBuf,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Parent task id (omit for a root task)
        #[arg(long)]
        parent: Option<String>,

        /// Duration in working days
        #[arg(long, default_value_t = 1)]
        duration: u32,

        /// Start date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<String>,

        /// Status: planned, in_progress, blocked, done
        #[arg(long, default_value = "planned")]
        status: String,

        /// Priority: low, normal, high, critical
        #[arg(long, default_value = "normal")]
        priority: String,

        /// Keep the end date fixed when the duration changes
        #[arg(long)]
        anchor_end: bool,
    },

    /// Re-parent a task (and its subtree)
    Move {
        /// Task id to move
        id: String,

        /// New parent task id (omit to make the task a root)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Delete a task
    Rm {
        /// Task id to delete
        id: String,

        /// Strategy: cascade (remove subtree) or promote (lift children)
        #[arg(long, default_value = "cascade")]
        strategy: String,
    },

    /// Edit a task's fields
    Set {
        /// Task id to edit
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// Duration in working days
        #[arg(long)]
        duration: Option<u32>,

        /// Start date (YYYY-MM-DD); requires --end
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD); requires --start
        #[arg(long)]
        end: Option<String>,

        /// Status: planned, in_progress, blocked, done
        #[arg(long)]
        status: Option<String>,

        /// Priority: low, normal, high, critical
        #[arg(long)]
        priority: Option<String>,

        /// Whether duration edits keep the end date fixed
        #[arg(long)]
        anchor_end: Option<bool>,
    },

    /// Shift a task's span (and its subtree) by whole days
    Shift {
        /// Task id to shift
        id: String,

        /// Delta in calendar days (negative shifts earlier)
        #[arg(long, allow_hyphen_values = true)]
        days: i64,
    },

    /// Revert the most recent date adjustment
    Undo,

    /// Print the derived timeline
    Show,

    /// Print the approximate critical path
    Path {
        /// Scope to the subtree rooted at this task id
        id: Option<String>,
    },

    /// Validate the tree and report repairs
    Check,

    /// Import a flat task list from a JSON file (validated on entry)
    Import {
        /// Path to a JSON file with a task array or snapshot
        file: PathBuf,
    },

    /// Export the flat task list to a JSON file
    Export {
        /// Destination path
        file: PathBuf,
    },

    /// Show or update configuration
    Config {
        /// Nesting ceiling (1-100)
        #[arg(long)]
        max_depth: Option<u32>,

        /// Weekly non-working day, e.g. "sunday"
        #[arg(long)]
        rest_day: Option<String>,

        /// Rollup conflict policy: prefer-children, prefer-own, average, max, min
        #[arg(long)]
        conflict_policy: Option<String>,
    },
}

/// Shared per-invocation context for command handlers.
pub(crate) struct CliContext {
    pub data_dir: PathBuf,
    pub options: OutputOptions,
}

impl CliContext {
    pub fn config(&self) -> Config {
        Config::load_from_dir(&self.data_dir)
    }

    pub fn open_project(&self) -> Result<Project> {
        let gateway = FileGateway::new(&self.data_dir);
        Project::open(Box::new(gateway), self.config())
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let ctx = CliContext {
            data_dir: self.data_dir,
            options: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        };

        match self.command {
            Commands::Add {
                title,
                parent,
                duration,
                start,
                status,
                priority,
                anchor_end,
            } => task::run_add(
                &ctx,
                task::AddOptions {
                    title,
                    parent,
                    duration,
                    start,
                    status,
                    priority,
                    anchor_end,
                },
            ),
            Commands::Move { id, parent } => task::run_move(&ctx, &id, parent.as_deref()),
            Commands::Rm { id, strategy } => task::run_rm(&ctx, &id, &strategy),
            Commands::Set {
                id,
                title,
                duration,
                start,
                end,
                status,
                priority,
                anchor_end,
            } => task::run_set(
                &ctx,
                &id,
                task::SetOptions {
                    title,
                    duration,
                    start,
                    end,
                    status,
                    priority,
                    anchor_end,
                },
            ),
            Commands::Shift { id, days } => task::run_shift(&ctx, &id, days),
            Commands::Undo => task::run_undo(&ctx),
            Commands::Show => show::run_show(&ctx),
            Commands::Path { id } => show::run_path(&ctx, id.as_deref()),
            Commands::Check => show::run_check(&ctx),
            Commands::Import { file } => data::run_import(&ctx, &file),
            Commands::Export { file } => data::run_export(&ctx, &file),
            Commands::Config {
                max_depth,
                rest_day,
                conflict_policy,
            } => data::run_config(&ctx, max_depth, rest_day, conflict_policy),
        }
    }
}
