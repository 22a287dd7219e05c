//! gantry - Hierarchical Task Scheduling Library
//!
//! This library provides the core functionality for the gantry CLI tool,
//! keeping a tree of tasks structurally sound while rolling durations up
//! the hierarchy and deriving working-day schedules from them.
//!
//! # Core Concepts
//!
//! - **Task Tree**: Parent/child hierarchy with per-node nesting levels
//! - **Validation**: Self-repair of dangling parents, cycles, and levels
//! - **Aggregation**: Duration rollups with configurable conflict policies
//! - **Working Days**: Calendar arithmetic that skips a weekly rest day
//! - **Timeline**: Chart rows and an approximate critical path
//! - **Undo**: Single-slot restore of the last date adjustment
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `gantry.toml`
//! - `error`: Error types and result aliases
//! - `task`: Task records, statuses, and priorities
//! - `tree`: In-memory tree index with cycle-safe walks
//! - `validate`: Structural validator and repair reporting
//! - `aggregate`: Duration rollups and conflict resolution
//! - `schedule`: Working-day calendar and date propagation
//! - `mutate`: Create, move, and delete operations
//! - `timeline`: Timeline derivation and critical path
//! - `undo`: Date adjustment snapshots and restore
//! - `project`: Facade wiring the engine to persistence
//! - `storage`: Persistence gateways and snapshot codecs
//! - `lock`: File locking and atomic writes for concurrency safety

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod mutate;
pub mod output;
pub mod project;
pub mod schedule;
pub mod storage;
pub mod task;
pub mod timeline;
pub mod tree;
pub mod undo;
pub mod validate;

pub use error::{Error, Result};
