//! Error types for gantry
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task, invalid config)
//! - 3: Constraint violation (nesting limit, cyclic re-parent, bad date range)
//! - 4: Operation failed (I/O, serialization, storage quota, lock contention)
//!
//! Structural corruption (dangling parents, cycles, level drift) is never an
//! error: the validator repairs it and reports diagnostics only.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Exit codes for the gantry CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const CONSTRAINT_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for gantry operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    // Constraint violations (exit code 3)
    #[error("Nesting limit exceeded: level {level} reaches the ceiling of {ceiling}")]
    NestingLimitExceeded { level: u32, ceiling: u32 },

    #[error("Cyclic re-parent: {new_parent} is {task_id} itself or one of its descendants")]
    CyclicReparent {
        task_id: String,
        new_parent: String,
    },

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    // Operation failures (exit code 4)
    #[error("Storage quota exceeded writing '{key}': {needed} bytes over a {limit} byte limit")]
    QuotaExceeded {
        key: String,
        needed: u64,
        limit: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::TaskNotFound(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::NothingToUndo => exit_codes::USER_ERROR,

            // Constraint violations
            Error::NestingLimitExceeded { .. }
            | Error::CyclicReparent { .. }
            | Error::InvalidDateRange { .. } => exit_codes::CONSTRAINT_BLOCKED,

            // Operation failures
            Error::QuotaExceeded { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured detail payload for `--json` error envelopes
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NestingLimitExceeded { level, ceiling } => Some(serde_json::json!({
                "level": level,
                "ceiling": ceiling,
            })),
            Error::CyclicReparent {
                task_id,
                new_parent,
            } => Some(serde_json::json!({
                "task_id": task_id,
                "new_parent": new_parent,
            })),
            Error::InvalidDateRange { start, end } => Some(serde_json::json!({
                "start": start.to_string(),
                "end": end.to_string(),
            })),
            Error::QuotaExceeded { key, needed, limit } => Some(serde_json::json!({
                "key": key,
                "needed": needed,
                "limit": limit,
            })),
            _ => None,
        }
    }
}

/// Result type alias for gantry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
