//! Durable key-value gateway for the engine's snapshot.
//!
//! The engine depends on a single durability boundary: a synchronous
//! key-value store with `get`/`set`/`remove`. The flat task collection is
//! serialized under one key after every successful mutation and revalidated
//! on every load, because persisted bytes are never assumed pre-valid.
//!
//! # Layout of the file-backed gateway
//!
//! ```text
//! <data-dir>/
//!   gantry.toml        # configuration (managed by config.rs, not keyed)
//!   tasks.json         # snapshot under the "tasks" key
//!   tasks.json.lock    # flock coordination for writers
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock::{self, DEFAULT_LOCK_TIMEOUT_MS};
use crate::task::{Task, TaskSnapshot, TASKS_SCHEMA_VERSION};

/// Key the full task snapshot is stored under.
pub const TASKS_KEY: &str = "tasks";

/// Key the reversible date-adjustment slot is stored under.
pub const UNDO_KEY: &str = "undo";

/// Synchronous persistence gateway.
///
/// `set` may refuse with `QuotaExceeded`; callers treat the in-memory tree
/// as the source of truth regardless of whether the durable write landed.
pub trait Gateway {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid storage key '{key}'"
        )))
    }
}

/// File-per-key gateway rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FileGateway {
    root: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota_bytes: None,
        }
    }

    /// Cap the byte size of any single value; larger writes fail with
    /// `QuotaExceeded` and leave the previous value intact.
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Gateway for FileGateway {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(lock::read_locked(&path, DEFAULT_LOCK_TIMEOUT_MS)?))
    }

    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        if let Some(limit) = self.quota_bytes {
            let needed = bytes.len() as u64;
            if needed > limit {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        fs::create_dir_all(&self.root)?;
        lock::write_atomic_locked(self.path_for(key), bytes, DEFAULT_LOCK_TIMEOUT_MS)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory gateway for tests and ephemeral trees.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    entries: HashMap<String, Vec<u8>>,
    quota_bytes: Option<u64>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }
}

impl Gateway for MemoryGateway {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        if let Some(limit) = self.quota_bytes {
            let needed = bytes.len() as u64;
            if needed > limit {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}

/// Serialize the flat task list into snapshot bytes.
pub fn encode_snapshot(tasks: Vec<Task>) -> Result<Vec<u8>> {
    let snapshot = TaskSnapshot::new(tasks);
    Ok(serde_json::to_vec_pretty(&snapshot)?)
}

/// Deserialize snapshot bytes back into a flat task list.
///
/// Only I/O-level deserialization failure is fatal here; structural issues
/// inside the records are the validator's to repair. An unknown schema
/// version is rejected so a future format does not get silently mangled.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Task>> {
    let snapshot: TaskSnapshot = serde_json::from_slice(bytes)?;
    if snapshot.schema_version != TASKS_SCHEMA_VERSION {
        return Err(Error::OperationFailed(format!(
            "unsupported snapshot schema '{}' (expected '{}')",
            snapshot.schema_version, TASKS_SCHEMA_VERSION
        )));
    }
    Ok(snapshot.tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Calendar;
    use crate::task::TaskFields;
    use tempfile::TempDir;

    #[test]
    fn file_gateway_round_trips_values() {
        let dir = TempDir::new().unwrap();
        let mut gateway = FileGateway::new(dir.path());

        assert!(gateway.get("tasks").unwrap().is_none());
        gateway.set("tasks", b"[1,2,3]").unwrap();
        assert_eq!(gateway.get("tasks").unwrap().unwrap(), b"[1,2,3]");

        gateway.remove("tasks").unwrap();
        assert!(gateway.get("tasks").unwrap().is_none());
        // Removing an absent key is not an error.
        gateway.remove("tasks").unwrap();
    }

    #[test]
    fn quota_failure_preserves_the_previous_value() {
        let dir = TempDir::new().unwrap();
        let mut gateway = FileGateway::new(dir.path()).with_quota(8);
        gateway.set("tasks", b"short").unwrap();

        let err = gateway.set("tasks", b"far too many bytes");
        assert!(matches!(err, Err(Error::QuotaExceeded { .. })));
        assert_eq!(gateway.get("tasks").unwrap().unwrap(), b"short");
    }

    #[test]
    fn keys_with_path_separators_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut gateway = FileGateway::new(dir.path());
        assert!(gateway.set("../escape", b"x").is_err());
        assert!(gateway.get("a/b").is_err());
        assert!(gateway.set("", b"x").is_err());
    }

    #[test]
    fn memory_gateway_honors_quota() {
        let mut gateway = MemoryGateway::new().with_quota(4);
        gateway.set("k", b"ok").unwrap();
        assert!(matches!(
            gateway.set("k", b"too long"),
            Err(Error::QuotaExceeded { .. })
        ));
        assert_eq!(gateway.get("k").unwrap().unwrap(), b"ok");
    }

    #[test]
    fn snapshot_encode_decode_round_trips() {
        let task = Task::create(
            TaskFields {
                title: "t".to_string(),
                ..TaskFields::default()
            },
            None,
            0,
            &Calendar::default(),
        )
        .unwrap();
        let bytes = encode_snapshot(vec![task.clone()]).unwrap();
        let decoded = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, task.id);
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let bytes = br#"{"schema_version":"gantry.tasks.v9","generated_at":"2024-01-01T00:00:00Z","tasks":[]}"#;
        assert!(decode_snapshot(bytes).is_err());
    }
}
