use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[allow(dead_code)]
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join(".gantry")
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = gantry_cmd();
        cmd.current_dir(self.dir.path());
        cmd
    }

    /// Runs `gantry add` with the given extra args and returns the new task id.
    #[allow(dead_code)]
    pub fn add(&self, title: &str, extra: &[&str]) -> String {
        let output = self
            .cmd()
            .args(["add", title, "--json"])
            .args(extra)
            .output()
            .expect("run gantry add");
        assert!(
            output.status.success(),
            "add failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let envelope = parse_envelope(&output.stdout);
        envelope["data"]["id"]
            .as_str()
            .expect("task id in add output")
            .to_string()
    }

    /// Exports the current tree and returns the tasks array from the snapshot.
    #[allow(dead_code)]
    pub fn export(&self) -> Vec<Value> {
        let file = self.dir.path().join("export.json");
        self.cmd()
            .args(["export"])
            .arg(&file)
            .assert()
            .success();
        let bytes = std::fs::read(&file).expect("read export file");
        let snapshot: Value = serde_json::from_slice(&bytes).expect("parse snapshot");
        snapshot["tasks"]
            .as_array()
            .expect("tasks array in snapshot")
            .clone()
    }

    /// Looks up a single exported task by id.
    #[allow(dead_code)]
    pub fn exported_task(&self, id: &str) -> Value {
        self.export()
            .into_iter()
            .find(|task| task["id"] == id)
            .unwrap_or_else(|| panic!("task {id} not in export"))
    }
}

pub fn gantry_cmd() -> Command {
    Command::cargo_bin("gantry").expect("binary")
}

pub fn parse_envelope(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("json envelope")
}
