//! On-disk run history.
//!
//! Layout under the cache root (default: repo-local `.huskycat/runs/`):
//!
//! - `<cache>/<run_id>.json`: one record per completed run
//! - `<cache>/last_run.json`: copy of the most recently completed run
//! - `<cache>/pids/<pid>.json`: live-run marker, one per in-flight child
//! - `<cache>/logs/<run_id>.log`: captured child output
//!
//! All writes go through a temp-file-then-rename so a crash never leaves a
//! partially written record. `last_run.json` is replaced only after the
//! per-run file is durable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::types::{PidRecord, ValidationRun};

pub const LAST_RUN_FILE: &str = "last_run.json";

/// History listing bounds (caller-supplied limits are clamped into this).
pub const HISTORY_LIMIT_MIN: usize = 1;
pub const HISTORY_LIMIT_MAX: usize = 100;

#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Repo-local default: `<repo>/.huskycat/runs`.
    pub fn default_in(repo_root: &Path) -> Self {
        Self::new(repo_root.join(".huskycat").join("runs"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{run_id}.json"))
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.root.join(LAST_RUN_FILE)
    }

    pub fn pids_dir(&self) -> PathBuf {
        self.root.join("pids")
    }

    pub fn pid_path(&self, pid: i32) -> PathBuf {
        self.pids_dir().join(format!("{pid}.json"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_path(&self, run_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{run_id}.log"))
    }

    /// Persist a completed run: per-run record first, then the `last_run`
    /// pointer, so the pointer always names an existing record.
    pub fn save_run(&self, run: &ValidationRun) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create run cache {}", self.root.display()))?;

        atomic_write_json(&self.run_path(&run.run_id), run)?;
        atomic_write_json(&self.last_run_path(), run)
    }

    pub fn load_run(&self, run_id: &str) -> Result<Option<ValidationRun>> {
        load_json(&self.run_path(run_id))
    }

    pub fn last_run(&self) -> Result<Option<ValidationRun>> {
        load_json(&self.last_run_path())
    }

    /// Completed runs, newest first. `limit` is clamped to 1..=100.
    pub fn history(&self, limit: usize) -> Result<Vec<ValidationRun>> {
        let limit = limit.clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX);

        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("failed to list run cache {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == LAST_RUN_FILE || !name.ends_with(".json") {
                continue;
            }
            ids.push(name.trim_end_matches(".json").to_string());
        }

        // run_id is timestamp-prefixed, so the lexicographic order is the
        // chronological one.
        ids.sort();
        ids.reverse();

        let mut runs = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Some(run) = self.load_run(&id)? {
                runs.push(run);
            }
        }
        Ok(runs)
    }

    pub fn write_pid_record(&self, record: &PidRecord) -> Result<()> {
        let dir = self.pids_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create pid dir {}", dir.display()))?;
        atomic_write_json(&self.pid_path(record.pid), record)
    }

    pub fn remove_pid_record(&self, pid: i32) -> Result<()> {
        let path = self.pid_path(pid);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove pid record {}", path.display()))?;
        }
        Ok(())
    }

    /// All PID records on disk, live or not.
    pub fn pid_records(&self) -> Result<Vec<PidRecord>> {
        let dir = self.pids_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to list pid dir {}", dir.display()))?
        {
            let entry = entry?;
            if let Some(record) = load_json::<PidRecord>(&entry.path())? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }

    /// Live runs. Records whose process is gone are deleted before this
    /// returns, so a record exists iff a run is believed live.
    pub fn running_validations(&self) -> Result<Vec<PidRecord>> {
        let mut live = Vec::new();
        for record in self.pid_records()? {
            if process_alive(record.pid) {
                live.push(record);
            } else {
                tracing::debug!(pid = record.pid, run_id = %record.run_id, "reaping stale pid record");
                self.remove_pid_record(record.pid)?;
            }
        }
        Ok(live)
    }
}

/// Signal-0 probe. EPERM means the process exists but is not ours.
pub fn process_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse JSON {}", path.display()))?;
    Ok(Some(value))
}

fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;

    {
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("failed to create tmp file {}", tmp.display()))?;
        f.write_all(&data)
            .with_context(|| format!("failed to write tmp file {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}
