//! Background execution of validation runs.
//!
//! The git-hook path forks a detached child so `git commit` gets its shell
//! back immediately; the child runs the full validation, persists a run
//! record, and exits. The parent never waits. Failures surface on the next
//! hook invocation through [`ProcessManager::check_previous_run`].

use std::fs;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use nix::unistd::{ForkResult, dup2_stderr, dup2_stdin, dup2_stdout, fork, setsid};

use crate::runstore::RunStore;
use crate::types::{PidRecord, ValidationRun, file_strings};

pub struct ProcessManager {
    store: RunStore,
}

impl ProcessManager {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Fork a detached background validator.
    ///
    /// Parent branch: reap stale PID records, write the child's PID record,
    /// and return the child pid without waiting on the child.
    ///
    /// Child branch: new session, stdio redirected to the per-run log file,
    /// then `child()` runs the validation and its return value becomes the
    /// process exit code. The child deletes its own PID record last, so the
    /// record exists for exactly as long as the run is believed live.
    ///
    /// Must be called before the process spawns worker threads.
    #[allow(unsafe_code)]
    pub fn fork_validation<F>(&self, run_id: &str, files: &[PathBuf], child: F) -> Result<i32>
    where
        F: FnOnce() -> i32,
    {
        self.cleanup_zombies().ok();

        let log_path = self.store.log_path(run_id);
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log dir {}", parent.display()))?;
        }

        // SAFETY-adjacent carve-out: fork(2) has no safe wrapper. The child
        // only touches its own fds and the run store before exiting.
        match unsafe { fork() }.context("fork failed")? {
            ForkResult::Parent { child } => {
                let pid = child.as_raw();
                let record = PidRecord {
                    pid,
                    run_id: run_id.to_string(),
                    files: file_strings(files),
                    started_at: Utc::now(),
                };
                if let Err(err) = self.store.write_pid_record(&record) {
                    tracing::warn!(%err, "failed to write pid record");
                }
                Ok(pid)
            }
            ForkResult::Child => {
                let code = self.run_child(&log_path, child);
                self.store
                    .remove_pid_record(std::process::id() as i32)
                    .ok();
                std::process::exit(code);
            }
        }
    }

    /// Detach from the terminal and point stdio at the log file, then run
    /// the validation callable.
    fn run_child<F>(&self, log_path: &std::path::Path, child: F) -> i32
    where
        F: FnOnce() -> i32,
    {
        setsid().ok();

        if let Ok(log) = fs::File::create(log_path) {
            dup2_stdout(&log).ok();
            dup2_stderr(&log).ok();
        }
        if let Ok(devnull) = fs::File::open("/dev/null") {
            dup2_stdin(&devnull).ok();
        }

        child()
    }

    /// The previous run, if it failed. A clean or absent last run is `None`.
    pub fn check_previous_run(&self) -> Result<Option<ValidationRun>> {
        match self.store.last_run()? {
            Some(run) if !run.success => Ok(Some(run)),
            _ => Ok(None),
        }
    }

    /// Decide whether to proceed past a failed previous run.
    ///
    /// Interactive on a TTY: prompt `[c]ontinue / [a]bort / [r]etry` with
    /// abort as the default. `r` re-reads the store once in case a
    /// background retry has finished. Everything else blocks the commit.
    pub fn handle_previous_failure(&self, run: &ValidationRun, interactive: bool) -> bool {
        if !interactive || !std::io::stdin().is_terminal() {
            eprintln!(
                "huskycat: previous validation failed ({} errors, run {})",
                run.errors, run.run_id
            );
            eprintln!("huskycat: commit blocked; fix the findings or rerun validation");
            return false;
        }

        let mut retried = false;
        loop {
            eprint!(
                "huskycat: previous validation failed ({} errors). [c]ontinue / [a]bort / [r]etry (default a): ",
                run.errors
            );
            std::io::stderr().flush().ok();

            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).is_err() {
                return false;
            }

            match line.trim().to_lowercase().as_str() {
                "c" | "continue" => return true,
                "r" | "retry" if !retried => {
                    retried = true;
                    match self.check_previous_run() {
                        Ok(None) => return true,
                        _ => continue,
                    }
                }
                _ => return false,
            }
        }
    }

    /// Whether a live background run already covers any of `files`.
    pub fn is_running(&self, files: &[PathBuf]) -> Result<bool> {
        let names = file_strings(files);
        let running = self.store.running_validations()?;
        Ok(running
            .iter()
            .any(|rec| rec.files.iter().any(|f| names.contains(f))))
    }

    /// Delete PID records whose process is gone. Returns how many were
    /// reaped.
    pub fn cleanup_zombies(&self) -> Result<usize> {
        let before = self.store.pid_records()?.len();
        let live = self.store.running_validations()?.len();
        Ok(before - live)
    }
}
