//! Run orchestration: gather files, select tools, execute, aggregate,
//! persist.
//!
//! The engine is the seam every entry point shares. The CLI, the git hooks,
//! and the JSON-RPC server all funnel into [`Engine::run_validation`]; the
//! non-blocking hook path wraps it in [`Engine::execute_nonblocking`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::adapter::{Adapter, SelectionContext};
use crate::dispatch::Dispatcher;
use crate::executor::{ExecutorOptions, ParallelExecutor, ProgressCallback, ProgressStatus, ToolTask};
use crate::manager::ProcessManager;
use crate::output::{ResultsByFile, group_by_file};
use crate::process;
use crate::progress::{ProgressDisplay, ToolState};
use crate::types::{
    RunSummary, ToolResult, ValidationRun, file_strings, new_run_id,
};

/// Directories never walked for validation input.
const SKIP_DIRS: [&str; 6] = [".git", "target", "node_modules", ".venv", "__pycache__", ".huskycat"];

/// Outcome of one orchestrated run.
pub struct RunOutcome {
    pub run: ValidationRun,
    pub results_by_file: ResultsByFile,
    pub summary: RunSummary,
    pub tool_results: BTreeMap<String, ToolResult>,
}

pub struct Engine {
    dispatcher: Arc<Dispatcher>,
    manager: ProcessManager,
}

impl Engine {
    pub fn new(dispatcher: Arc<Dispatcher>, manager: ProcessManager) -> Self {
        Self {
            dispatcher,
            manager,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Run the full orchestration over `files` with the adapter's policies.
    ///
    /// `run_id` is supplied by the non-blocking fork path so the record
    /// matches the PID record; everyone else gets a fresh one.
    pub fn run_validation(
        &self,
        files: &[PathBuf],
        adapter: &dyn Adapter,
        fix: bool,
        run_id: Option<String>,
    ) -> Result<RunOutcome> {
        self.run_validation_cancellable(files, adapter, fix, run_id, None)
    }

    /// [`Engine::run_validation`] with a cancellation flag the executor
    /// polls at level boundaries; used by the async task server.
    pub fn run_validation_cancellable(
        &self,
        files: &[PathBuf],
        adapter: &dyn Adapter,
        fix: bool,
        run_id: Option<String>,
        cancel: Option<Arc<std::sync::atomic::AtomicBool>>,
    ) -> Result<RunOutcome> {
        let started = Utc::now();
        let pid = std::process::id() as i32;
        let run_id = run_id.unwrap_or_else(|| new_run_id(started, pid));

        let available = self.dispatcher.available_tools();
        let config = self.dispatcher.config();
        let ctx = SelectionContext {
            registry: self.dispatcher.registry(),
            available: &available,
            files,
            configured: config.tools.enabled.as_deref(),
        };
        let selection = adapter.tool_selection(&ctx);

        let executor = ParallelExecutor::new(
            &selection,
            &self.dispatcher.registry().dependency_map(),
            ExecutorOptions {
                fail_fast: adapter.config().fail_fast,
                ..ExecutorOptions::default()
            },
        )?;

        let stats = executor.stats();
        tracing::debug!(
            tools = stats.tool_count,
            levels = stats.level_count,
            max_parallelism = stats.max_parallelism,
            "built level schedule"
        );

        let mut tasks: BTreeMap<String, ToolTask> = BTreeMap::new();
        for tool in &selection {
            let spec = self.dispatcher.registry().get(tool)?;
            let apply_fix = fix && self.fix_allowed(adapter, spec.fix);
            tasks.insert(tool.clone(), self.dispatcher.make_task(tool, files, apply_fix));
        }

        let mut display = if adapter.config().progress {
            let mut display = ProgressDisplay::new();
            display.start(&selection.iter().cloned().collect::<Vec<_>>());
            Some(Arc::new(display))
        } else {
            None
        };

        let progress_cb: Option<ProgressCallback> = display.as_ref().map(|display| {
            let display = Arc::clone(display);
            let cb: ProgressCallback = Arc::new(Mutex::new(
                move |tool: &str, status: ProgressStatus, errors: usize, warnings: usize| {
                    let state = match status {
                        ProgressStatus::Running => ToolState::Running,
                        ProgressStatus::Success => ToolState::Success,
                        ProgressStatus::Failed | ProgressStatus::TimedOut => ToolState::Failed,
                        ProgressStatus::Skipped => ToolState::Skipped,
                    };
                    display.update_tool(tool, state, Some(errors), Some(warnings), None);
                },
            ));
            cb
        });

        let report = executor.run(tasks, progress_cb, cancel);

        if let Some(display) = display.take() {
            // The refresh thread is gone once every worker finished; tear
            // the panel down before printing results.
            if let Ok(mut display) = Arc::try_unwrap(display).map_err(|_| ()) {
                display.stop();
            }
        }

        let completed = Utc::now();
        let results_by_file =
            group_by_file(report.results.values().flat_map(|r| r.results.clone()));
        let errors: usize = report.results.values().map(|r| r.error_count).sum();
        let warnings: usize = report.results.values().map(|r| r.warning_count).sum();

        let summary = RunSummary {
            total_files: files.len(),
            tools_run: report.results.keys().cloned().collect(),
            errors,
            warnings,
            duration_ms: report.duration_ms,
            success: report.success,
        };

        let run = ValidationRun {
            run_id,
            started,
            completed,
            files: file_strings(files),
            success: report.success,
            tools_run: summary.tools_run.clone(),
            errors,
            warnings,
            exit_code: i32::from(!report.success),
            pid,
        };

        // Store failures are logged, never fatal: the caller still gets the
        // in-memory outcome.
        if let Err(err) = self.manager.store().save_run(&run) {
            tracing::warn!(%err, "failed to persist run record");
        }

        Ok(RunOutcome {
            run,
            results_by_file,
            summary,
            tool_results: report.results,
        })
    }

    fn fix_allowed(&self, adapter: &dyn Adapter, tier: crate::types::FixConfidence) -> bool {
        let policy = &adapter.config().fix_policy;
        if policy.should_auto_fix(tier) {
            return true;
        }
        if policy.should_prompt_for_fix(tier)
            && adapter.config().interactive
            && atty::is(atty::Stream::Stdin)
        {
            return prompt_yes_no(&format!(
                "apply {tier:?}-confidence fixes? [y/N] "
            ));
        }
        false
    }

    /// The non-blocking hook flow: gate on the previous run, suppress
    /// duplicates, then fork a child that does the real work.
    ///
    /// Returns the child pid, or `None` when a live run already covers the
    /// same files. A failed previous run that the user does not wave
    /// through is an error carrying exit semantics for the hook.
    pub fn execute_nonblocking(
        &self,
        files: &[PathBuf],
        adapter: &dyn Adapter,
        fix: bool,
    ) -> Result<Option<i32>> {
        if let Some(previous) = self.manager.check_previous_run()? {
            if !self
                .manager
                .handle_previous_failure(&previous, adapter.config().interactive)
            {
                anyhow::bail!(
                    "previous validation failed ({} errors, run {})",
                    previous.errors,
                    previous.run_id
                );
            }
        }

        if self.manager.is_running(files)? {
            tracing::debug!("validation already running for this file set");
            return Ok(None);
        }

        let run_id = new_run_id(Utc::now(), std::process::id() as i32);
        let files_owned = files.to_vec();
        let pid = self.manager.fork_validation(&run_id, files, || {
            match self.run_validation(&files_owned, adapter, fix, Some(run_id.clone())) {
                Ok(outcome) => outcome.run.exit_code,
                Err(err) => {
                    eprintln!("huskycat: background validation failed: {err:#}");
                    2
                }
            }
        })?;

        Ok(Some(pid))
    }
}

fn prompt_yes_no(question: &str) -> bool {
    use std::io::{BufRead, Write};
    eprint!("{question}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Walk `root` for validatable files, skipping VCS and build debris.
pub fn gather_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to list directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if entry.file_type()?.is_dir() {
            if SKIP_DIRS.contains(&name.as_str()) || name.starts_with('.') && name != ".github" {
                continue;
            }
            walk(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// The staged file set, as git sees it.
pub fn staged_files(repo_root: &Path) -> Result<Vec<PathBuf>> {
    let out = process::run_with_timeout(
        "git",
        &[
            "diff".to_string(),
            "--cached".to_string(),
            "--name-only".to_string(),
            "--diff-filter=ACM".to_string(),
        ],
        repo_root,
        Duration::from_secs(10),
    )?;

    if !out.success() {
        anyhow::bail!("git diff --cached failed: {}", out.stderr.trim());
    }

    Ok(out
        .stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| repo_root.join(l.trim()))
        .collect())
}
