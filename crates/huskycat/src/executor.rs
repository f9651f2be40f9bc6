//! Dependency-ordered parallel tool execution.
//!
//! Levels from the [`DependencyGraph`](crate::graph::DependencyGraph) are
//! processed in order; tools within a level run on a bounded pool of OS
//! threads. A tool whose upstream failed is recorded as skipped without
//! running. One failed tool never aborts the others except through the skip
//! rule or the explicit fail-fast option.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::graph::{DependencyGraph, GraphError, GraphStats};
use crate::types::{ToolResult, ToolStatus};

/// Boxed tool callable. Runs at most once, on a worker thread.
pub type ToolTask = Box<dyn FnOnce() -> ToolResult + Send + 'static>;

/// Live status reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Running,
    Success,
    Failed,
    Skipped,
    TimedOut,
}

/// Progress callback: `(tool, status, errors, warnings)`.
///
/// Calls are serialized under the mutex so observers see a consistent
/// sequence; per-tool transitions are monotone (running, then exactly one
/// terminal state).
pub type ProgressCallback = Arc<Mutex<dyn FnMut(&str, ProgressStatus, usize, usize) + Send>>;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub max_workers: usize,
    pub fail_fast: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_workers: 8,
            fail_fast: false,
        }
    }
}

/// Outcome of one executor run.
#[derive(Debug)]
pub struct ExecutorReport {
    /// One terminal result per tool, keyed by tool name.
    pub results: BTreeMap<String, ToolResult>,
    pub success: bool,
    pub duration_ms: u64,
}

pub struct ParallelExecutor {
    graph: DependencyGraph,
    options: ExecutorOptions,
}

impl ParallelExecutor {
    /// Build the level schedule for `tools`. Cycles are rejected here.
    pub fn new(
        tools: &BTreeSet<String>,
        dependencies: &BTreeMap<String, Vec<String>>,
        options: ExecutorOptions,
    ) -> Result<Self, GraphError> {
        let graph = DependencyGraph::new(tools, dependencies)?;
        Ok(Self { graph, options })
    }

    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    /// Run `tasks` level by level. Missing tasks for scheduled tools are
    /// recorded as failed rather than panicking.
    ///
    /// `cancel` is polled at level boundaries and before each dispatch; once
    /// set, everything not yet started is recorded as skipped.
    pub fn run(
        &self,
        mut tasks: BTreeMap<String, ToolTask>,
        progress: Option<ProgressCallback>,
        cancel: Option<Arc<AtomicBool>>,
    ) -> ExecutorReport {
        let start = Instant::now();
        let results: Arc<Mutex<BTreeMap<String, ToolResult>>> =
            Arc::new(Mutex::new(BTreeMap::new()));
        let mut saw_failure = false;

        for level in self.graph.levels() {
            let cancelled = cancel
                .as_ref()
                .is_some_and(|c| c.load(Ordering::SeqCst));
            let abandon_level = cancelled || (self.options.fail_fast && saw_failure);

            let mut runnable: Vec<(String, ToolTask)> = Vec::new();
            for tool in &level.tools {
                if abandon_level {
                    let reason = if cancelled { "cancelled" } else { "fail-fast" };
                    let mut result = ToolResult::skipped(tool, &[]);
                    result.error = Some(format!("skipped: {reason}"));
                    notify(&progress, tool, ProgressStatus::Skipped, 0, 0);
                    results
                        .lock()
                        .expect("results lock")
                        .insert(tool.clone(), result);
                    continue;
                }

                let failed_upstreams: Vec<String> = {
                    let res = results.lock().expect("results lock");
                    self.graph
                        .upstreams_of(tool)
                        .iter()
                        .filter(|u| res.get(*u).is_some_and(|r| !r.success))
                        .cloned()
                        .collect()
                };
                if !failed_upstreams.is_empty() {
                    record_skip(&results, &progress, tool, &failed_upstreams);
                    continue;
                }

                match tasks.remove(tool) {
                    Some(task) => runnable.push((tool.clone(), task)),
                    None => {
                        let r = ToolResult {
                            tool: tool.clone(),
                            success: false,
                            duration_ms: 0,
                            error_count: 1,
                            warning_count: 0,
                            output: String::new(),
                            status: ToolStatus::Failed,
                            error: Some("no task registered for scheduled tool".to_string()),
                            results: Vec::new(),
                        };
                        notify(&progress, tool, ProgressStatus::Failed, 1, 0);
                        results.lock().expect("results lock").insert(tool.clone(), r);
                    }
                }
            }

            // Dispatch this level in bounded chunks and wait for it to
            // quiesce before moving on.
            let pool = self.options.max_workers.max(1).min(runnable.len().max(1));
            let mut handles: Vec<thread::JoinHandle<()>> = Vec::new();
            let mut pending = runnable;

            while !pending.is_empty() {
                let chunk: Vec<(String, ToolTask)> = pending
                    .drain(..pool.min(pending.len()))
                    .collect();

                for (tool, task) in chunk {
                    let results = Arc::clone(&results);
                    let progress = progress.clone();

                    let handle = thread::spawn(move || {
                        notify(&progress, &tool, ProgressStatus::Running, 0, 0);

                        let result = match catch_unwind(AssertUnwindSafe(task)) {
                            Ok(r) => r,
                            Err(_) => ToolResult {
                                tool: tool.clone(),
                                success: false,
                                duration_ms: 0,
                                error_count: 1,
                                warning_count: 0,
                                output: String::new(),
                                status: ToolStatus::Failed,
                                error: Some("tool panicked".to_string()),
                                results: Vec::new(),
                            },
                        };

                        let status = match result.status {
                            ToolStatus::Completed => ProgressStatus::Success,
                            ToolStatus::Failed => ProgressStatus::Failed,
                            ToolStatus::Skipped => ProgressStatus::Skipped,
                            ToolStatus::TimedOut => ProgressStatus::TimedOut,
                        };
                        notify(
                            &progress,
                            &tool,
                            status,
                            result.error_count,
                            result.warning_count,
                        );

                        results
                            .lock()
                            .expect("results lock")
                            .insert(tool.clone(), result);
                    });
                    handles.push(handle);
                }

                for handle in handles.drain(..) {
                    let _ = handle.join();
                }
            }

            if !saw_failure {
                let res = results.lock().expect("results lock");
                saw_failure = res.values().any(|r| !r.success);
            }
        }

        let results = Arc::try_unwrap(results)
            .map(|m| m.into_inner().expect("results lock"))
            .unwrap_or_else(|arc| arc.lock().expect("results lock").clone());
        let success = results.values().all(|r| r.success);

        ExecutorReport {
            results,
            success,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn record_skip(
    results: &Arc<Mutex<BTreeMap<String, ToolResult>>>,
    progress: &Option<ProgressCallback>,
    tool: &str,
    reasons: &[String],
) {
    notify(progress, tool, ProgressStatus::Skipped, 0, 0);
    results
        .lock()
        .expect("results lock")
        .insert(tool.to_string(), ToolResult::skipped(tool, reasons));
}

fn notify(
    progress: &Option<ProgressCallback>,
    tool: &str,
    status: ProgressStatus,
    errors: usize,
    warnings: usize,
) {
    if let Some(cb) = progress {
        let mut cb = cb.lock().expect("progress lock");
        cb(tool, status, errors, warnings);
    }
}
