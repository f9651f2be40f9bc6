//! Asynchronous validation tasks for the JSON-RPC tool server.
//!
//! A task is a worker thread plus a table entry: status under a lock, a
//! cancellation flag the executor polls at level boundaries, and the final
//! payload once the thread finishes. Task ids are `T1`, `T2`, … per server
//! process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of one task, safe to hand to clients.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub path: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Final payload once the task reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct TaskEntry {
    snapshot: TaskSnapshot,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    tasks: BTreeMap<String, TaskEntry>,
}

/// Thread-safe task registry. Clones share the table.
#[derive(Clone, Default)]
pub struct TaskTable {
    inner: Arc<Mutex<Inner>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` on a worker thread and return its task id immediately.
    ///
    /// The job receives the cancellation flag; a cancelled task keeps
    /// whatever partial result the job returns but stays `cancelled`.
    pub fn spawn<F>(&self, path: &str, job: F) -> String
    where
        F: FnOnce(Arc<AtomicBool>) -> anyhow::Result<Value> + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let task_id = {
            let mut inner = self.inner.lock().expect("task table lock");
            inner.next_id += 1;
            let task_id = format!("T{}", inner.next_id);
            inner.tasks.insert(
                task_id.clone(),
                TaskEntry {
                    snapshot: TaskSnapshot {
                        task_id: task_id.clone(),
                        status: TaskStatus::Running,
                        path: path.to_string(),
                        started_at: Utc::now(),
                        completed_at: None,
                        result: None,
                        error: None,
                    },
                    cancel: Arc::clone(&cancel),
                },
            );
            task_id
        };

        let table = self.clone();
        let thread_task_id = task_id.clone();
        thread::spawn(move || {
            let outcome = job(Arc::clone(&cancel));

            let mut inner = table.inner.lock().expect("task table lock");
            if let Some(entry) = inner.tasks.get_mut(&thread_task_id) {
                entry.snapshot.completed_at = Some(Utc::now());
                match outcome {
                    Ok(result) => {
                        entry.snapshot.result = Some(result);
                        if entry.cancel.load(Ordering::SeqCst) {
                            entry.snapshot.status = TaskStatus::Cancelled;
                        } else {
                            entry.snapshot.status = TaskStatus::Completed;
                        }
                    }
                    Err(err) => {
                        entry.snapshot.error = Some(format!("{err:#}"));
                        entry.snapshot.status = if entry.cancel.load(Ordering::SeqCst) {
                            TaskStatus::Cancelled
                        } else {
                            TaskStatus::Failed
                        };
                    }
                }
            }
        });

        task_id
    }

    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        let inner = self.inner.lock().expect("task table lock");
        inner.tasks.get(task_id).map(|entry| entry.snapshot.clone())
    }

    /// All tasks, optionally filtered by status.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<TaskSnapshot> {
        let inner = self.inner.lock().expect("task table lock");
        inner
            .tasks
            .values()
            .map(|entry| entry.snapshot.clone())
            .filter(|snapshot| status.is_none_or(|s| snapshot.status == s))
            .collect()
    }

    /// Set the cancellation flag. Returns false for unknown tasks; already
    /// terminal tasks acknowledge without changing state.
    pub fn cancel(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock().expect("task table lock");
        match inner.tasks.get_mut(task_id) {
            Some(entry) => {
                entry.cancel.store(true, Ordering::SeqCst);
                if entry.snapshot.status == TaskStatus::Running {
                    entry.snapshot.status = TaskStatus::Cancelled;
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn wait_for<F: Fn() -> bool>(predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached");
    }

    #[test]
    fn ids_are_sequential_per_table() {
        let table = TaskTable::new();
        let a = table.spawn("a", |_| Ok(json!({})));
        let b = table.spawn("b", |_| Ok(json!({})));
        assert_eq!(a, "T1");
        assert_eq!(b, "T2");
    }

    #[test]
    fn completed_task_exposes_its_result() {
        let table = TaskTable::new();
        let id = table.spawn("dir", |_| Ok(json!({ "errors": 0 })));

        wait_for(|| table.get(&id).expect("task").status == TaskStatus::Completed);
        let snapshot = table.get(&id).expect("task");
        assert_eq!(snapshot.result.expect("result")["errors"], 0);
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn failed_job_surfaces_its_error() {
        let table = TaskTable::new();
        let id = table.spawn("dir", |_| anyhow::bail!("path does not exist"));

        wait_for(|| table.get(&id).expect("task").status == TaskStatus::Failed);
        let snapshot = table.get(&id).expect("task");
        assert!(snapshot.error.expect("error").contains("path does not exist"));
    }

    #[test]
    fn cancel_flips_running_tasks_and_reaches_the_job() {
        let table = TaskTable::new();
        let id = table.spawn("dir", |cancel| {
            for _ in 0..500 {
                if cancel.load(Ordering::SeqCst) {
                    return Ok(json!({ "partial": true }));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Ok(json!({ "partial": false }))
        });

        assert!(table.cancel(&id));
        wait_for(|| table.get(&id).expect("task").completed_at.is_some());

        let snapshot = table.get(&id).expect("task");
        assert_eq!(snapshot.status, TaskStatus::Cancelled);
        assert_eq!(snapshot.result.expect("result")["partial"], true);
    }

    #[test]
    fn cancel_of_unknown_task_is_refused() {
        let table = TaskTable::new();
        assert!(!table.cancel("T99"));
    }

    #[test]
    fn list_filters_by_status() {
        let table = TaskTable::new();
        let done = table.spawn("a", |_| Ok(json!({})));
        let _running = table.spawn("b", |_| {
            thread::sleep(Duration::from_millis(300));
            Ok(json!({}))
        });

        wait_for(|| table.get(&done).expect("task").status == TaskStatus::Completed);

        let completed = table.list(Some(TaskStatus::Completed));
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].task_id, done);

        assert_eq!(table.list(None).len(), 2);
    }
}
