use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How confident a tool's self-fix is. Drives the per-mode auto-fix matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixConfidence {
    /// Pure formatters: formatting, sorting, whitespace.
    Safe,
    /// Simple rewrites: import pruning, lint auto-fix.
    Likely,
    /// Semantic changes.
    Uncertain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Minimal,
    #[default]
    Human,
    Json,
    JunitXml,
    JsonRpc,
}

/// Which slice of the registry an adapter runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelection {
    /// Every available tool.
    All,
    /// Only tools marked fast enough for a blocking hook.
    Fast,
    /// Tools enabled in `.huskycat.toml`.
    Configured,
    /// An explicit name list.
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Stdio,
    Socket,
}

/// Which confidence tiers get auto-applied and which get prompted for.
///
/// This is the only policy knob on fix behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixPolicy {
    pub auto: BTreeSet<FixConfidence>,
    pub prompt: BTreeSet<FixConfidence>,
}

impl FixPolicy {
    /// No fixes at all (ci, pipeline, mcp).
    pub fn never() -> Self {
        Self {
            auto: BTreeSet::new(),
            prompt: BTreeSet::new(),
        }
    }

    /// Auto-apply safe formatters only (git hooks).
    pub fn safe_only() -> Self {
        Self {
            auto: [FixConfidence::Safe].into_iter().collect(),
            prompt: BTreeSet::new(),
        }
    }

    /// Safe + likely auto, prompt for uncertain (interactive cli).
    pub fn interactive() -> Self {
        Self {
            auto: [FixConfidence::Safe, FixConfidence::Likely]
                .into_iter()
                .collect(),
            prompt: [FixConfidence::Uncertain].into_iter().collect(),
        }
    }

    pub fn should_auto_fix(&self, tier: FixConfidence) -> bool {
        self.auto.contains(&tier)
    }

    pub fn should_prompt_for_fix(&self, tier: FixConfidence) -> bool {
        self.prompt.contains(&tier)
    }
}

impl Default for FixPolicy {
    fn default() -> Self {
        Self::never()
    }
}

/// Options an adapter carries into a validation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub output_format: OutputFormat,
    pub interactive: bool,
    pub fail_fast: bool,
    pub tools: ToolSelection,
    pub progress: bool,
    pub color: bool,
    pub stdin_mode: bool,
    pub transport: Transport,
    pub fix_policy: FixPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Human,
            interactive: false,
            fail_fast: false,
            tools: ToolSelection::All,
            progress: false,
            color: false,
            stdin_mode: false,
            transport: Transport::Stdio,
            fix_policy: FixPolicy::never(),
        }
    }
}

/// One record per (tool, file) execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub tool: String,
    pub filepath: String,
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Tool modified the file in place.
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ValidationResult {
    pub fn passed(tool: &str, filepath: &str) -> Self {
        Self {
            tool: tool.to_string(),
            filepath: filepath.to_string(),
            success: true,
            messages: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            fixed: false,
            duration_ms: 0,
        }
    }

    pub fn failed(tool: &str, filepath: &str, error: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            filepath: filepath.to_string(),
            success: false,
            messages: Vec::new(),
            errors: vec![error.into()],
            warnings: Vec::new(),
            fixed: false,
            duration_ms: 0,
        }
    }

    /// Derived, never stored separately.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// Terminal state of one tool run. Exactly one holds per tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Completed,
    Failed,
    Skipped,
    TimedOut,
}

/// Executor-level record of one tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error_count: usize,
    pub warning_count: usize,
    /// Captured output (per-file results live in `results`).
    #[serde(default)]
    pub output: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-file results this tool produced.
    #[serde(default)]
    pub results: Vec<ValidationResult>,
}

impl ToolResult {
    pub fn skipped(tool: &str, failed_upstreams: &[String]) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            duration_ms: 0,
            error_count: 0,
            warning_count: 0,
            output: String::new(),
            status: ToolStatus::Skipped,
            error: Some(format!(
                "skipped: upstream failed ({})",
                failed_upstreams.join(", ")
            )),
            results: Vec::new(),
        }
    }
}

/// One persisted execution of the orchestrator. Field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    /// Timestamp-prefixed, lexicographically chronological.
    pub run_id: String,
    pub started: DateTime<Utc>,
    pub completed: DateTime<Utc>,
    pub files: Vec<String>,
    pub success: bool,
    pub tools_run: Vec<String>,
    pub errors: usize,
    pub warnings: usize,
    pub exit_code: i32,
    pub pid: i32,
}

/// Live-run tracking artifact, one per in-flight background child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: i32,
    pub run_id: String,
    pub files: Vec<String>,
    pub started_at: DateTime<Utc>,
}

/// Aggregated totals for one run, handed to the adapter formatter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub tools_run: Vec<String>,
    pub errors: usize,
    pub warnings: usize,
    pub duration_ms: u64,
    pub success: bool,
}

/// Build a run id that sorts lexicographically in chronological order.
pub fn new_run_id(now: DateTime<Utc>, pid: i32) -> String {
    format!("{}-{}", now.format("%Y%m%dT%H%M%S%.6f"), pid)
}

/// File list for a run, normalized to strings for persistence.
pub fn file_strings(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|p| p.display().to_string()).collect()
}
