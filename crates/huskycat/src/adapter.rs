//! Per-mode adapters.
//!
//! An adapter carries the [`AdapterConfig`] for its mode and formats the
//! run's results for that mode's consumer. Adapters never talk to the CLI
//! top level directly; they return structured output and the glue assigns
//! exit codes.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::mode::Mode;
use crate::output::{self, ResultsByFile};
use crate::registry::ToolRegistry;
use crate::types::{
    AdapterConfig, FixPolicy, OutputFormat, RunSummary, ToolSelection, Transport,
};

/// Inputs an adapter selects tools from.
pub struct SelectionContext<'a> {
    pub registry: &'a ToolRegistry,
    /// Tools that passed the startup availability probe.
    pub available: &'a BTreeSet<String>,
    pub files: &'a [PathBuf],
    /// The `[tools] enabled` list from configuration, if any.
    pub configured: Option<&'a [String]>,
}

pub trait Adapter {
    fn name(&self) -> &str;

    fn config(&self) -> &AdapterConfig;

    /// Tools this run should execute: the mode's policy intersected with
    /// what is available and what the files need.
    fn tool_selection(&self, ctx: &SelectionContext<'_>) -> BTreeSet<String> {
        select_tools(&self.config().tools, ctx)
    }

    /// Render the run for this mode's consumer.
    fn format_output(&self, results: &ResultsByFile, summary: &RunSummary) -> String {
        match self.config().output_format {
            OutputFormat::Minimal => output::render_minimal(results, summary),
            OutputFormat::Human => {
                output::render_human(results, summary, self.config().color)
            }
            OutputFormat::Json | OutputFormat::JsonRpc => output::render_json(results, summary),
            OutputFormat::JunitXml => output::render_junit(results, summary),
        }
    }
}

/// Resolve a [`ToolSelection`] against availability and the file list.
pub fn select_tools(selection: &ToolSelection, ctx: &SelectionContext<'_>) -> BTreeSet<String> {
    let needed = ctx.registry.tools_for_files(ctx.files);

    let wanted: BTreeSet<String> = match selection {
        ToolSelection::All => needed,
        ToolSelection::Fast => needed
            .into_iter()
            .filter(|name| {
                ctx.registry
                    .get(name)
                    .map(|spec| spec.fast)
                    .unwrap_or(false)
            })
            .collect(),
        ToolSelection::Configured => match ctx.configured {
            Some(enabled) => {
                let enabled: BTreeSet<&str> = enabled.iter().map(String::as_str).collect();
                needed
                    .into_iter()
                    .filter(|name| enabled.contains(name.as_str()))
                    .collect()
            }
            None => needed,
        },
        ToolSelection::List(names) => {
            let listed: BTreeSet<&str> = names.iter().map(String::as_str).collect();
            needed
                .into_iter()
                .filter(|name| listed.contains(name.as_str()))
                .collect()
        }
    };

    wanted
        .into_iter()
        .filter(|name| ctx.available.contains(name))
        .collect()
}

/// Blocking git-hook adapter: fast subset, fail-fast, minimal output.
pub struct GitHooksAdapter {
    config: AdapterConfig,
}

impl GitHooksAdapter {
    pub fn new() -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::Minimal,
                interactive: false,
                fail_fast: true,
                tools: ToolSelection::Fast,
                progress: false,
                color: false,
                fix_policy: FixPolicy::safe_only(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Default for GitHooksAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for GitHooksAdapter {
    fn name(&self) -> &str {
        "git_hooks"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

/// Non-blocking git-hook adapter. The parent prints nothing and returns
/// immediately; the background child runs everything with progress going to
/// the run log.
pub struct NonBlockingGitHooksAdapter {
    config: AdapterConfig,
}

impl NonBlockingGitHooksAdapter {
    pub fn new() -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::Minimal,
                interactive: false,
                fail_fast: false,
                tools: ToolSelection::All,
                progress: true,
                color: false,
                fix_policy: FixPolicy::safe_only(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Default for NonBlockingGitHooksAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for NonBlockingGitHooksAdapter {
    fn name(&self) -> &str {
        "git_hooks_nonblocking"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The parent half of the fork has nothing to say on success.
    fn format_output(&self, _results: &ResultsByFile, _summary: &RunSummary) -> String {
        String::new()
    }
}

pub struct CiAdapter {
    config: AdapterConfig,
}

impl CiAdapter {
    pub fn new() -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::JunitXml,
                interactive: false,
                fail_fast: false,
                tools: ToolSelection::All,
                progress: false,
                color: false,
                fix_policy: FixPolicy::never(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Default for CiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for CiAdapter {
    fn name(&self) -> &str {
        "ci"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

pub struct CliAdapter {
    config: AdapterConfig,
}

impl CliAdapter {
    pub fn new(is_tty: bool) -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::Human,
                interactive: true,
                fail_fast: false,
                tools: ToolSelection::Configured,
                progress: is_tty,
                color: is_tty,
                fix_policy: FixPolicy::interactive(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Adapter for CliAdapter {
    fn name(&self) -> &str {
        "cli"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

pub struct PipelineAdapter {
    config: AdapterConfig,
}

impl PipelineAdapter {
    pub fn new() -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::Json,
                interactive: false,
                fail_fast: false,
                tools: ToolSelection::All,
                progress: false,
                color: false,
                stdin_mode: true,
                fix_policy: FixPolicy::never(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Default for PipelineAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for PipelineAdapter {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

pub struct McpAdapter {
    config: AdapterConfig,
}

impl McpAdapter {
    pub fn new() -> Self {
        Self {
            config: AdapterConfig {
                output_format: OutputFormat::JsonRpc,
                interactive: false,
                fail_fast: false,
                tools: ToolSelection::All,
                progress: false,
                color: false,
                transport: Transport::Stdio,
                fix_policy: FixPolicy::never(),
                ..AdapterConfig::default()
            },
        }
    }
}

impl Default for McpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for McpAdapter {
    fn name(&self) -> &str {
        "mcp"
    }

    fn config(&self) -> &AdapterConfig {
        &self.config
    }
}

/// The adapter for a detected mode. `nonblocking` only matters for
/// git-hooks; `is_tty` only for cli.
pub fn get_adapter(mode: Mode, nonblocking: bool, is_tty: bool) -> Box<dyn Adapter> {
    match mode {
        Mode::GitHooks if nonblocking => Box::new(NonBlockingGitHooksAdapter::new()),
        Mode::GitHooks => Box::new(GitHooksAdapter::new()),
        Mode::Ci => Box::new(CiAdapter::new()),
        Mode::Cli => Box::new(CliAdapter::new(is_tty)),
        Mode::Pipeline => Box::new(PipelineAdapter::new()),
        Mode::Mcp => Box::new(McpAdapter::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixConfidence;

    fn ctx_inputs() -> (ToolRegistry, BTreeSet<String>, Vec<PathBuf>) {
        let registry = ToolRegistry::builtin();
        let available: BTreeSet<String> =
            ["black", "ruff", "mypy", "yaml-lint", "chapel-format"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        let files = vec![PathBuf::from("a.py"), PathBuf::from("c.yaml")];
        (registry, available, files)
    }

    #[test]
    fn adapters_match_the_mode_defaults_table() {
        let hooks = GitHooksAdapter::new();
        assert_eq!(hooks.config().output_format, OutputFormat::Minimal);
        assert!(hooks.config().fail_fast);
        assert_eq!(hooks.config().tools, ToolSelection::Fast);
        assert!(!hooks.config().progress);
        assert!(hooks.config().fix_policy.should_auto_fix(FixConfidence::Safe));
        assert!(!hooks.config().fix_policy.should_auto_fix(FixConfidence::Likely));

        let nonblocking = NonBlockingGitHooksAdapter::new();
        assert!(!nonblocking.config().fail_fast);
        assert_eq!(nonblocking.config().tools, ToolSelection::All);
        assert!(nonblocking.config().progress);

        let ci = CiAdapter::new();
        assert_eq!(ci.config().output_format, OutputFormat::JunitXml);
        assert!(!ci.config().interactive);
        assert!(!ci.config().color);
        assert!(!ci.config().fix_policy.should_auto_fix(FixConfidence::Safe));

        let cli = CliAdapter::new(true);
        assert_eq!(cli.config().output_format, OutputFormat::Human);
        assert!(cli.config().interactive);
        assert!(cli.config().progress);
        assert!(cli.config().fix_policy.should_prompt_for_fix(FixConfidence::Uncertain));

        let pipeline = PipelineAdapter::new();
        assert_eq!(pipeline.config().output_format, OutputFormat::Json);

        let mcp = McpAdapter::new();
        assert_eq!(mcp.config().output_format, OutputFormat::JsonRpc);
    }

    #[test]
    fn get_adapter_covers_every_mode() {
        assert_eq!(get_adapter(Mode::GitHooks, false, false).name(), "git_hooks");
        assert_eq!(
            get_adapter(Mode::GitHooks, true, false).name(),
            "git_hooks_nonblocking"
        );
        assert_eq!(get_adapter(Mode::Ci, false, false).name(), "ci");
        assert_eq!(get_adapter(Mode::Cli, false, true).name(), "cli");
        assert_eq!(get_adapter(Mode::Pipeline, false, false).name(), "pipeline");
        assert_eq!(get_adapter(Mode::Mcp, false, false).name(), "mcp");
    }

    #[test]
    fn fast_selection_keeps_only_fast_tools() {
        let (registry, available, files) = ctx_inputs();
        let ctx = SelectionContext {
            registry: &registry,
            available: &available,
            files: &files,
            configured: None,
        };
        let tools = select_tools(&ToolSelection::Fast, &ctx);
        assert!(tools.contains("black"));
        assert!(tools.contains("ruff"));
        assert!(!tools.contains("mypy"));
    }

    #[test]
    fn selection_is_bounded_by_availability() {
        let (registry, _, files) = ctx_inputs();
        let available: BTreeSet<String> = ["black".to_string()].into_iter().collect();
        let ctx = SelectionContext {
            registry: &registry,
            available: &available,
            files: &files,
            configured: None,
        };
        let tools = select_tools(&ToolSelection::All, &ctx);
        assert_eq!(tools, ["black".to_string()].into_iter().collect());
    }

    #[test]
    fn configured_selection_respects_the_enabled_list() {
        let (registry, available, files) = ctx_inputs();
        let enabled = vec!["black".to_string(), "yaml-lint".to_string()];
        let ctx = SelectionContext {
            registry: &registry,
            available: &available,
            files: &files,
            configured: Some(&enabled),
        };
        let tools = select_tools(&ToolSelection::Configured, &ctx);
        assert!(tools.contains("black"));
        assert!(tools.contains("yaml-lint"));
        assert!(!tools.contains("ruff"));
    }

    #[test]
    fn explicit_list_selection_filters_by_name() {
        let (registry, available, files) = ctx_inputs();
        let ctx = SelectionContext {
            registry: &registry,
            available: &available,
            files: &files,
            configured: None,
        };
        let tools = select_tools(&ToolSelection::List(vec!["ruff".to_string()]), &ctx);
        assert_eq!(tools, ["ruff".to_string()].into_iter().collect());
    }

    #[test]
    fn selection_only_includes_tools_the_files_need() {
        let (registry, available, _) = ctx_inputs();
        let files = vec![PathBuf::from("script.chpl")];
        let ctx = SelectionContext {
            registry: &registry,
            available: &available,
            files: &files,
            configured: None,
        };
        let tools = select_tools(&ToolSelection::All, &ctx);
        assert_eq!(tools, ["chapel-format".to_string()].into_iter().collect());
    }

    #[test]
    fn nonblocking_parent_output_is_empty() {
        let adapter = NonBlockingGitHooksAdapter::new();
        let out = adapter.format_output(&ResultsByFile::new(), &RunSummary::default());
        assert_eq!(out, "");
    }
}
