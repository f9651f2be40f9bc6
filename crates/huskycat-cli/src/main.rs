use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use huskycat::adapter::{self, Adapter, PipelineAdapter};
use huskycat::config::Config;
use huskycat::dispatch::Dispatcher;
use huskycat::engine::{Engine, gather_files, staged_files};
use huskycat::manager::ProcessManager;
use huskycat::mcp::McpServer;
use huskycat::mode::{self, Mode};
use huskycat::registry::ToolRegistry;
use huskycat::runstore::RunStore;

#[derive(Parser, Debug)]
#[command(name = "huskycat", version)]
#[command(about = "Universal code validation: git hooks, CI, CLI, pipelines, and assistants")]
struct Cli {
    /// Operating mode override (git_hooks, ci, cli, pipeline, mcp).
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Emit machine-readable JSON regardless of detected mode.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose diagnostic logging to stderr.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run validation over the working tree, the staged set, or given paths.
    Validate {
        /// Validate the files staged for commit instead of the whole tree.
        #[arg(long)]
        staged: bool,

        /// Let tools apply fixes, gated by the mode's confidence policy.
        #[arg(long)]
        fix: bool,

        /// Files or directories to validate. Default: current directory.
        paths: Vec<PathBuf>,
    },
    /// Serve the JSON-RPC tool protocol on stdin/stdout.
    McpServer,
    /// Install the pre-commit hook into .git/hooks.
    SetupHooks {
        /// Overwrite a hook huskycat did not write.
        #[arg(long)]
        force: bool,
    },
    /// Pretty-print the most recent validation run.
    GetLastRun,
    /// Pretty-print recent validation runs, newest first.
    RunHistory {
        /// How many runs to show (1-100).
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("huskycat: {err:#}");
            2
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("huskycat=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: &Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = Config::load_from(&cwd)?;

    let mcp_requested = matches!(cli.cmd, Commands::McpServer);
    let mode = mode::detect_mode(cli.mode.as_deref(), mcp_requested);

    let store = RunStore::new(config.cache_root_in(&cwd));
    let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::builtin(), config));
    let engine = Engine::new(dispatcher, ProcessManager::new(store));

    match &cli.cmd {
        Commands::Validate { staged, fix, paths } => {
            run_validate(&engine, mode, cli.json, *staged, *fix, paths, &cwd)
        }
        Commands::McpServer => {
            let server = McpServer::new(Arc::new(engine));
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            server.serve(stdin.lock(), stdout.lock())?;
            Ok(0)
        }
        Commands::SetupHooks { force } => {
            setup_hooks(&cwd, *force)?;
            Ok(0)
        }
        Commands::GetLastRun => {
            match engine.manager().store().last_run()? {
                Some(run) => println!("{}", serde_json::to_string_pretty(&run)?),
                None => println!("no runs recorded"),
            }
            Ok(0)
        }
        Commands::RunHistory { limit } => {
            let runs = engine.manager().store().history(*limit)?;
            if runs.is_empty() {
                println!("no runs recorded");
            }
            for run in runs {
                let took = (run.completed - run.started).to_std().unwrap_or_default();
                let took = std::time::Duration::from_millis(took.as_millis() as u64);
                println!(
                    "{}  {}  {} errors, {} warnings  {}  [{}]",
                    run.started.format("%Y-%m-%d %H:%M:%S"),
                    if run.success { "ok  " } else { "FAIL" },
                    run.errors,
                    run.warnings,
                    humantime::format_duration(took),
                    run.tools_run.join(", ")
                );
            }
            Ok(0)
        }
    }
}

fn run_validate(
    engine: &Engine,
    mode: Mode,
    force_json: bool,
    staged: bool,
    fix: bool,
    paths: &[PathBuf],
    cwd: &Path,
) -> Result<i32> {
    let files = if staged {
        staged_files(cwd)?
    } else if paths.is_empty() {
        gather_files(cwd)?
    } else {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                files.extend(gather_files(path)?);
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                bail!("path does not exist: {}", path.display());
            }
        }
        files
    };

    let nonblocking = mode == Mode::GitHooks && mode::nonblocking_requested();
    let adapter: Box<dyn Adapter> = if force_json {
        Box::new(PipelineAdapter::new())
    } else {
        adapter::get_adapter(mode, nonblocking, atty::is(atty::Stream::Stdout))
    };

    if nonblocking && !force_json {
        // Parent returns to git immediately; the child owns the run.
        return match engine.execute_nonblocking(&files, adapter.as_ref(), fix) {
            Ok(_pid) => Ok(0),
            Err(err) => {
                eprintln!("huskycat: {err:#}");
                Ok(1)
            }
        };
    }

    let outcome = engine.run_validation(&files, adapter.as_ref(), fix, None)?;
    let rendered = adapter.format_output(&outcome.results_by_file, &outcome.summary);
    if !rendered.is_empty() {
        print!("{rendered}");
    }
    Ok(outcome.run.exit_code)
}

const HOOK_MARKER: &str = "# managed by huskycat";

fn setup_hooks(cwd: &Path, force: bool) -> Result<()> {
    let git_dir = cwd.join(".git");
    if !git_dir.is_dir() {
        bail!("not a git repository: {}", cwd.display());
    }

    let hooks_dir = git_dir.join("hooks");
    std::fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("failed to create {}", hooks_dir.display()))?;

    let hook_path = hooks_dir.join("pre-commit");
    if hook_path.exists() && !force {
        let existing = std::fs::read_to_string(&hook_path).unwrap_or_default();
        if !existing.contains(HOOK_MARKER) {
            bail!(
                "{} exists and was not written by huskycat (use --force to overwrite)",
                hook_path.display()
            );
        }
    }

    let script = format!(
        "#!/bin/sh\n{HOOK_MARKER}\nexec huskycat validate --staged --mode git_hooks\n"
    );
    std::fs::write(&hook_path, script)
        .with_context(|| format!("failed to write {}", hook_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark {} executable", hook_path.display()))?;
    }

    println!("installed {}", hook_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_validate_flags() {
        let cli = Cli::parse_from(["huskycat", "validate", "--staged", "--fix", "a.py"]);
        match cli.cmd {
            Commands::Validate { staged, fix, paths } => {
                assert!(staged);
                assert!(fix);
                assert_eq!(paths, vec![PathBuf::from("a.py")]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::parse_from(["huskycat", "validate", "--mode", "pipeline", "--json"]);
        assert_eq!(cli.mode.as_deref(), Some("pipeline"));
        assert!(cli.json);
    }

    #[test]
    fn run_history_limit_defaults_to_ten() {
        let cli = Cli::parse_from(["huskycat", "run-history"]);
        match cli.cmd {
            Commands::RunHistory { limit } => assert_eq!(limit, 10),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
