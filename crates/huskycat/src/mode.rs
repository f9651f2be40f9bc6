//! Operating-mode detection.
//!
//! One of five modes parameterizes every later decision (output shape, tool
//! set, fix policy). Detection precedence, first match wins: explicit
//! override, mcp subcommand, CI environment, git-hook environment,
//! non-interactive stdio, interactive CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable overriding detection.
pub const MODE_ENV: &str = "HUSKYCAT_MODE";

/// Environment variable switching git-hooks mode to the fork-and-detach
/// execution model.
pub const NONBLOCKING_ENV: &str = "HUSKYCAT_NONBLOCKING";

/// CI markers checked in order.
const CI_MARKERS: [&str; 3] = ["GITLAB_CI", "GITHUB_ACTIONS", "CI"];

/// Variables git exports into hook processes. Two or more present means we
/// were invoked from a hook.
const GIT_HOOK_MARKERS: [&str; 6] = [
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "GIT_AUTHOR_DATE",
    "GIT_INDEX_FILE",
    "GIT_PREFIX",
    "GIT_EXEC_PATH",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    GitHooks,
    Ci,
    Cli,
    Pipeline,
    Mcp,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::GitHooks => "git_hooks",
            Mode::Ci => "ci",
            Mode::Cli => "cli",
            Mode::Pipeline => "pipeline",
            Mode::Mcp => "mcp",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git_hooks" => Ok(Mode::GitHooks),
            "ci" => Ok(Mode::Ci),
            "cli" => Ok(Mode::Cli),
            "pipeline" => Ok(Mode::Pipeline),
            "mcp" => Ok(Mode::Mcp),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Detect the operating mode from environment and stdio.
///
/// `override_mode` is the CLI flag; `mcp_requested` is whether the
/// invocation asked for the JSON-RPC tool-server subcommand.
pub fn detect_mode(override_mode: Option<&str>, mcp_requested: bool) -> Mode {
    detect_mode_with(
        override_mode,
        mcp_requested,
        atty::is(atty::Stream::Stdin),
        atty::is(atty::Stream::Stdout),
    )
}

/// Detection with injected TTY state, for callers and tests that already
/// know their stdio.
pub fn detect_mode_with(
    override_mode: Option<&str>,
    mcp_requested: bool,
    stdin_tty: bool,
    stdout_tty: bool,
) -> Mode {
    let explicit = override_mode
        .map(str::to_string)
        .or_else(|| std::env::var(MODE_ENV).ok());
    if let Some(value) = explicit {
        match value.parse::<Mode>() {
            Ok(mode) => return mode,
            Err(err) => {
                // Unknown override falls back to detection.
                tracing::warn!(%err, "ignoring invalid mode override");
            }
        }
    }

    if mcp_requested {
        return Mode::Mcp;
    }

    if is_ci_context() {
        return Mode::Ci;
    }

    if is_git_hooks_context() {
        return Mode::GitHooks;
    }

    if !stdin_tty && !stdout_tty {
        return Mode::Pipeline;
    }

    Mode::Cli
}

pub fn is_ci_context() -> bool {
    CI_MARKERS.iter().any(|marker| env_truthy(marker))
}

pub fn is_git_hooks_context() -> bool {
    GIT_HOOK_MARKERS
        .iter()
        .filter(|marker| std::env::var_os(marker).is_some())
        .count()
        >= 2
}

/// Whether git-hooks mode should fork a background validator instead of
/// blocking the commit.
pub fn nonblocking_requested() -> bool {
    env_truthy(NONBLOCKING_ENV)
}

fn env_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => {
            let v = value.to_lowercase();
            !v.is_empty() && v != "0" && v != "false" && v != "no"
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn clear_markers<F: FnOnce()>(f: F) {
        let mut vars: Vec<(&str, Option<&str>)> = vec![(MODE_ENV, None), (NONBLOCKING_ENV, None)];
        vars.extend(CI_MARKERS.iter().map(|m| (*m, None)));
        vars.extend(GIT_HOOK_MARKERS.iter().map(|m| (*m, None)));
        temp_env::with_vars(vars, f);
    }

    #[test]
    #[serial]
    fn explicit_override_takes_priority() {
        clear_markers(|| {
            assert_eq!(detect_mode_with(Some("ci"), false, true, true), Mode::Ci);
            assert_eq!(
                detect_mode_with(Some("git_hooks"), true, true, true),
                Mode::GitHooks
            );
            assert_eq!(
                detect_mode_with(Some("pipeline"), false, true, true),
                Mode::Pipeline
            );
        });
    }

    #[test]
    #[serial]
    fn env_var_override_works() {
        clear_markers(|| {
            temp_env::with_var(MODE_ENV, Some("ci"), || {
                assert_eq!(detect_mode_with(None, false, true, true), Mode::Ci);
            });
        });
    }

    #[test]
    #[serial]
    fn unknown_override_falls_back_to_detection() {
        clear_markers(|| {
            assert_eq!(
                detect_mode_with(Some("warp-speed"), false, true, true),
                Mode::Cli
            );
        });
    }

    #[test]
    #[serial]
    fn mcp_subcommand_wins_over_environment() {
        clear_markers(|| {
            temp_env::with_var("CI", Some("true"), || {
                assert_eq!(detect_mode_with(None, true, true, true), Mode::Mcp);
            });
        });
    }

    #[test]
    #[serial]
    fn ci_markers_are_recognized() {
        clear_markers(|| {
            for marker in ["GITLAB_CI", "GITHUB_ACTIONS", "CI"] {
                temp_env::with_var(marker, Some("true"), || {
                    assert_eq!(detect_mode_with(None, false, true, true), Mode::Ci);
                });
            }
        });
    }

    #[test]
    #[serial]
    fn two_git_hook_markers_mean_git_hooks() {
        clear_markers(|| {
            temp_env::with_vars(
                [
                    ("GIT_AUTHOR_NAME", Some("test")),
                    ("GIT_INDEX_FILE", Some(".git/index")),
                ],
                || {
                    assert_eq!(detect_mode_with(None, false, true, true), Mode::GitHooks);
                },
            );
        });
    }

    #[test]
    #[serial]
    fn one_git_marker_is_not_enough() {
        clear_markers(|| {
            temp_env::with_var("GIT_INDEX_FILE", Some(".git/index"), || {
                assert_eq!(detect_mode_with(None, false, true, true), Mode::Cli);
            });
        });
    }

    #[test]
    #[serial]
    fn piped_stdio_means_pipeline() {
        clear_markers(|| {
            assert_eq!(detect_mode_with(None, false, false, false), Mode::Pipeline);
            // Either side being a terminal keeps interactive cli.
            assert_eq!(detect_mode_with(None, false, true, false), Mode::Cli);
            assert_eq!(detect_mode_with(None, false, false, true), Mode::Cli);
        });
    }

    #[test]
    #[serial]
    fn nonblocking_env_parses_truthiness() {
        clear_markers(|| {
            temp_env::with_var(NONBLOCKING_ENV, Some("1"), || {
                assert!(nonblocking_requested());
            });
            temp_env::with_var(NONBLOCKING_ENV, Some("false"), || {
                assert!(!nonblocking_requested());
            });
            temp_env::with_var(NONBLOCKING_ENV, None::<&str>, || {
                assert!(!nonblocking_requested());
            });
        });
    }

    #[test]
    fn mode_round_trips_through_strings() {
        for mode in [Mode::GitHooks, Mode::Ci, Mode::Cli, Mode::Pipeline, Mode::Mcp] {
            assert_eq!(mode.as_str().parse::<Mode>().expect("parse"), mode);
        }
    }
}
