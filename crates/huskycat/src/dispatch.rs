//! The validator dispatcher: turn a tool name plus files into an execution.
//!
//! Backend priority, first usable wins: GPL sidecar (for the GPL tool set),
//! bundled binary under `~/.huskycat/tools`, local PATH, container runtime.
//! The container fallback is opt-in via configuration. Invocations already
//! inside a container go straight to local execution.
//!
//! Every backend honors one contract: `(exit_code, stdout, stderr)`. The
//! dispatcher folds that into a [`ValidationResult`] per file using the
//! generic `file:line:col:` line classifier.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actions;
use crate::chapel;
use crate::compose;
use crate::config::Config;
use crate::executor::ToolTask;
use crate::process::{self, DEFAULT_TOOL_TIMEOUT};
use crate::registry::{BuiltinKind, ToolKind, ToolRegistry, ToolSpec, is_gpl_tool};
use crate::sidecar::SidecarClient;
use crate::types::{ToolResult, ToolStatus, ValidationResult};
use crate::yaml_lint;

/// Which execution strategy a tool resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Builtin,
    Sidecar,
    Bundled,
    Local,
    Container,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Builtin => "builtin",
            Backend::Sidecar => "sidecar",
            Backend::Bundled => "bundled",
            Backend::Local => "local",
            Backend::Container => "container",
        }
    }
}

pub struct Dispatcher {
    registry: ToolRegistry,
    config: Config,
    sidecar: SidecarClient,
    sidecar_healthy: bool,
    bundled_dir: Option<PathBuf>,
    in_container: bool,
    container_runtime: Option<String>,
    tool_timeout: Duration,
}

impl Dispatcher {
    /// Probe the environment once; the answers hold for the process life.
    pub fn new(registry: ToolRegistry, config: Config) -> Self {
        let sidecar = SidecarClient::from_env();
        let sidecar_healthy = sidecar.is_available();
        let in_container = running_in_container();

        let container_runtime = if config.container_backend && !in_container {
            ["podman", "docker"]
                .iter()
                .find(|rt| process::command_exists(rt))
                .map(|rt| rt.to_string())
        } else {
            None
        };

        let bundled_dir = dirs::home_dir()
            .map(|home| home.join(".huskycat").join("tools"))
            .filter(|dir| dir.is_dir());

        Self {
            registry,
            config,
            sidecar,
            sidecar_healthy,
            bundled_dir,
            in_container,
            container_runtime,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn for_tests(registry: ToolRegistry, config: Config) -> Self {
        Self {
            registry,
            config,
            sidecar: SidecarClient::new(PathBuf::from("/nonexistent/huskycat-test.sock")),
            sidecar_healthy: false,
            bundled_dir: None,
            in_container: false,
            container_runtime: None,
            tool_timeout: Duration::from_secs(5),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// First usable backend for `tool`, mirroring execution priority.
    pub fn resolve_backend(&self, spec: &ToolSpec) -> Option<Backend> {
        let command = match &spec.kind {
            ToolKind::Builtin(_) => return Some(Backend::Builtin),
            ToolKind::External { command, .. } => command,
        };

        if is_gpl_tool(&spec.name) && self.sidecar_healthy {
            return Some(Backend::Sidecar);
        }

        if let Some(path) = self.bundled_tool_path(command) {
            if is_executable(&path) {
                return Some(Backend::Bundled);
            }
        }

        if process::command_exists(command) {
            return Some(Backend::Local);
        }

        if !self.in_container && self.container_runtime.is_some() {
            return Some(Backend::Container);
        }

        None
    }

    /// Availability mirrors backend priority; called at startup to shape the
    /// effective tool set.
    pub fn is_available(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .ok()
            .and_then(|spec| self.resolve_backend(spec))
            .is_some()
    }

    /// Tools that are both configured in and usable right now.
    pub fn available_tools(&self) -> std::collections::BTreeSet<String> {
        self.registry
            .specs()
            .filter(|spec| self.config.tool_enabled(&spec.name))
            .filter(|spec| self.resolve_backend(spec).is_some())
            .map(|spec| spec.name.clone())
            .collect()
    }

    fn bundled_tool_path(&self, command: &str) -> Option<PathBuf> {
        self.bundled_dir.as_ref().map(|dir| dir.join(command))
    }

    /// Run one tool over the files its matcher accepts.
    pub fn run_tool(&self, name: &str, files: &[PathBuf], fix: bool) -> ToolResult {
        let start = Instant::now();
        let spec = match self.registry.get(name) {
            Ok(spec) => spec,
            Err(err) => {
                return failed_tool(name, format!("{err:#}"), start);
            }
        };

        let matching: Vec<&PathBuf> = files
            .iter()
            .filter(|f| spec.matcher.can_handle(f))
            .collect();

        let mut results: Vec<ValidationResult> = Vec::new();
        let mut timed_out = false;

        for file in matching {
            let result = match &spec.kind {
                ToolKind::Builtin(kind) => self.run_builtin(*kind, spec, file, fix),
                ToolKind::External {
                    command,
                    check_args,
                    fix_args,
                } => {
                    let args = match (fix, fix_args) {
                        (true, Some(args)) => args.clone(),
                        _ => check_args.clone(),
                    };
                    self.run_external(spec, command, &args, file, fix)
                }
            };
            timed_out = timed_out || result.errors.iter().any(|e| e.contains("timed out"));
            results.push(result);
        }

        let error_count: usize = results.iter().map(ValidationResult::error_count).sum();
        let warning_count: usize = results.iter().map(ValidationResult::warning_count).sum();
        let success = results.iter().all(|r| r.success);
        let output = results
            .iter()
            .flat_map(|r| r.messages.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n");

        ToolResult {
            tool: name.to_string(),
            success,
            duration_ms: start.elapsed().as_millis() as u64,
            error_count,
            warning_count,
            output,
            status: if timed_out {
                ToolStatus::TimedOut
            } else if success {
                ToolStatus::Completed
            } else {
                ToolStatus::Failed
            },
            error: None,
            results,
        }
    }

    /// Package a tool run as an executor task.
    pub fn make_task(self: &Arc<Self>, name: &str, files: &[PathBuf], fix: bool) -> ToolTask {
        let dispatcher = Arc::clone(self);
        let name = name.to_string();
        let files = files.to_vec();
        Box::new(move || dispatcher.run_tool(&name, &files, fix))
    }

    fn run_external(
        &self,
        spec: &ToolSpec,
        command: &str,
        args: &[String],
        file: &Path,
        fix: bool,
    ) -> ValidationResult {
        let backend = match self.resolve_backend(spec) {
            Some(backend) => backend,
            None => {
                return ValidationResult::failed(
                    &spec.name,
                    &file.display().to_string(),
                    format!("no backend available for '{command}'"),
                );
            }
        };
        tracing::debug!(tool = %spec.name, backend = backend.as_str(), "dispatching tool");

        let start = Instant::now();
        let mut full_args: Vec<String> = args.to_vec();
        full_args.push(file.display().to_string());
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let (exit_code, stdout, stderr) = match backend {
            Backend::Sidecar => {
                let exec = self.sidecar.execute(&spec.name, &full_args, Some(&cwd));
                (exec.exit_code, exec.stdout, exec.stderr)
            }
            Backend::Bundled => {
                let path = self
                    .bundled_tool_path(command)
                    .expect("bundled backend implies bundled path");
                match process::run_with_timeout(
                    &path.display().to_string(),
                    &full_args,
                    &cwd,
                    self.tool_timeout,
                ) {
                    Ok(out) => (out.exit_code, out.stdout, out.stderr),
                    Err(err) => (1, String::new(), format!("{err:#}")),
                }
            }
            Backend::Local => {
                match process::run_with_timeout(command, &full_args, &cwd, self.tool_timeout) {
                    Ok(out) => (out.exit_code, out.stdout, out.stderr),
                    Err(err) => (1, String::new(), format!("{err:#}")),
                }
            }
            Backend::Container => {
                let runtime = self
                    .container_runtime
                    .clone()
                    .expect("container backend implies runtime");
                let mut container_args = vec![
                    "run".to_string(),
                    "--rm".to_string(),
                    "--entrypoint=".to_string(),
                    "-v".to_string(),
                    format!("{}:/workspace", cwd.display()),
                    "-w".to_string(),
                    "/workspace".to_string(),
                    self.config.container_image.clone(),
                    command.to_string(),
                ];
                container_args.extend(full_args.clone());
                match process::run_with_timeout(
                    &runtime,
                    &container_args,
                    &cwd,
                    self.tool_timeout,
                ) {
                    Ok(out) => (out.exit_code, out.stdout, out.stderr),
                    Err(err) => (1, String::new(), format!("{err:#}")),
                }
            }
            Backend::Builtin => unreachable!("builtin handled before backend resolution"),
        };

        let mut result = classify_output(&spec.name, file, exit_code, &stdout, &stderr);
        result.fixed = fix && result.success && spec_can_fix(spec);
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn run_builtin(
        &self,
        kind: BuiltinKind,
        spec: &ToolSpec,
        file: &Path,
        fix: bool,
    ) -> ValidationResult {
        let start = Instant::now();
        let filepath = file.display().to_string();

        let content = match fs::read_to_string(file) {
            Ok(content) => content,
            Err(err) => {
                let mut r = ValidationResult::failed(
                    &spec.name,
                    &filepath,
                    format!("failed to read {filepath}: {err}"),
                );
                r.duration_ms = start.elapsed().as_millis() as u64;
                return r;
            }
        };

        let mut result = match kind {
            BuiltinKind::YamlLint => {
                let issues = yaml_lint::lint(&content, &self.config.yaml_lint);
                let mut r = ValidationResult::passed(&spec.name, &filepath);
                for issue in issues {
                    let text = format!("{filepath}:{issue}");
                    match issue.severity {
                        yaml_lint::Severity::Error => r.errors.push(text),
                        yaml_lint::Severity::Warning => r.warnings.push(text),
                    }
                }
                r.success = r.errors.is_empty();
                r
            }
            BuiltinKind::ChapelFormat => {
                let mut r = ValidationResult::passed(&spec.name, &filepath);
                if fix {
                    let formatted = chapel::format(&content);
                    if formatted != content {
                        if let Err(err) = fs::write(file, &formatted) {
                            r.success = false;
                            r.errors.push(format!("failed to write {filepath}: {err}"));
                        } else {
                            r.fixed = true;
                            r.messages.push(format!("{filepath}: reformatted"));
                        }
                    }
                } else {
                    for issue in chapel::check_formatting(&content) {
                        r.warnings.push(format!("{filepath}: {issue}"));
                    }
                }
                r
            }
            BuiltinKind::ComposeValidate => {
                report_to_result(&spec.name, &filepath, compose::validate_content(&content))
            }
            BuiltinKind::ActionsValidate => {
                report_to_result(&spec.name, &filepath, actions::validate_content(&content))
            }
        };

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }
}

fn spec_can_fix(spec: &ToolSpec) -> bool {
    matches!(&spec.kind, ToolKind::External { fix_args: Some(_), .. })
}

fn report_to_result(
    tool: &str,
    filepath: &str,
    report: crate::schema::FileReport,
) -> ValidationResult {
    let mut r = ValidationResult::passed(tool, filepath);
    r.success = report.is_valid();
    r.errors = report
        .errors
        .into_iter()
        .map(|e| format!("{filepath}: {e}"))
        .collect();
    r.warnings = report
        .warnings
        .into_iter()
        .map(|w| format!("{filepath}: {w}"))
        .collect();
    r
}

fn failed_tool(name: &str, error: String, start: Instant) -> ToolResult {
    ToolResult {
        tool: name.to_string(),
        success: false,
        duration_ms: start.elapsed().as_millis() as u64,
        error_count: 1,
        warning_count: 0,
        output: String::new(),
        status: ToolStatus::Failed,
        error: Some(error),
        results: Vec::new(),
    }
}

/// Detect an already-in-container invocation.
pub fn running_in_container() -> bool {
    Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
        || std::env::var_os("container").is_some()
}

/// Fold raw tool output into a per-file result.
///
/// Lines shaped `file:line:col: message` become findings; a "warning" marker
/// in the message demotes the finding. A failing exit with no classified
/// lines keeps the stderr tail as the single error.
fn classify_output(
    tool: &str,
    file: &Path,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
) -> ValidationResult {
    let filepath = file.display().to_string();
    let mut result = ValidationResult::passed(tool, &filepath);
    result.success = exit_code == 0;

    for line in stdout.lines().chain(stderr.lines()) {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if is_finding_line(line) {
            if line.to_lowercase().contains("warning") {
                result.warnings.push(line.to_string());
            } else {
                result.errors.push(line.to_string());
            }
        } else {
            result.messages.push(line.to_string());
        }
    }

    if !result.success && result.errors.is_empty() {
        let tail = stderr.trim();
        if tail.is_empty() {
            result
                .errors
                .push(format!("{tool} exited with code {exit_code}"));
        } else {
            result.errors.push(tail.to_string());
        }
    }

    result
}

/// `path:line:col:` prefix check without anchoring to a specific path shape.
fn is_finding_line(line: &str) -> bool {
    let mut parts = line.splitn(4, ':');
    let (Some(path), Some(line_no), Some(col), Some(_rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    !path.is_empty()
        && line_no.trim().parse::<u64>().is_ok()
        && col.trim().parse::<u64>().is_ok()
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::for_tests(ToolRegistry::builtin(), Config::default())
    }

    #[test]
    fn finding_lines_are_recognized() {
        assert!(is_finding_line("a.py:3:1: E302 expected 2 blank lines"));
        assert!(is_finding_line("src/x.sh:10:5: note: something"));
        assert!(!is_finding_line("collected 3 items"));
        assert!(!is_finding_line("a.py:notanumber:1: nope"));
    }

    #[test]
    fn classifier_splits_errors_and_warnings() {
        let out = "a.py:1:1: E501 line too long\na.py:2:1: W291 warning trailing whitespace\nsummary line\n";
        let result = classify_output("flake8", Path::new("a.py"), 1, out, "");
        assert!(!result.success);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(result.messages, vec!["summary line"]);
    }

    #[test]
    fn failing_exit_without_findings_keeps_stderr() {
        let result = classify_output("black", Path::new("a.py"), 2, "", "cannot parse a.py\n");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["cannot parse a.py"]);
    }

    #[test]
    fn clean_exit_is_a_pass() {
        let result = classify_output("black", Path::new("a.py"), 0, "", "");
        assert!(result.success);
        assert_eq!(result.error_count(), 0);
    }

    #[test]
    fn builtin_tools_are_always_available() {
        let d = dispatcher();
        assert!(d.is_available("yaml-lint"));
        assert!(d.is_available("chapel-format"));
        assert!(d.is_available("compose-validate"));
    }

    #[test]
    fn unknown_tool_run_reports_failure() {
        let d = dispatcher();
        let result = d.run_tool("no-such-tool", &[], false);
        assert!(!result.success);
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.error.as_deref().unwrap_or("").contains("unknown tool"));
    }

    #[test]
    fn local_backend_used_when_tool_is_on_path_without_sidecar() {
        // Mirrors the sidecar-absent fallback: a GPL tool resolves to the
        // local backend when the socket is down and the binary exists.
        let d = dispatcher();
        let spec = d.registry().get("shellcheck").expect("spec");
        match d.resolve_backend(spec) {
            Some(Backend::Local) => assert!(process::command_exists("shellcheck")),
            None => assert!(!process::command_exists("shellcheck")),
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn container_backend_requires_opt_in() {
        let d = dispatcher();
        // for_tests never sets a runtime, and the default config keeps the
        // container fallback off.
        let spec = d.registry().get("hadolint").expect("spec");
        if !process::command_exists("hadolint") {
            assert_eq!(d.resolve_backend(spec), None);
        }
    }

    #[test]
    fn yaml_lint_builtin_validates_files() {
        let td = tempdir().expect("tempdir");
        let file = td.path().join("config.yaml");
        fs::write(&file, "key: value\nkey: other\n").expect("write");

        let d = dispatcher();
        let result = d.run_tool("yaml-lint", &[file], false);
        assert!(!result.success);
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.error_count >= 1);
        assert_eq!(result.results.len(), 1);
    }

    #[test]
    fn chapel_builtin_fixes_in_place() {
        let td = tempdir().expect("tempdir");
        let file = td.path().join("main.chpl");
        fs::write(&file, "proc main() {\nwriteln(1);\n}\n").expect("write");

        let d = dispatcher();
        let result = d.run_tool("chapel-format", &[file.clone()], true);
        assert!(result.success);
        assert!(result.results[0].fixed);
        let formatted = fs::read_to_string(&file).expect("read");
        assert!(formatted.contains("  writeln(1);"));
    }

    #[test]
    fn tools_skip_files_they_cannot_handle() {
        let td = tempdir().expect("tempdir");
        let file = td.path().join("main.rs");
        fs::write(&file, "fn main() {}\n").expect("write");

        let d = dispatcher();
        let result = d.run_tool("yaml-lint", &[file], false);
        assert!(result.success);
        assert!(result.results.is_empty());
    }

    #[test]
    fn compose_builtin_reports_semantics() {
        let td = tempdir().expect("tempdir");
        let file = td.path().join("docker-compose.yml");
        fs::write(
            &file,
            "services:\n  web:\n    image: nginx:latest\n    privileged: true\n",
        )
        .expect("write");

        let d = dispatcher();
        let result = d.run_tool("compose-validate", &[file], false);
        assert!(result.success);
        assert!(result.warning_count >= 2);
    }
}
