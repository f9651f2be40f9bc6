//! The tool registry: one closed set of named validators, discovered once at
//! startup and immutable for the life of the process.
//!
//! Unknown tool names are errors, not silent no-ops.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Result, bail};

use crate::types::FixConfidence;

/// Tools hosted by the GPL sidecar when one is reachable.
pub const GPL_TOOLS: [&str; 3] = ["shellcheck", "hadolint", "yamllint"];

pub fn is_gpl_tool(name: &str) -> bool {
    GPL_TOOLS.contains(&name)
}

/// How a tool decides whether a file is its business.
#[derive(Debug, Clone, Default)]
pub struct FileMatcher {
    /// Extensions including the dot, e.g. `.py`.
    pub extensions: BTreeSet<String>,
    /// Exact file names, e.g. `Dockerfile`.
    pub filenames: BTreeSet<String>,
    /// Path substring, e.g. `.github/workflows`.
    pub path_contains: Option<String>,
}

impl FileMatcher {
    pub fn extensions(exts: &[&str]) -> Self {
        Self {
            extensions: exts.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn can_handle(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if self.filenames.contains(name) {
                return true;
            }
            // Containerfile variants like Dockerfile.dev.
            if self
                .filenames
                .iter()
                .any(|f| name.starts_with(&format!("{f}.")))
            {
                return true;
            }
        }
        if let Some(needle) = &self.path_contains {
            let joined = path.display().to_string();
            if joined.contains(needle) {
                return true;
            }
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            return self.extensions.contains(&format!(".{ext}"));
        }
        false
    }
}

/// Leaf utilities the core runs in-process instead of spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    YamlLint,
    ChapelFormat,
    ComposeValidate,
    ActionsValidate,
}

/// How a tool executes.
#[derive(Debug, Clone)]
pub enum ToolKind {
    /// External program resolved through the backend chain.
    External {
        /// Executable name.
        command: String,
        /// Arguments before the file path in check mode.
        check_args: Vec<String>,
        /// Arguments before the file path when the tool self-fixes. Absent
        /// for tools that cannot fix.
        fix_args: Option<Vec<String>>,
    },
    /// In-process leaf utility; always available.
    Builtin(BuiltinKind),
}

/// A named validator: matching rules, execution shape, upstream
/// dependencies, and a fix-confidence tier.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub matcher: FileMatcher,
    pub kind: ToolKind,
    /// Upstream tools that must complete successfully first.
    pub depends_on: Vec<String>,
    pub fix: FixConfidence,
    /// Included in the blocking-hook fast subset.
    pub fast: bool,
}

impl ToolSpec {
    pub fn command(&self) -> Option<&str> {
        match &self.kind {
            ToolKind::External { command, .. } => Some(command),
            ToolKind::Builtin(_) => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, ToolKind::Builtin(_))
    }
}

/// Immutable name-keyed registry.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn from_specs(specs: Vec<ToolSpec>) -> Self {
        let tools = specs.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self { tools }
    }

    /// The built-in tool set.
    pub fn builtin() -> Self {
        let external = |command: &str, check: &[&str], fix: Option<&[&str]>| ToolKind::External {
            command: command.to_string(),
            check_args: check.iter().map(|s| s.to_string()).collect(),
            fix_args: fix.map(|a| a.iter().map(|s| s.to_string()).collect()),
        };

        let specs = vec![
            ToolSpec {
                name: "black".to_string(),
                matcher: FileMatcher::extensions(&[".py"]),
                kind: external("black", &["--check", "--quiet"], Some(&["--quiet"])),
                depends_on: vec![],
                fix: FixConfidence::Safe,
                fast: true,
            },
            ToolSpec {
                name: "ruff".to_string(),
                matcher: FileMatcher::extensions(&[".py"]),
                kind: external("ruff", &["check"], Some(&["check", "--fix"])),
                depends_on: vec!["black".to_string()],
                fix: FixConfidence::Likely,
                fast: true,
            },
            ToolSpec {
                name: "flake8".to_string(),
                matcher: FileMatcher::extensions(&[".py"]),
                kind: external("flake8", &[], None),
                depends_on: vec!["black".to_string()],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "mypy".to_string(),
                matcher: FileMatcher::extensions(&[".py"]),
                kind: external("mypy", &["--no-error-summary"], None),
                depends_on: vec!["black".to_string()],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "shellcheck".to_string(),
                matcher: FileMatcher::extensions(&[".sh", ".bash"]),
                kind: external("shellcheck", &["--format", "gcc"], None),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "hadolint".to_string(),
                matcher: FileMatcher {
                    filenames: ["Dockerfile", "Containerfile"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    ..FileMatcher::default()
                },
                kind: external("hadolint", &[], None),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "ansible-lint".to_string(),
                matcher: FileMatcher {
                    filenames: ["playbook.yml", "playbook.yaml", "site.yml", "site.yaml"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    path_contains: Some("playbooks".to_string()),
                    ..FileMatcher::default()
                },
                kind: external("ansible-lint", &["--parseable"], None),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "yamllint".to_string(),
                matcher: FileMatcher::extensions(&[".yaml", ".yml"]),
                kind: external("yamllint", &["--format", "parsable"], None),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            // Clean-room fallback for when no yamllint backend is reachable.
            ToolSpec {
                name: "yaml-lint".to_string(),
                matcher: FileMatcher::extensions(&[".yaml", ".yml"]),
                kind: ToolKind::Builtin(BuiltinKind::YamlLint),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: true,
            },
            ToolSpec {
                name: "chapel-format".to_string(),
                matcher: FileMatcher::extensions(&[".chpl"]),
                kind: ToolKind::Builtin(BuiltinKind::ChapelFormat),
                depends_on: vec![],
                fix: FixConfidence::Safe,
                fast: true,
            },
            ToolSpec {
                name: "compose-validate".to_string(),
                matcher: FileMatcher {
                    filenames: [
                        "docker-compose.yml",
                        "docker-compose.yaml",
                        "compose.yml",
                        "compose.yaml",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    ..FileMatcher::default()
                },
                kind: ToolKind::Builtin(BuiltinKind::ComposeValidate),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
            ToolSpec {
                name: "actions-validate".to_string(),
                matcher: FileMatcher {
                    path_contains: Some(".github/workflows".to_string()),
                    ..FileMatcher::default()
                },
                kind: ToolKind::Builtin(BuiltinKind::ActionsValidate),
                depends_on: vec![],
                fix: FixConfidence::Uncertain,
                fast: false,
            },
        ];

        Self::from_specs(specs)
    }

    pub fn get(&self, name: &str) -> Result<&ToolSpec> {
        match self.tools.get(name) {
            Some(spec) => Ok(spec),
            None => bail!("unknown tool: {name}"),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(|s| s.as_str())
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    /// Dependency map over the whole registry, for executor construction.
    pub fn dependency_map(&self) -> BTreeMap<String, Vec<String>> {
        self.tools
            .iter()
            .map(|(name, spec)| (name.clone(), spec.depends_on.clone()))
            .collect()
    }

    /// Tools whose matcher accepts at least one of `files`.
    pub fn tools_for_files(&self, files: &[std::path::PathBuf]) -> BTreeSet<String> {
        self.tools
            .values()
            .filter(|spec| files.iter().any(|f| spec.matcher.can_handle(f)))
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Restrict the registry to `keep`, dropping dependency edges onto
    /// excluded tools.
    pub fn restricted_to(&self, keep: &BTreeSet<String>) -> Self {
        let tools: BTreeMap<String, ToolSpec> = self
            .tools
            .iter()
            .filter(|(name, _)| keep.contains(*name))
            .map(|(name, spec)| {
                let mut spec = spec.clone();
                spec.depends_on.retain(|d| keep.contains(d));
                (name.clone(), spec)
            })
            .collect();
        Self { tools }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn builtin_registry_knows_the_core_tools() {
        let reg = ToolRegistry::builtin();
        for name in [
            "black",
            "ruff",
            "flake8",
            "mypy",
            "shellcheck",
            "hadolint",
            "yamllint",
            "ansible-lint",
            "yaml-lint",
            "chapel-format",
            "compose-validate",
            "actions-validate",
        ] {
            assert!(reg.contains(name), "missing {name}");
        }
    }

    #[test]
    fn unknown_tool_is_an_error() {
        let reg = ToolRegistry::builtin();
        assert!(reg.get("clippy-for-python").is_err());
    }

    #[test]
    fn extension_matching_handles_python_files() {
        let reg = ToolRegistry::builtin();
        let spec = reg.get("black").expect("black");
        assert!(spec.matcher.can_handle(Path::new("src/a.py")));
        assert!(!spec.matcher.can_handle(Path::new("src/a.rs")));
    }

    #[test]
    fn filename_matching_handles_dockerfiles() {
        let reg = ToolRegistry::builtin();
        let spec = reg.get("hadolint").expect("hadolint");
        assert!(spec.matcher.can_handle(Path::new("Dockerfile")));
        assert!(spec.matcher.can_handle(Path::new("deploy/Dockerfile.dev")));
        assert!(spec.matcher.can_handle(Path::new("Containerfile")));
        assert!(!spec.matcher.can_handle(Path::new("Makefile")));
    }

    #[test]
    fn path_matching_handles_workflow_files() {
        let reg = ToolRegistry::builtin();
        let spec = reg.get("actions-validate").expect("actions-validate");
        assert!(spec.matcher.can_handle(Path::new(".github/workflows/ci.yml")));
        assert!(!spec.matcher.can_handle(Path::new("config/app.yml")));
    }

    #[test]
    fn tools_for_files_unions_matchers() {
        let reg = ToolRegistry::builtin();
        let files = vec![PathBuf::from("a.py"), PathBuf::from("run.sh")];
        let tools = reg.tools_for_files(&files);
        assert!(tools.contains("black"));
        assert!(tools.contains("ruff"));
        assert!(tools.contains("shellcheck"));
        assert!(!tools.contains("hadolint"));
    }

    #[test]
    fn gpl_tool_set_is_closed() {
        assert!(is_gpl_tool("shellcheck"));
        assert!(is_gpl_tool("hadolint"));
        assert!(is_gpl_tool("yamllint"));
        assert!(!is_gpl_tool("black"));
    }

    #[test]
    fn restriction_drops_dangling_dependency_edges() {
        let reg = ToolRegistry::builtin();
        let keep: BTreeSet<String> = ["ruff".to_string()].into_iter().collect();
        let restricted = reg.restricted_to(&keep);
        assert!(restricted.get("ruff").expect("ruff").depends_on.is_empty());
        assert!(!restricted.contains("black"));
    }
}
