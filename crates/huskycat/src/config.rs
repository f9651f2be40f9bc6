//! `.huskycat.toml` loading and merging.
//!
//! Everything has a default; the file only overrides. Unknown keys are
//! rejected so typos surface as configuration errors instead of silently
//! doing nothing.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::yaml_lint::YamlLintConfig;

pub const CONFIG_FILE: &str = ".huskycat.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Tools the `configured` selection runs. Absent means "all available".
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    /// Tools excluded everywhere, even from `all`.
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Run-history cache root. Default: repo-local `.huskycat/runs`.
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// Opt-in container fallback backend. Off by default: a missing local
    /// tool should not silently pull images.
    #[serde(default)]
    pub container_backend: bool,

    /// Image used when the container backend runs a tool.
    #[serde(default = "default_container_image")]
    pub container_image: String,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub yaml_lint: YamlLintConfig,
}

fn default_container_image() -> String {
    "huskycat:local".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: None,
            container_backend: false,
            container_image: default_container_image(),
            tools: ToolsConfig::default(),
            yaml_lint: YamlLintConfig::default(),
        }
    }
}

impl Config {
    /// Load `.huskycat.toml` from `dir`, or defaults when absent.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Cache root resolved against `repo_root`.
    pub fn cache_root_in(&self, repo_root: &Path) -> PathBuf {
        match &self.cache_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => repo_root.join(root),
            None => repo_root.join(".huskycat").join("runs"),
        }
    }

    pub fn tool_enabled(&self, name: &str) -> bool {
        !self.tools.disabled.contains(name)
    }
}
