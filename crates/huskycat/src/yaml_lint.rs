//! Clean-room YAML linter.
//!
//! Used in place of yamllint when no GPL backend is reachable. Rules are
//! original implementations over the YAML 1.2 specification: trailing
//! whitespace, line length, tab indentation, mixed indentation, duplicate
//! mapping keys, and optionally empty values. Issues come back ordered by
//! `(line, column)`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YamlIssue {
    pub line: usize,
    pub column: usize,
    pub rule: String,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for YamlIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}:{}: [{}] {}: {}",
            self.line, self.column, sev, self.rule, self.message
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YamlLintConfig {
    pub max_line_length: usize,
    pub allow_tabs: bool,
    pub allow_trailing_whitespace: bool,
    pub allow_empty_values: bool,
    pub allow_duplicate_keys: bool,
    pub disabled_rules: BTreeSet<String>,
}

impl Default for YamlLintConfig {
    fn default() -> Self {
        Self {
            max_line_length: 120,
            allow_tabs: false,
            allow_trailing_whitespace: false,
            allow_empty_values: true,
            allow_duplicate_keys: false,
            disabled_rules: BTreeSet::new(),
        }
    }
}

impl YamlLintConfig {
    fn enabled(&self, rule: &str) -> bool {
        !self.disabled_rules.contains(rule)
    }
}

pub fn lint(content: &str, config: &YamlLintConfig) -> Vec<YamlIssue> {
    let lines: Vec<&str> = content.lines().collect();
    let mut issues = Vec::new();

    check_trailing_whitespace(&lines, config, &mut issues);
    check_line_length(&lines, config, &mut issues);
    check_indentation(&lines, config, &mut issues);
    check_duplicate_keys(&lines, config, &mut issues);
    check_empty_values(&lines, config, &mut issues);
    check_parse(content, config, &mut issues);

    issues.sort_by(|a, b| (a.line, a.column).cmp(&(b.line, b.column)));
    issues
}

fn check_trailing_whitespace(lines: &[&str], config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("trailing-whitespace") || config.allow_trailing_whitespace {
        return;
    }
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let stripped = line.trim_end();
        if stripped.len() < line.len() {
            issues.push(YamlIssue {
                line: idx + 1,
                column: stripped.len() + 1,
                rule: "trailing-whitespace".to_string(),
                message: "trailing whitespace".to_string(),
                severity: Severity::Warning,
            });
        }
    }
}

fn check_line_length(lines: &[&str], config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("line-length") {
        return;
    }
    for (idx, line) in lines.iter().enumerate() {
        let len = line.chars().count();
        if len > config.max_line_length {
            issues.push(YamlIssue {
                line: idx + 1,
                column: config.max_line_length + 1,
                rule: "line-length".to_string(),
                message: format!(
                    "line exceeds maximum length ({len} > {})",
                    config.max_line_length
                ),
                severity: Severity::Warning,
            });
        }
    }
}

/// YAML 1.2 §6.2: indentation is spaces only.
fn check_indentation(lines: &[&str], config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("indentation") {
        return;
    }

    let mut uses_spaces = false;
    let mut uses_tabs = false;

    for (idx, line) in lines.iter().enumerate() {
        let indent: &str = &line[..line.len() - line.trim_start().len()];
        if indent.is_empty() {
            continue;
        }
        if let Some(tab_at) = indent.find('\t') {
            uses_tabs = true;
            if !config.allow_tabs {
                issues.push(YamlIssue {
                    line: idx + 1,
                    column: tab_at + 1,
                    rule: "indentation".to_string(),
                    message: "tab character in indentation (YAML requires spaces)".to_string(),
                    severity: Severity::Error,
                });
            }
        }
        if indent.contains(' ') {
            uses_spaces = true;
        }
    }

    if uses_spaces && uses_tabs {
        issues.push(YamlIssue {
            line: 1,
            column: 1,
            rule: "indentation".to_string(),
            message: "mixed tabs and spaces in indentation".to_string(),
            severity: Severity::Warning,
        });
    }
}

/// Line-scan duplicate detection with an indentation stack. Keys at the same
/// indent inside the same block must be unique.
fn check_duplicate_keys(lines: &[&str], config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("duplicate-keys") || config.allow_duplicate_keys {
        return;
    }

    // Stack of (indent, keys seen at that indent).
    let mut stack: Vec<(usize, BTreeSet<String>)> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with("---") || trimmed.starts_with("...") {
            stack.clear();
            continue;
        }
        // Sequence items open a fresh mapping context per item.
        if trimmed.starts_with('-') {
            continue;
        }

        let Some(key) = mapping_key(trimmed) else {
            continue;
        };
        let indent = line.len() - trimmed.len();

        while stack.last().is_some_and(|(i, _)| *i > indent) {
            stack.pop();
        }

        match stack.last_mut() {
            Some((i, keys)) if *i == indent => {
                if !keys.insert(key.to_string()) {
                    issues.push(YamlIssue {
                        line: idx + 1,
                        column: indent + 1,
                        rule: "duplicate-keys".to_string(),
                        message: format!("duplicate key '{key}' in mapping"),
                        severity: Severity::Error,
                    });
                }
            }
            _ => {
                stack.push((indent, [key.to_string()].into_iter().collect()));
            }
        }
    }
}

fn check_empty_values(lines: &[&str], config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("empty-values") || config.allow_empty_values {
        return;
    }

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
            continue;
        }
        let Some(key) = mapping_key(trimmed) else {
            continue;
        };
        let rest = &trimmed[key.len() + 1..];
        let value = match rest.find('#') {
            Some(pos) => rest[..pos].trim(),
            None => rest.trim(),
        };
        if !value.is_empty() {
            continue;
        }

        // A block opener is not an empty value: its value is the indented
        // block that follows.
        let indent = line.len() - trimmed.len();
        let opens_block = lines[idx + 1..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|next| next.len() - next.trim_start().len() > indent);
        if opens_block {
            continue;
        }

        issues.push(YamlIssue {
            line: idx + 1,
            column: line.trim_end().len(),
            rule: "empty-values".to_string(),
            message: format!("empty value for key '{key}'"),
            severity: Severity::Warning,
        });
    }
}

fn check_parse(content: &str, config: &YamlLintConfig, issues: &mut Vec<YamlIssue>) {
    if !config.enabled("parse-error") {
        return;
    }
    // Stream deserialization so multi-document files are not misreported.
    for doc in serde_yaml::Deserializer::from_str(content) {
        if let Err(err) = serde_yaml::Value::deserialize(doc) {
            let (line, column) = err
                .location()
                .map(|loc| (loc.line(), loc.column()))
                .unwrap_or((1, 1));
            issues.push(YamlIssue {
                line,
                column,
                rule: "parse-error".to_string(),
                message: format!("YAML parsing error: {err}"),
                severity: Severity::Error,
            });
            break;
        }
    }
}

/// The mapping key opening `line`, if the line looks like `key: ...`.
fn mapping_key(trimmed: &str) -> Option<&str> {
    let colon = trimmed.find(':')?;
    let key = trimmed[..colon].trim_end();
    if key.is_empty() {
        return None;
    }
    // Value-position colons (URLs, quoted text) are not mapping keys.
    let ok = key
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '"' | '\''));
    if !ok {
        return None;
    }
    // `key:value` without a space is a scalar, not a mapping entry.
    let rest = &trimmed[colon + 1..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some(key)
}
