//! Result rendering for every output shape an adapter can pick.

use std::collections::BTreeMap;

use serde_json::json;

use crate::types::{RunSummary, ValidationResult};

/// Results grouped by file path, the shape adapters format.
pub type ResultsByFile = BTreeMap<String, Vec<ValidationResult>>;

/// Group executor results per file for the formatters.
pub fn group_by_file(results: impl IntoIterator<Item = ValidationResult>) -> ResultsByFile {
    let mut grouped: ResultsByFile = BTreeMap::new();
    for result in results {
        grouped.entry(result.filepath.clone()).or_default().push(result);
    }
    grouped
}

/// Minimal: silence on success, one line per error otherwise. Hook output.
pub fn render_minimal(results: &ResultsByFile, summary: &RunSummary) -> String {
    if summary.errors == 0 {
        return String::new();
    }

    let mut lines = Vec::new();
    for file_results in results.values() {
        for result in file_results {
            for error in &result.errors {
                lines.push(format!("{}: {}", result.tool, error));
            }
        }
    }
    lines.push(format!(
        "huskycat: {} errors, {} warnings across {} files",
        summary.errors, summary.warnings, summary.total_files
    ));
    lines.join("\n") + "\n"
}

/// Human: per-file sections with findings, then a summary line. Optional
/// ANSI color.
pub fn render_human(results: &ResultsByFile, summary: &RunSummary, color: bool) -> String {
    let (red, yellow, green, reset) = if color {
        ("\x1b[31m", "\x1b[33m", "\x1b[32m", "\x1b[0m")
    } else {
        ("", "", "", "")
    };

    let mut out = String::new();
    for (file, file_results) in results {
        let file_errors: usize = file_results.iter().map(ValidationResult::error_count).sum();
        let file_warnings: usize = file_results
            .iter()
            .map(ValidationResult::warning_count)
            .sum();
        if file_errors == 0 && file_warnings == 0 {
            continue;
        }

        out.push_str(&format!("{file}\n"));
        for result in file_results {
            for error in &result.errors {
                out.push_str(&format!("  {red}error{reset} [{}] {error}\n", result.tool));
            }
            for warning in &result.warnings {
                out.push_str(&format!(
                    "  {yellow}warning{reset} [{}] {warning}\n",
                    result.tool
                ));
            }
        }
        out.push('\n');
    }

    if summary.success {
        out.push_str(&format!(
            "{green}✓ {} files clean{reset} ({} tools, {} warnings, {} ms)\n",
            summary.total_files,
            summary.tools_run.len(),
            summary.warnings,
            summary.duration_ms
        ));
    } else {
        out.push_str(&format!(
            "{red}✗ {} errors{reset}, {} warnings across {} files ({} tools, {} ms)\n",
            summary.errors,
            summary.warnings,
            summary.total_files,
            summary.tools_run.len(),
            summary.duration_ms
        ));
        out.push_str("  run `huskycat validate --fix` to apply safe fixes\n");
    }
    out
}

/// Pipeline JSON: `{summary, results: {filepath -> [ValidationResult]}}`.
pub fn render_json(results: &ResultsByFile, summary: &RunSummary) -> String {
    let value = json!({
        "summary": summary,
        "results": results,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

/// JUnit XML: one `<testsuite>` per file, one `<testcase>` per (tool, file).
pub fn render_junit(results: &ResultsByFile, summary: &RunSummary) -> String {
    let total_tests: usize = results.values().map(Vec::len).sum();
    let total_failures: usize = results
        .values()
        .flatten()
        .filter(|r| !r.success)
        .count();

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<testsuites name=\"huskycat\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">\n",
        total_tests,
        total_failures,
        summary.duration_ms as f64 / 1000.0
    ));

    for (file, file_results) in results {
        let failures = file_results.iter().filter(|r| !r.success).count();
        xml.push_str(&format!(
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\">\n",
            xml_escape(file),
            file_results.len(),
            failures
        ));

        for result in file_results {
            xml.push_str(&format!(
                "    <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\"",
                xml_escape(&result.tool),
                xml_escape(&result.filepath),
                result.duration_ms as f64 / 1000.0
            ));
            if result.success {
                xml.push_str("/>\n");
            } else {
                xml.push_str(">\n");
                let message = result
                    .errors
                    .first()
                    .map(String::as_str)
                    .unwrap_or("validation failed");
                xml.push_str(&format!(
                    "      <failure message=\"{}\">{}</failure>\n",
                    xml_escape(message),
                    xml_escape(&result.errors.join("\n"))
                ));
                xml.push_str("    </testcase>\n");
            }
        }
        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
