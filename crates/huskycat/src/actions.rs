//! GitHub Actions workflow validation: schema shape plus semantic checks
//! (unpinned actions, dangling `needs`, contradictory triggers).

use std::sync::OnceLock;

use serde_json::{Value as Json, json};

use crate::schema::{FileReport, apply_schema, yaml_to_json};

fn workflow_schema() -> &'static jsonschema::Validator {
    static SCHEMA: OnceLock<jsonschema::Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "jobs": {
                    "type": "object",
                    "additionalProperties": { "type": "object" }
                }
            }
        });
        jsonschema::validator_for(&schema).expect("workflow schema is valid")
    })
}

/// Validate workflow content. Missing `on`/`jobs` are errors; everything
/// else the file can limp along with is a warning.
pub fn validate_content(content: &str) -> FileReport {
    let mut report = FileReport::default();

    let yaml: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            report.error(format!("YAML parse error: {err}"));
            return report;
        }
    };
    let doc = yaml_to_json(&yaml);

    apply_schema(workflow_schema(), &doc, &mut report);
    if !report.is_valid() {
        return report;
    }

    // YAML resolvers may turn the bare `on` key into boolean true.
    let trigger = doc.get("on").or_else(|| doc.get("true"));
    match trigger {
        None => report.error("workflow has no 'on' trigger"),
        Some(on) => check_triggers(on, &mut report),
    }

    match doc.get("jobs").and_then(Json::as_object) {
        None => report.error("workflow has no 'jobs'"),
        Some(jobs) => {
            let job_names: Vec<&String> = jobs.keys().collect();
            for (name, job) in jobs {
                let Some(job) = job.as_object() else {
                    continue;
                };
                check_job(name, job, &job_names, &mut report);
            }
        }
    }

    report
}

fn check_triggers(on: &Json, report: &mut FileReport) {
    let Some(events) = on.as_object() else {
        // `on: push` and `on: [push, pull_request]` are fine as-is.
        return;
    };

    for (event, body) in events {
        let Some(body) = body.as_object() else {
            continue;
        };
        if body.contains_key("branches") && body.contains_key("branches-ignore") {
            report.warn(format!(
                "'{event}' sets both 'branches' and 'branches-ignore'; GitHub rejects the combination"
            ));
        }
    }
}

fn check_job(
    name: &str,
    job: &serde_json::Map<String, Json>,
    job_names: &[&String],
    report: &mut FileReport,
) {
    // Reusable-workflow jobs delegate runner and steps to the callee.
    let is_reusable = job.contains_key("uses");

    if !is_reusable && !job.contains_key("runs-on") {
        report.warn(format!("job '{name}' has no 'runs-on'"));
    }
    if !is_reusable && !job.contains_key("steps") {
        report.warn(format!("job '{name}' has no 'steps'"));
    }

    if let Some(needs) = job.get("needs") {
        let referenced: Vec<String> = match needs {
            Json::String(s) => vec![s.clone()],
            Json::Array(items) => items
                .iter()
                .filter_map(Json::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        for dep in referenced {
            if !job_names.iter().any(|j| **j == dep) {
                report.warn(format!("job '{name}' needs undefined job '{dep}'"));
            }
        }
    }

    if let Some(steps) = job.get("steps").and_then(Json::as_array) {
        for (idx, step) in steps.iter().enumerate() {
            let Some(step) = step.as_object() else {
                continue;
            };
            check_step(name, idx, step, report);
        }
    }
}

fn check_step(
    job: &str,
    idx: usize,
    step: &serde_json::Map<String, Json>,
    report: &mut FileReport,
) {
    let uses = step.get("uses").and_then(Json::as_str);

    if uses.is_none() && !step.contains_key("run") {
        report.warn(format!(
            "job '{job}' step {} has neither 'uses' nor 'run'",
            idx + 1
        ));
    }

    if let Some(action) = uses {
        if let Some((_, reference)) = action.split_once('@') {
            if reference == "main" || reference == "master" {
                report.warn(format!(
                    "job '{job}' step {} uses unpinned action '{action}'",
                    idx + 1
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warnings_text(report: &FileReport) -> String {
        report.warnings.join(" | ")
    }

    const VALID: &str = "\
name: ci
on:
  push:
    branches: [main]
jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - run: cargo test
";

    #[test]
    fn valid_workflow_passes_cleanly() {
        let report = validate_content(VALID);
        assert!(report.is_valid(), "{report:?}");
        assert!(report.warnings.is_empty(), "{report:?}");
    }

    #[test]
    fn missing_on_is_an_error() {
        let report = validate_content("jobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: true\n");
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("'on'")));
    }

    #[test]
    fn missing_jobs_is_an_error() {
        let report = validate_content("on: push\n");
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("'jobs'")));
    }

    #[test]
    fn bare_on_key_resolved_as_boolean_still_counts() {
        // Some YAML stacks resolve the unquoted `on` key to boolean true.
        let report = validate_content("true: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: true\n");
        assert!(!report.errors.iter().any(|e| e.contains("'on'")), "{report:?}");
    }

    #[test]
    fn job_without_runs_on_or_steps_warns() {
        let report = validate_content("on: push\njobs:\n  broken:\n    env:\n      A: b\n");
        let text = warnings_text(&report);
        assert!(text.contains("no 'runs-on'"));
        assert!(text.contains("no 'steps'"));
    }

    #[test]
    fn reusable_workflow_jobs_are_exempt() {
        let report =
            validate_content("on: push\njobs:\n  call:\n    uses: org/repo/.github/workflows/ci.yml@v1\n");
        assert!(report.warnings.is_empty(), "{report:?}");
    }

    #[test]
    fn step_without_uses_or_run_warns() {
        let report = validate_content(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - name: mystery\n",
        );
        assert!(warnings_text(&report).contains("neither 'uses' nor 'run'"));
    }

    #[test]
    fn actions_pinned_to_moving_branches_warn() {
        let report = validate_content(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - uses: actions/checkout@main\n",
        );
        assert!(warnings_text(&report).contains("unpinned action"));

        let pinned = validate_content(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - uses: actions/checkout@v4\n",
        );
        assert!(!warnings_text(&pinned).contains("unpinned"));
    }

    #[test]
    fn dangling_needs_reference_warns() {
        let report = validate_content(
            "on: push\njobs:\n  b:\n    runs-on: x\n    needs: missing\n    steps:\n      - run: true\n",
        );
        assert!(warnings_text(&report).contains("undefined job 'missing'"));
    }

    #[test]
    fn satisfied_needs_reference_is_quiet() {
        let report = validate_content(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: true\n  b:\n    runs-on: x\n    needs: [a]\n    steps:\n      - run: true\n",
        );
        assert!(!warnings_text(&report).contains("undefined job"));
    }

    #[test]
    fn branches_and_branches_ignore_together_warn() {
        let report = validate_content(
            "on:\n  push:\n    branches: [main]\n    branches-ignore: [dev]\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: true\n",
        );
        assert!(warnings_text(&report).contains("branches-ignore"));
    }

    #[test]
    fn unparseable_workflow_is_an_error() {
        let report = validate_content("on: [unclosed\n");
        assert!(!report.is_valid());
    }
}
