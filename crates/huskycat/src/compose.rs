//! Compose file validation: JSON-Schema shape checks plus the semantic rules
//! schema validation cannot express (dangling references, risky settings).

use std::sync::OnceLock;

use serde_json::{Value as Json, json};

use crate::schema::{FileReport, apply_schema, yaml_to_json};

fn compose_schema() -> &'static jsonschema::Validator {
    static SCHEMA: OnceLock<jsonschema::Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema = json!({
            "type": "object",
            "properties": {
                "version": { "type": "string" },
                "services": {
                    "type": "object",
                    "additionalProperties": { "type": "object" }
                },
                "volumes": { "type": ["object", "null"] },
                "networks": { "type": ["object", "null"] },
                "secrets": { "type": ["object", "null"] },
                "configs": { "type": ["object", "null"] }
            },
            "required": ["services"]
        });
        jsonschema::validator_for(&schema).expect("compose schema is valid")
    })
}

/// Validate Compose file content. Returns schema violations as errors and
/// semantic findings as warnings.
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

    apply_schema(compose_schema(), &doc, &mut report);
    if !report.is_valid() {
        return report;
    }

    semantic_checks(&doc, &mut report);
    report
}

fn semantic_checks(doc: &Json, report: &mut FileReport) {
    if doc.get("version").is_some() {
        report.warn("top-level 'version' is obsolete and ignored by Compose v2");
    }

    let empty = serde_json::Map::new();
    let services = doc
        .get("services")
        .and_then(Json::as_object)
        .unwrap_or(&empty);
    let defined_volumes = top_level_names(doc, "volumes");
    let defined_networks = top_level_names(doc, "networks");
    let defined_secrets = top_level_names(doc, "secrets");
    let defined_configs = top_level_names(doc, "configs");

    for (name, service) in services {
        let Some(service) = service.as_object() else {
            continue;
        };

        if !service.contains_key("image") && !service.contains_key("build") {
            report.warn(format!("service '{name}' has neither 'image' nor 'build'"));
        }

        if let Some(image) = service.get("image").and_then(Json::as_str) {
            check_image_tag(name, image, report);
        }

        if service.get("privileged").and_then(Json::as_bool) == Some(true) {
            report.warn(format!("service '{name}' runs privileged"));
        }

        check_depends_on(name, service, services, report);
        check_service_volumes(name, service, &defined_volumes, report);
        check_service_refs(name, service, "networks", &defined_networks, report);
        check_service_refs(name, service, "secrets", &defined_secrets, report);
        check_service_refs(name, service, "configs", &defined_configs, report);
    }
}

fn top_level_names(doc: &Json, section: &str) -> Vec<String> {
    doc.get(section)
        .and_then(Json::as_object)
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

fn check_image_tag(service: &str, image: &str, report: &mut FileReport) {
    // registry.example.com:5000/app has a port, not a tag.
    let after_slash = image.rsplit('/').next().unwrap_or(image);
    match after_slash.split_once(':') {
        None => report.warn(format!(
            "service '{service}' image '{image}' has no pinned tag"
        )),
        Some((_, "latest")) => report.warn(format!(
            "service '{service}' image '{image}' uses the ':latest' tag"
        )),
        Some(_) => {}
    }
}

/// `depends_on` as either a string list or a map of condition dicts.
fn check_depends_on(
    service: &str,
    body: &serde_json::Map<String, Json>,
    services: &serde_json::Map<String, Json>,
    report: &mut FileReport,
) {
    let Some(depends) = body.get("depends_on") else {
        return;
    };

    let referenced: Vec<String> = match depends {
        Json::Array(items) => items
            .iter()
            .filter_map(Json::as_str)
            .map(str::to_string)
            .collect(),
        Json::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    for dep in referenced {
        if dep == "default" {
            continue;
        }
        if !services.contains_key(&dep) {
            report.warn(format!(
                "service '{service}' depends_on undefined service '{dep}'"
            ));
        }
    }
}

fn check_service_volumes(
    service: &str,
    body: &serde_json::Map<String, Json>,
    defined: &[String],
    report: &mut FileReport,
) {
    let Some(volumes) = body.get("volumes").and_then(Json::as_array) else {
        return;
    };

    for entry in volumes {
        let source = match entry {
            Json::String(spec) => spec.split(':').next().unwrap_or("").to_string(),
            Json::Object(map) => {
                if map.get("type").and_then(Json::as_str) == Some("bind") {
                    continue;
                }
                map.get("source")
                    .and_then(Json::as_str)
                    .unwrap_or("")
                    .to_string()
            }
            _ => continue,
        };

        // Bind mounts are paths, not named volumes.
        if source.is_empty()
            || source.starts_with('/')
            || source.starts_with('.')
            || source.starts_with('~')
            || source.starts_with('$')
        {
            continue;
        }

        if !defined.iter().any(|v| v == &source) {
            report.warn(format!(
                "service '{service}' references undefined volume '{source}'"
            ));
        }
    }
}

fn check_service_refs(
    service: &str,
    body: &serde_json::Map<String, Json>,
    section: &str,
    defined: &[String],
    report: &mut FileReport,
) {
    let Some(refs) = body.get(section) else {
        return;
    };

    let names: Vec<String> = match refs {
        Json::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Json::String(s) => Some(s.clone()),
                // Long syntax: - source: app-secret
                Json::Object(map) => map
                    .get("source")
                    .and_then(Json::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Json::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let singular = section.trim_end_matches('s');
    for name in names {
        if section == "networks" && name == "default" {
            continue;
        }
        if !defined.iter().any(|d| d == &name) {
            report.warn(format!(
                "service '{service}' references undefined {singular} '{name}'"
            ));
        }
    }
}
