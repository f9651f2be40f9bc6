//! Shared support for the CI-file schema validators.

use serde_json::Value as Json;
use serde_yaml::Value as Yaml;

/// Outcome of one schema-plus-semantic validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Convert parsed YAML into JSON for schema validation.
///
/// YAML mapping keys are not necessarily strings (`on:` resolves oddly in
/// some emitters); every key is stringified rather than rejected.
pub fn yaml_to_json(value: &Yaml) -> Json {
    match value {
        Yaml::Null => Json::Null,
        Yaml::Bool(b) => Json::Bool(*b),
        Yaml::Number(n) => serde_json::to_value(n).unwrap_or(Json::Null),
        Yaml::String(s) => Json::String(s.clone()),
        Yaml::Sequence(seq) => Json::Array(seq.iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (key, val) in map {
                object.insert(yaml_key(key), yaml_to_json(val));
            }
            Json::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn yaml_key(key: &Yaml) -> String {
    match key {
        Yaml::String(s) => s.clone(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

/// Run a compiled schema over `instance`, appending one error per violation.
pub fn apply_schema(validator: &jsonschema::Validator, instance: &Json, report: &mut FileReport) {
    for err in validator.iter_errors(instance) {
        let path = err.instance_path().to_string();
        if path.is_empty() {
            report.error(format!("schema: {err}"));
        } else {
            report.error(format!("schema at {path}: {err}"));
        }
    }
}
