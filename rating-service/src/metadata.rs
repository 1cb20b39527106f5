//! Resource metadata merging.
//!
//! Descriptive fields on a resource are resolved from the raw metering
//! sample by a declarative rule list: each output field names an ordered
//! list of candidate source paths, and the first path present in the sample
//! wins. Fields whose sources are all absent keep their existing value, so
//! merging is incremental and idempotent.

use anyhow::anyhow;
use serde::Deserialize;
use serde_json::{Map, Value};
use service_core::error::AppError;
use std::collections::BTreeMap;

/// Rule for one output field: ordered candidate source paths within the
/// sample metadata (dotted for nesting), plus an optional `{value}` template.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub sources: Vec<String>,
    #[serde(default)]
    pub template: Option<String>,
}

/// Field rules for one resource type, keyed by output field name.
pub type FieldDefs = BTreeMap<String, FieldDef>;

/// All field rules, keyed by resource type.
pub type MetadataDefs = BTreeMap<String, FieldDefs>;

/// Load metadata field definitions from a JSON file. Unreadable or
/// malformed definitions are fatal: collection cannot run without them.
pub fn load_defs(path: &str) -> Result<MetadataDefs, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(anyhow!(
            "failed to read metadata definitions '{}': {}",
            path,
            e
        ))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        AppError::ConfigError(anyhow!(
            "failed to parse metadata definitions '{}': {}",
            path,
            e
        ))
    })
}

/// Merge metadata from a raw sample into a resource's existing info map
/// according to the field rules. First present source wins per field.
pub fn merge_resource_metadata(
    existing: &mut Map<String, Value>,
    sample_metadata: &Value,
    defs: &FieldDefs,
) {
    for (field, def) in defs {
        for source in &def.sources {
            if let Some(value) = lookup(sample_metadata, source) {
                match &def.template {
                    Some(template) => {
                        let rendered = template.replace("{value}", &render_value(value));
                        existing.insert(field.clone(), Value::String(rendered));
                    }
                    None => {
                        existing.insert(field.clone(), value.clone());
                    }
                }
                break;
            }
        }
    }
}

/// Resolve a dotted path within a metadata blob.
fn lookup<'a>(metadata: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = metadata;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
