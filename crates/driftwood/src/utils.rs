use anyhow::Context;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

/// Read a resource configuration file
///
/// YAML is a superset of JSON, so both formats are accepted.
pub fn load_resource_config(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    let config: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
    if !config.is_object() {
        anyhow::bail!("{} must contain a mapping of attributes", path.display());
    }
    Ok(config)
}

/// Print attributes as `key = value` lines
pub fn print_attributes<'a>(attributes: impl IntoIterator<Item = (&'a String, &'a Value)>) {
    for (key, value) in attributes {
        let rendered = match value {
            Value::String(s) => format!("{s:?}"),
            other => other.to_string(),
        };
        println!("  {} = {}", key.cyan(), rendered);
    }
}
