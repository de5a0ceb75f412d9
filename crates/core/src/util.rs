use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Read a YAML or JSON document from disk, picking the parser from the extension.
///
/// `.json` is parsed as JSON; anything else (typically `.yaml`/`.yml`) as YAML.
pub fn read_structured<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read {what} at {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&body)
            .with_context(|| format!("Failed to parse {what} JSON at {}", path.display()))
    } else {
        serde_yaml::from_slice(&body)
            .with_context(|| format!("Failed to parse {what} YAML at {}", path.display()))
    }
}
