use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use siggen_core::schema::signature_registry;
use siggen_core::services::encoder::EncoderLimits;
use siggen_core::Dialect;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialectInfo {
    pub name: &'static str,
    pub variant_id: u32,
    /// Largest bounded jump; `None` when the dialect has no limit.
    pub max_jump: Option<u32>,
}

/// Every dialect with its stable variant identifier and default jump limit.
pub fn dialect_infos() -> Result<Vec<DialectInfo>> {
    let registry = signature_registry().context("Failed to load signature variant table")?;
    let limits = EncoderLimits::default();
    Dialect::ALL
        .iter()
        .map(|dialect| {
            let variant_id = registry
                .id_of(dialect.as_str())
                .ok_or_else(|| anyhow!("Dialect {dialect} has no variant identifier"))?;
            Ok(DialectInfo { name: dialect.as_str(), variant_id, max_jump: limits.max_jump(*dialect) })
        })
        .collect()
}

/// `siggen list-dialects`.
pub fn list_dialects_command(json: bool) -> Result<()> {
    let dialects = dialect_infos()?;

    if json {
        let serialized = serde_json::to_string_pretty(&dialects)
            .context("Failed to serialize dialects to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Dialects ({}):", dialects.len());
    for info in dialects {
        match info.max_jump {
            Some(max) => println!("  - {} (id {}) max jump {} bytes", info.name, info.variant_id, max),
            None => println!("  - {} (id {}) no jump limit", info.name, info.variant_id),
        }
    }
    Ok(())
}
