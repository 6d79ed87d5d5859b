use anyhow::Result;
use arbor_core::SyncConfig;

pub fn show(config: &SyncConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
