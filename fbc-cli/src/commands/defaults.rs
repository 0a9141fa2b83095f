//! Defaults command

use anyhow::Result;
use fbc_core::settings::SourceSettings;

/// Print the stock source settings as JSON
pub fn defaults() -> Result<()> {
    let settings = SourceSettings::default();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
