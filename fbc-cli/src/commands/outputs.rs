//! Outputs command

use anyhow::{Context, Result};
use fbc_core::backend::NvfbcBackend;
use fbc_core::monitor;

/// List outputs the driver can capture
pub fn outputs() -> Result<()> {
    let backend = NvfbcBackend::new().context("loading the NvFBC driver library")?;
    let outputs = monitor::list_outputs(&backend).context("querying capture status")?;

    if outputs.is_empty() {
        println!("No outputs reported.");
        println!("\nNote: the driver only reports outputs on an X session with RandR.");
        return Ok(());
    }

    println!("{:<6} {:<20} {:<12}", "ID", "Name", "Tracked size");
    println!("{}", "-".repeat(40));
    for output in &outputs {
        let size = output
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{:<6} {:<20} {:<12}", output.id, output.name, size);
    }

    println!("\nSelector labels for the settings UI:");
    for output in &outputs {
        println!("  {}", monitor::output_label(output));
    }

    Ok(())
}
