//! Resolve command

use anyhow::{Context, Result};
use clap::Args;
use fbc_core::backend::{CaptureBackend, NvfbcBackend};
use fbc_core::config::TrackingTarget;
use fbc_core::probe;
use fbc_core::settings::parse_tracking_label;

/// Arguments for the resolve command
#[derive(Args)]
pub struct ResolveArgs {
    /// Tracking selector: "0" (primary), "2" (entire screen), an output
    /// name, or a UI label like "DP-1: 2560x1440+0+0"
    pub selector: String,
}

/// Resolve a tracking selector against the live output list
pub fn resolve(args: ResolveArgs) -> Result<()> {
    let target = match args.selector.as_str() {
        "0" => TrackingTarget::PrimaryDisplay,
        "2" => TrackingTarget::EntireVirtualScreen,
        label => TrackingTarget::Output(parse_tracking_label(label)),
    };

    let backend = NvfbcBackend::new().context("loading the NvFBC driver library")?;
    let status = backend.status().context("querying capture status")?;
    let id = probe::resolve_target(&target, &status.outputs);

    println!("{} -> output id {}", target, id);
    if let TrackingTarget::Output(ref name) = target {
        if !status.outputs.iter().any(|o| &o.name == name) {
            println!("(no output named {:?}; falling back to the primary display)", name);
        }
    }

    Ok(())
}
