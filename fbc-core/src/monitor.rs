//! Output enumeration for the selector UI
//!
//! The settings UI presents outputs as labels of the form
//! `"NAME: WxH+X+Y"`; `settings::parse_tracking_label` is the inverse of
//! the formatter here.

use crate::backend::CaptureBackend;
use crate::error::Result;
use crate::types::OutputInfo;

/// Outputs currently attached, straight from the backend status query
pub fn list_outputs(backend: &dyn CaptureBackend) -> Result<Vec<OutputInfo>> {
    Ok(backend.status()?.outputs)
}

/// UI label for an output selector entry
pub fn output_label(output: &OutputInfo) -> String {
    match output.size {
        Some(size) => format!("{}: {}+0+0", output.name, size),
        None => output.name.clone(),
    }
}
