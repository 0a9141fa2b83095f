//! Host settings schema
//!
//! The host stores source settings as a flat key/value object. This
//! module mirrors that schema with serde, supplies the stock defaults,
//! and converts a settings object into a [`CaptureConfig`].
//!
//! The `tracking_type` key is a string for historical reasons: `"0"`
//! selects the primary display, `"2"` the entire virtual screen, and any
//! other value is treated as an output selector. Selectors are accepted
//! either as a bare connector name (`"DP-1"`) or as the UI label form
//! `"NAME: WxH+X+Y"`; the name is whatever precedes the first `':'`, so
//! output names containing `':'` are not supported.

use crate::config::{CaptureConfig, DeliveryMode, TrackingTarget};
use crate::types::{CropRect, FrameSize};
use serde::{Deserialize, Serialize};

/// Settings object as persisted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// `"0"` primary, `"2"` entire screen, otherwise an output selector
    pub tracking_type: String,
    /// Request direct capture of fullscreen applications
    pub direct_capture: bool,
    /// Composite the cursor into frames
    pub with_cursor: bool,
    /// Sampling interval in ms; 0 requests push delivery
    pub sampling_rate: u32,
    /// Enable the capture crop box
    pub crop_area: bool,
    pub capture_x: u32,
    pub capture_y: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frame buffer width
    pub width: u32,
    /// Frame buffer height
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            tracking_type: "0".to_string(),
            direct_capture: false,
            with_cursor: true,
            sampling_rate: 16,
            crop_area: false,
            capture_x: 0,
            capture_y: 0,
            capture_width: 1920,
            capture_height: 1080,
            width: 1920,
            height: 1080,
        }
    }
}

impl SourceSettings {
    /// Parse a settings object from the host's JSON form
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::error::FbcError::config(e.to_string()))
    }

    /// Resolve the `tracking_type` string into a [`TrackingTarget`]
    pub fn tracking_target(&self) -> TrackingTarget {
        match self.tracking_type.as_str() {
            "0" => TrackingTarget::PrimaryDisplay,
            "2" => TrackingTarget::EntireVirtualScreen,
            label => TrackingTarget::Output(parse_tracking_label(label)),
        }
    }

    /// Build the immutable capture config this settings object describes
    pub fn to_config(&self) -> CaptureConfig {
        let crop = self.crop_area.then_some(CropRect {
            x: self.capture_x,
            y: self.capture_y,
            width: self.capture_width,
            height: self.capture_height,
        });
        let delivery = if self.sampling_rate == 0 {
            DeliveryMode::Push
        } else {
            DeliveryMode::Interval(self.sampling_rate)
        };
        CaptureConfig::new(
            self.tracking_target(),
            crop,
            FrameSize::new(self.width, self.height),
            self.with_cursor,
            delivery,
            self.direct_capture,
        )
    }
}

/// Extract the output name from a tracking selector.
///
/// Accepts a bare connector name or the UI label `"NAME: WxH+X+Y"`; the
/// name is everything before the first `':'`.
pub fn parse_tracking_label(label: &str) -> String {
    match label.split_once(':') {
        Some((name, _)) => name.to_string(),
        None => label.to_string(),
    }
}
