//! Capture configuration
//!
//! `CaptureConfig` is the immutable per-session description of what to
//! capture and how frames are delivered. It is built once from host
//! settings, swapped wholesale under a lock on reload, and never mutated
//! field by field while a session is open.

use crate::types::{CropRect, FrameSize};
use serde::{Deserialize, Serialize};

/// What the capture session tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingTarget {
    /// Follow the primary display
    #[default]
    PrimaryDisplay,
    /// Capture the entire virtual screen spanning all outputs
    EntireVirtualScreen,
    /// Follow one named output (connector name, e.g. "DP-1")
    Output(String),
}

impl std::fmt::Display for TrackingTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryDisplay => write!(f, "primary display"),
            Self::EntireVirtualScreen => write!(f, "entire virtual screen"),
            Self::Output(name) => write!(f, "output {}", name),
        }
    }
}

/// How the backend hands frames to the capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Grab blocks until the compositor produces a new frame
    Push,
    /// Grab returns at most once per interval (milliseconds)
    Interval(u32),
}

impl Default for DeliveryMode {
    fn default() -> Self {
        Self::Interval(16)
    }
}

impl DeliveryMode {
    /// Sampling interval in ms as the backend encodes it (0 = push)
    pub fn sampling_ms(&self) -> u32 {
        match self {
            Self::Push => 0,
            Self::Interval(ms) => *ms,
        }
    }
}

/// Immutable description of one capture session
///
/// Constructed via [`CaptureConfig::new`], which applies the direct-mode
/// overrides, so an existing value is always self-consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// What to track
    pub target: TrackingTarget,
    /// Optional capture crop, in desktop coordinates
    pub crop: Option<CropRect>,
    /// Size of the negotiated frame buffers and of the drawn sprite
    pub frame_size: FrameSize,
    /// Composite the hardware cursor into frames
    pub with_cursor: bool,
    /// Frame delivery pacing
    pub delivery: DeliveryMode,
    /// Allow the driver to capture fullscreen applications directly
    pub direct: bool,
}

impl CaptureConfig {
    /// Build a config, enforcing the direct-capture constraints.
    ///
    /// Direct capture bypasses the compositor, so the cursor cannot be
    /// composited and pacing is dictated by the captured application:
    /// when `direct` is set, `with_cursor` is forced off and delivery is
    /// forced to push, silently overriding the supplied values.
    pub fn new(
        target: TrackingTarget,
        crop: Option<CropRect>,
        frame_size: FrameSize,
        with_cursor: bool,
        delivery: DeliveryMode,
        direct: bool,
    ) -> Self {
        let (with_cursor, delivery) = if direct {
            (false, DeliveryMode::Push)
        } else {
            (with_cursor, delivery)
        };
        Self {
            target,
            crop,
            frame_size,
            with_cursor,
            delivery,
            direct,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target: TrackingTarget::PrimaryDisplay,
            crop: None,
            frame_size: FrameSize::new(1920, 1080),
            with_cursor: true,
            delivery: DeliveryMode::Interval(16),
            direct: false,
        }
    }
}
