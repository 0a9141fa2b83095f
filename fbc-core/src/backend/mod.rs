//! Capture backend seam
//!
//! [`CaptureBackend`] is the boundary between the pipeline and the
//! vendor capture library. The production implementation lives in
//! [`nvfbc`]; tests substitute a scripted double. The trait is
//! deliberately narrow: the only access to backend-internal GPU state is
//! [`CaptureBackend::frame_memory`], which hands out an opaque memory
//! handle for the bridge to export.

pub mod nvfbc;
pub mod sys;

pub use nvfbc::NvfbcBackend;

use crate::error::Result;
use crate::types::{CropRect, DeviceMemory, ExportedMemory, FrameSize, OutputInfo, SessionHandle};

/// How the backend follows screen geometry changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingKind {
    /// Track the primary display
    Default,
    /// Track one output, identified by `SessionParams::output_id`
    Output,
    /// Track the entire virtual screen
    Screen,
}

/// Negotiated parameters for one backend capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Composite the hardware cursor
    pub with_cursor: bool,
    /// Geometry tracking mode
    pub tracking: TrackingKind,
    /// Output id; meaningful only with `TrackingKind::Output`
    pub output_id: u32,
    /// Frame buffer dimensions
    pub frame_size: FrameSize,
    /// Optional capture crop in desktop coordinates
    pub capture_box: Option<CropRect>,
    /// Sampling interval in ms; ignored in push mode
    pub sampling_ms: u32,
    /// Block grabs until the compositor produces a new frame
    pub push_model: bool,
    /// Allow the driver to capture fullscreen applications directly
    pub allow_direct: bool,
}

/// Result of the backend capability query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    /// Whether a capture session can be created right now
    pub can_create_now: bool,
    /// Outputs attached to the GPU
    pub outputs: Vec<OutputInfo>,
}

/// Vendor capture library boundary.
///
/// A session produces frames into two backend-owned GPU buffers;
/// `grab_frame` reports which of the two holds the newest frame.
pub trait CaptureBackend: Send + Sync {
    /// Query capture availability and the attached outputs
    fn status(&self) -> Result<BackendStatus>;

    /// Create a GPU-texture capture session
    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle>;

    /// Negotiate the frame buffer format (fixed BGRA, 4 bytes/pixel)
    fn setup_buffers(&self, session: SessionHandle) -> Result<()>;

    /// Grab one frame; returns the slot index (0 or 1) it landed in
    fn grab_frame(&self, session: SessionHandle) -> Result<usize>;

    /// Destroy a capture session and its buffers
    fn destroy_session(&self, session: SessionHandle) -> Result<()>;

    /// The one internal-state accessor: the backend-owned GPU memory
    /// backing the given frame slot
    fn frame_memory(&self, session: SessionHandle, slot: usize) -> Result<DeviceMemory>;

    /// Export backend GPU memory as a POSIX fd for cross-API import
    fn export_memory(&self, session: SessionHandle, memory: DeviceMemory)
    -> Result<ExportedMemory>;
}
