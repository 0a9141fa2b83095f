//! Core types shared across the capture pipeline
//!
//! Small plain data types for sizes, crop boxes, backend outputs and the
//! opaque handles passed between the backend, bridge and render seams.

use serde::{Deserialize, Serialize};
use std::os::fd::OwnedFd;

/// Maximum number of bytes compared when matching output names.
///
/// The backend stores output names in a fixed 128-byte buffer, so matches
/// are only meaningful up to this bound.
pub const OUTPUT_NAME_MAX: usize = 127;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Capture crop rectangle, in desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for CropRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// One output (connector) reported by the backend status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInfo {
    /// Backend-assigned numeric id
    pub id: u32,
    /// Connector name (e.g. "DP-1", "HDMI-0")
    pub name: String,
    /// Tracked dimensions, if the backend reported them
    pub size: Option<FrameSize>,
}

impl OutputInfo {
    /// Create a new output entry
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            size: None,
        }
    }

    /// Set the tracked dimensions
    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = Some(size);
        self
    }
}

impl std::fmt::Display for OutputInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (id {})", self.name, self.id)?;
        if let Some(size) = self.size {
            write!(f, " {}", size)?;
        }
        Ok(())
    }
}

/// Opaque handle for an open backend capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Wrap a raw backend handle value
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw handle value
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Opaque handle for a render-API image
///
/// The raw value is whatever the render implementation hands out (a GL
/// texture name in the real host). `0` is never a valid image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(u64);

impl ImageHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// A GPU device-memory allocation owned by the capture backend
///
/// Obtained through the one narrow internal-state accessor on the backend;
/// everything downstream treats it as an opaque (handle, size) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemory {
    /// Raw driver memory handle
    pub raw: u64,
    /// Allocation size in bytes
    pub size: u64,
}

/// Backend device memory exported as a process-transferable descriptor
#[derive(Debug)]
pub struct ExportedMemory {
    /// The exported file descriptor; closed when dropped
    pub fd: OwnedFd,
    /// Allocation size in bytes, required by the import side
    pub size: u64,
}
