//! NvFBC Source Core Library
//!
//! Zero-copy NVIDIA frame-buffer capture as an OBS-style source.
//!
//! This library provides:
//! - NvFBC GPU-texture capture sessions (libnvidia-fbc.so.1)
//! - A cross-API memory bridge: driver-internal Vulkan memory exported
//!   as fds and imported as render images, no pixel copies
//! - A dedicated capture loop and a lock-free per-tick frame publisher
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌─────────────────┐
//! │ NvFBC Driver │───▶│ Memory Bridge │───▶│ Frame Publisher │
//! │ (grab loop)  │    │ (fd export)   │    │ (render tick)   │
//! └──────────────┘    └───────────────┘    └─────────────────┘
//! ```

pub mod backend;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod error;
pub mod interpose;
pub mod monitor;
pub mod probe;
pub mod render;
pub mod session;
pub mod settings;
pub mod source;
pub mod types;

pub use backend::{BackendStatus, CaptureBackend, SessionParams, TrackingKind};
pub use config::{CaptureConfig, DeliveryMode, TrackingTarget};
pub use error::{FbcError, Result};
pub use render::{ChannelSwizzle, FilterMode, ImageDesc, RenderApi};
pub use settings::SourceSettings;
pub use source::{FbcSource, LifecycleState};
pub use types::{CropRect, FrameSize, OutputInfo};
