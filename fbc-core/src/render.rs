//! Render API seam
//!
//! The crate never calls GL directly; the host plugin shim implements
//! [`RenderApi`] over its graphics subsystem and this crate drives it
//! through the trait. Image creation, external-memory binding and
//! teardown must all happen between [`RenderApi::enter_context`] and
//! [`RenderApi::leave_context`].

use crate::error::Result;
use crate::types::{ExportedMemory, FrameSize, ImageHandle};

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Bilinear,
}

/// Channel reordering applied when the image is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelSwizzle {
    Identity,
    /// Swap red and blue; lets BGRA content be sampled as RGBA without a
    /// conversion pass
    SwapRedBlue,
}

/// Description of a 2D image to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub size: FrameSize,
    pub filter: FilterMode,
    pub swizzle: ChannelSwizzle,
}

impl ImageDesc {
    /// The descriptor used for capture frame images: bilinear sampling
    /// with the red/blue swap the backend's BGRA output requires
    pub fn capture_frame(size: FrameSize) -> Self {
        Self {
            size,
            filter: FilterMode::Bilinear,
            swizzle: ChannelSwizzle::SwapRedBlue,
        }
    }
}

/// Host graphics subsystem boundary
pub trait RenderApi: Send + Sync {
    /// Make the graphics context current on this thread
    fn enter_context(&self);

    /// Release the graphics context
    fn leave_context(&self);

    /// Create a 2D image; no storage is attached until `bind_memory`
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle>;

    /// Import the exported fd as an external memory object and bind it
    /// as the image's storage. Consumes the fd either way.
    fn bind_memory(&self, image: ImageHandle, memory: ExportedMemory) -> Result<()>;

    /// Destroy an image
    fn destroy_image(&self, image: ImageHandle);

    /// Draw one sprite from the image at the given size
    fn draw(&self, image: ImageHandle, width: u32, height: u32);
}

/// RAII guard for the graphics context
pub struct ContextGuard<'a> {
    render: &'a dyn RenderApi,
}

impl<'a> ContextGuard<'a> {
    /// Enter the graphics context until the guard drops
    pub fn enter(render: &'a dyn RenderApi) -> Self {
        render.enter_context();
        Self { render }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.render.leave_context();
    }
}
