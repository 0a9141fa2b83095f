//! Cross-API memory bridge
//!
//! Binds the two backend-owned GPU frame buffers into render-API images
//! without copying a pixel: for each slot the backend's device memory is
//! exported as a POSIX fd, imported by the render API as an external
//! memory object, and attached as the storage of a freshly created 2D
//! image. After the bind, a backend grab writes directly into memory the
//! render side samples from.

use crate::backend::CaptureBackend;
use crate::error::{Result, ResultExt};
use crate::render::{ContextGuard, ImageDesc, RenderApi};
use crate::session::CaptureSession;
use crate::types::{FrameSize, ImageHandle};
use tracing::debug;

/// Number of frame buffers a session cycles through
pub const SLOT_COUNT: usize = 2;

/// The two render images backed by the session's frame buffers
#[derive(Debug)]
pub struct BackingImageSet {
    images: [ImageHandle; SLOT_COUNT],
    size: FrameSize,
}

impl BackingImageSet {
    /// The image backing the given slot
    pub fn image(&self, slot: usize) -> ImageHandle {
        self.images[slot]
    }

    /// Dimensions the images were created with
    pub fn size(&self) -> FrameSize {
        self.size
    }
}

/// Import the session's frame buffers as render images.
///
/// Runs entirely inside the render graphics context. Partial failure
/// invalidates the whole set: images created before the failing slot are
/// destroyed and the error is returned; the caller retries by rebuilding
/// the session from scratch, never per slot.
pub fn bind_images(
    backend: &dyn CaptureBackend,
    render: &dyn RenderApi,
    session: &CaptureSession,
) -> Result<BackingImageSet> {
    let size = session.params.frame_size;
    let _guard = ContextGuard::enter(render);

    let mut images: [ImageHandle; SLOT_COUNT] = [ImageHandle::from_raw(0); SLOT_COUNT];
    for slot in 0..SLOT_COUNT {
        match bind_slot(backend, render, session, slot, size) {
            Ok(image) => images[slot] = image,
            Err(err) => {
                for image in &images[..slot] {
                    render.destroy_image(*image);
                }
                return Err(err.with_context(format!("binding frame slot {}", slot)));
            }
        }
    }

    debug!(%size, "frame buffers bound as render images");
    Ok(BackingImageSet { images, size })
}

fn bind_slot(
    backend: &dyn CaptureBackend,
    render: &dyn RenderApi,
    session: &CaptureSession,
    slot: usize,
    size: FrameSize,
) -> Result<ImageHandle> {
    let memory = backend
        .frame_memory(session.handle, slot)
        .context("querying frame memory")?;
    let exported = backend
        .export_memory(session.handle, memory)
        .context("exporting frame memory")?;

    let image = render.create_image(&ImageDesc::capture_frame(size))?;
    if let Err(err) = render.bind_memory(image, exported) {
        render.destroy_image(image);
        return Err(err);
    }
    Ok(image)
}

/// Release a backing image set.
///
/// Must only run after the capture loop has stopped writing into the
/// buffers; runs inside the graphics context so it cannot race a draw.
pub fn release_images(render: &dyn RenderApi, set: BackingImageSet) {
    let _guard = ContextGuard::enter(render);
    for image in set.images {
        render.destroy_image(image);
    }
}
