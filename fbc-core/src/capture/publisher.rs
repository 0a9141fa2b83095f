//! Render-tick frame publishing
//!
//! Runs on the host's render thread once per tick. Never blocks on the
//! capture thread: the only synchronization is the atomic slot read in
//! [`Shared::published_image`].

use crate::capture::worker::Shared;
use crate::render::RenderApi;
use crate::types::FrameSize;

/// Draw the newest captured frame, if one exists.
///
/// Draws exactly one sprite at the source's declared size; before the
/// first grab of a session this is a no-op and the source stays blank.
pub fn render_tick(shared: &Shared, render: &dyn RenderApi, size: FrameSize) {
    if let Some(image) = shared.published_image() {
        render.draw(image, size.width, size.height);
    }
}
