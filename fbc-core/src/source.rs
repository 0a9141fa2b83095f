//! Host lifecycle glue
//!
//! [`FbcSource`] is the object behind the host's source callbacks. Each
//! method maps onto one callback: `new`/`Drop` onto create/destroy,
//! `update` onto settings changes, `render_tick` onto video render,
//! `width`/`height` onto the size queries. All capture work happens on
//! the worker thread; this type only flips flags and swaps config.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::backend::CaptureBackend;
use crate::capture::publisher;
use crate::capture::worker::CaptureWorker;
use crate::error::Result;
use crate::render::RenderApi;
use crate::settings::SourceSettings;
use crate::types::FrameSize;

/// Bound on how long a stop waits for the capture thread to settle
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Coarse source state, as the host sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No session requested
    Idle,
    /// Capture thread is running a session (or bringing one up)
    Capturing,
}

/// One capture source instance
pub struct FbcSource {
    worker: CaptureWorker,
    render: Arc<dyn RenderApi>,
    settings: Mutex<SourceSettings>,
    size: Mutex<FrameSize>,
}

impl FbcSource {
    /// Create a source from host settings. The capture thread starts
    /// immediately but stays idle until [`FbcSource::start`].
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        render: Arc<dyn RenderApi>,
        settings: SourceSettings,
    ) -> Result<Self> {
        let config = settings.to_config();
        let size = config.frame_size;
        let worker = CaptureWorker::spawn(backend, render.clone(), config)?;
        Ok(Self {
            worker,
            render,
            settings: Mutex::new(settings),
            size: Mutex::new(size),
        })
    }

    /// Current source state
    pub fn state(&self) -> LifecycleState {
        if self.worker.is_capturing() {
            LifecycleState::Capturing
        } else {
            LifecycleState::Idle
        }
    }

    /// Store new settings and stop any running capture.
    ///
    /// The new config takes effect on the next [`FbcSource::reload`] or
    /// [`FbcSource::start`]; the declared size changes immediately.
    pub fn update(&self, settings: SourceSettings) {
        self.stop();
        *self.size.lock() = FrameSize::new(settings.width, settings.height);
        *self.settings.lock() = settings;
    }

    /// Stop, rebuild the session config from the stored settings, and
    /// start again. This is the only path that applies new settings to
    /// a live source.
    pub fn reload(&self) {
        self.stop();
        let config = self.settings.lock().to_config();
        *self.size.lock() = config.frame_size;
        self.worker.replace_config(config);
        self.start();
    }

    /// Request a capture session
    pub fn start(&self) {
        info!("starting capture");
        self.worker.start_capture();
    }

    /// Release the capture session. Blocks (bounded) until the worker
    /// has torn the session down.
    pub fn stop(&self) {
        if self.worker.is_capturing() {
            info!("stopping capture");
        }
        if !self.worker.stop_capture(STOP_TIMEOUT) {
            warn!("capture thread did not settle within {:?}", STOP_TIMEOUT);
        }
    }

    /// Host video-render callback: draw the newest frame, if any
    pub fn render_tick(&self) {
        publisher::render_tick(self.worker.shared(), &*self.render, *self.size.lock());
    }

    /// Declared source width
    pub fn width(&self) -> u32 {
        self.size.lock().width
    }

    /// Declared source height
    pub fn height(&self) -> u32 {
        self.size.lock().height
    }
}

impl Drop for FbcSource {
    fn drop(&mut self) {
        // Force Capturing -> Idle before the worker joins.
        self.stop();
    }
}
