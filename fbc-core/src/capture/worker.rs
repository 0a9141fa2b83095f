//! Capture loop thread
//!
//! One OS thread per source, alive for the source's whole lifetime. The
//! thread cycles through a small state machine: wait for the capture
//! flag, negotiate a session and bind the frame images, grab frames and
//! publish slot indices until told to stop, tear everything down, wait
//! again. Session-level failures log and fall back to waiting; the next
//! poll retries from scratch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::backend::CaptureBackend;
use crate::bridge::{self, BackingImageSet, SLOT_COUNT};
use crate::config::CaptureConfig;
use crate::error::{FbcError, Result};
use crate::render::RenderApi;
use crate::session::{self, CaptureSession};
use crate::types::ImageHandle;

/// Idle poll interval while waiting for the capture flag
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Where the capture thread currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session; polling the capture flag
    Waiting,
    /// Session open; grabbing frames
    Active,
    /// Session being released
    TearingDown,
}

/// State shared between the capture thread and the render thread
pub struct Shared {
    /// Thread lifetime flag; false asks the thread to exit
    running: AtomicBool,
    /// Session flag; true asks for an open session
    should_capture: AtomicBool,
    /// True once at least one frame has been grabbed this session
    has_frame: AtomicBool,
    /// Slot index of the newest grabbed frame; single writer (capture
    /// thread), single reader (render thread)
    active_slot: AtomicUsize,
    /// Published image handle per slot; 0 while unbound
    images: [AtomicU64; SLOT_COUNT],
    /// Current thread phase, for bounded stop waits
    phase: Mutex<Phase>,
    phase_changed: Condvar,
    /// Session config; swapped wholesale while the thread is waiting
    config: Mutex<CaptureConfig>,
}

impl Shared {
    fn new(config: CaptureConfig) -> Self {
        Self {
            running: AtomicBool::new(true),
            should_capture: AtomicBool::new(false),
            has_frame: AtomicBool::new(false),
            active_slot: AtomicUsize::new(0),
            images: [AtomicU64::new(0), AtomicU64::new(0)],
            phase: Mutex::new(Phase::Waiting),
            phase_changed: Condvar::new(),
            config: Mutex::new(config),
        }
    }

    /// The image to draw this tick, if a frame exists.
    ///
    /// Lock-free: one acquire load of the frame flag, one of the slot
    /// index, one of the image handle. Safe against a concurrent grab
    /// because the capture thread only ever writes into the slot it is
    /// not publishing before flipping the index.
    pub fn published_image(&self) -> Option<ImageHandle> {
        if !self.has_frame.load(Ordering::Acquire) {
            return None;
        }
        let slot = self.active_slot.load(Ordering::Acquire);
        // The capture thread never publishes a slot outside the set;
        // the bounds-checked read keeps a misbehaving store from ever
        // panicking the render thread.
        let raw = self.images.get(slot)?.load(Ordering::Acquire);
        if raw == 0 {
            return None;
        }
        Some(ImageHandle::from_raw(raw))
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
        self.phase_changed.notify_all();
    }

    /// Block until the thread reaches [`Phase::Waiting`], up to `timeout`
    fn wait_until_waiting(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut phase = self.phase.lock();
        while *phase != Phase::Waiting {
            if self
                .phase_changed
                .wait_until(&mut phase, deadline)
                .timed_out()
            {
                return *phase == Phase::Waiting;
            }
        }
        true
    }
}

/// Handle to a running capture thread
pub struct CaptureWorker {
    shared: Arc<Shared>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl CaptureWorker {
    /// Spawn the capture thread. It starts in the waiting phase; call
    /// [`CaptureWorker::start_capture`] to open a session.
    pub fn spawn(
        backend: Arc<dyn CaptureBackend>,
        render: Arc<dyn RenderApi>,
        config: CaptureConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(config));
        let shared_clone = shared.clone();

        let thread = std::thread::Builder::new()
            .name("fbc-capture".to_string())
            .spawn(move || run_loop(backend, render, shared_clone))
            .map_err(|e| FbcError::resource(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Shared state, for the render-tick publisher
    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Ask the thread to open a session on its next poll
    pub fn start_capture(&self) {
        self.shared.should_capture.store(true, Ordering::Release);
    }

    /// Ask the thread to release its session and block (bounded) until
    /// it is back in the waiting phase. Returns false on timeout.
    pub fn stop_capture(&self, timeout: Duration) -> bool {
        self.shared.should_capture.store(false, Ordering::Release);
        self.shared.wait_until_waiting(timeout)
    }

    /// Whether a session is currently requested
    pub fn is_capturing(&self) -> bool {
        self.shared.should_capture.load(Ordering::Acquire)
    }

    /// Replace the session config.
    ///
    /// Callers stop capture first; the swap happens under the config
    /// lock while the thread is waiting, so no open session ever sees a
    /// mixed config.
    pub fn replace_config(&self, config: CaptureConfig) {
        *self.shared.config.lock() = config;
    }

    /// Stop everything and join the thread
    pub fn shutdown(&mut self) {
        self.shared.should_capture.store(false, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!("capture thread stopped");
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(backend: Arc<dyn CaptureBackend>, render: Arc<dyn RenderApi>, shared: Arc<Shared>) {
    debug!("capture thread started");
    let mut negotiator = session::Negotiator::new();
    while shared.running.load(Ordering::Acquire) {
        if !shared.should_capture.load(Ordering::Acquire) {
            std::thread::sleep(IDLE_POLL);
            continue;
        }

        shared.set_phase(Phase::Active);
        // A stop between the flag check above and the phase change may
        // already have returned; do not open a session it cannot see.
        if !shared.should_capture.load(Ordering::Acquire) {
            shared.set_phase(Phase::Waiting);
            continue;
        }
        let config = shared.config.lock().clone();

        match open_session(&mut negotiator, &*backend, &*render, &config) {
            Ok(images) => {
                publish_images(&shared, &images);
                if let Some(session) = negotiator.session() {
                    grab_until_stopped(&*backend, &shared, session);
                }

                shared.set_phase(Phase::TearingDown);
                unpublish_images(&shared);
                bridge::release_images(&*render, images);
                if let Err(err) = negotiator.close(&*backend) {
                    error!(%err, "session teardown failed");
                }
            }
            Err(err) => {
                warn!(%err, "session setup failed, will retry");
                std::thread::sleep(IDLE_POLL);
            }
        }

        shared.set_phase(Phase::Waiting);
    }
    debug!("capture thread exiting");
}

fn open_session(
    negotiator: &mut session::Negotiator,
    backend: &dyn CaptureBackend,
    render: &dyn RenderApi,
    config: &CaptureConfig,
) -> Result<BackingImageSet> {
    negotiator.open(backend, config)?;
    let session = negotiator.require()?;
    match bridge::bind_images(backend, render, session) {
        Ok(images) => Ok(images),
        Err(err) => {
            let _ = negotiator.close(backend);
            Err(err)
        }
    }
}

/// Grab frames until the session or thread flag drops or a grab fails.
///
/// The backend paces the loop: a push-model grab blocks until the
/// compositor produces a frame, an interval-model grab returns at most
/// once per sampling interval. No extra throttle here.
fn grab_until_stopped(backend: &dyn CaptureBackend, shared: &Shared, session: &CaptureSession) {
    while shared.running.load(Ordering::Acquire) && shared.should_capture.load(Ordering::Acquire) {
        match backend.grab_frame(session.handle) {
            Ok(slot) => {
                // A slot outside the bound set must never reach the
                // render thread; treat it like a failed grab.
                if slot >= SLOT_COUNT {
                    error!(slot, "backend returned out-of-range frame slot");
                    break;
                }
                shared.active_slot.store(slot, Ordering::Release);
                shared.has_frame.store(true, Ordering::Release);
            }
            Err(err) => {
                // Fatal to this session only; teardown runs and the
                // next poll retries from scratch.
                error!(%err, "frame grab failed");
                break;
            }
        }
    }
}

fn publish_images(shared: &Shared, images: &BackingImageSet) {
    for slot in 0..SLOT_COUNT {
        shared.images[slot].store(images.image(slot).as_raw(), Ordering::Release);
    }
}

fn unpublish_images(shared: &Shared) {
    // Order matters: the render thread checks has_frame first, so clear
    // it before the handles go away.
    shared.has_frame.store(false, Ordering::Release);
    for slot in &shared.images {
        slot.store(0, Ordering::Release);
    }
}
