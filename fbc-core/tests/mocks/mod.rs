//! Mock infrastructure for testing
//!
//! Scripted stand-ins for the capture backend and the render API, with
//! counters for everything the tests assert on. The backend carries a
//! virtual clock advanced by each grab, so pacing properties can be
//! checked without real sleeps.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use fbc_core::backend::{BackendStatus, CaptureBackend, SessionParams};
use fbc_core::error::{FbcError, Result};
use fbc_core::render::{ImageDesc, RenderApi};
use fbc_core::types::{DeviceMemory, ExportedMemory, ImageHandle, OutputInfo, SessionHandle};

/// Scripted capture backend
pub struct MockBackend {
    state: Mutex<BackendState>,
    /// Virtual time in ms, advanced by each grab
    clock_ms: AtomicU64,
    grab_count: AtomicU64,
    sessions_created: AtomicUsize,
    sessions_destroyed: AtomicUsize,
    /// While true, grabs block (bounded) instead of returning
    hold_grabs: AtomicBool,
    /// Upcoming create_session calls to fail
    fail_creates: AtomicUsize,
    /// Upcoming setup_buffers calls to fail
    fail_setups: AtomicUsize,
}

struct BackendState {
    outputs: Vec<OutputInfo>,
    can_create_now: bool,
    next_handle: u64,
    open: HashSet<u64>,
    last_params: Option<SessionParams>,
    grab_times_ms: Vec<u64>,
    /// When set, every grab reports this slot instead of alternating
    forced_slot: Option<usize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState {
                outputs: Vec::new(),
                can_create_now: true,
                next_handle: 1,
                open: HashSet::new(),
                last_params: None,
                grab_times_ms: Vec::new(),
                forced_slot: None,
            }),
            clock_ms: AtomicU64::new(0),
            grab_count: AtomicU64::new(0),
            sessions_created: AtomicUsize::new(0),
            sessions_destroyed: AtomicUsize::new(0),
            hold_grabs: AtomicBool::new(false),
            fail_creates: AtomicUsize::new(0),
            fail_setups: AtomicUsize::new(0),
        }
    }

    pub fn with_outputs(outputs: Vec<OutputInfo>) -> Self {
        let mock = Self::new();
        mock.state.lock().unwrap().outputs = outputs;
        mock
    }

    /// Make every grab report the given slot, however nonsensical
    pub fn force_grab_slot(&self, slot: usize) {
        self.state.lock().unwrap().forced_slot = Some(slot);
    }

    /// Fail the next `n` session creations
    pub fn fail_next_creates(&self, n: usize) {
        self.fail_creates.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` buffer setups
    pub fn fail_next_setups(&self, n: usize) {
        self.fail_setups.store(n, Ordering::SeqCst);
    }

    /// Block grabs until [`MockBackend::release_grabs`]
    pub fn hold_grabs(&self) {
        self.hold_grabs.store(true, Ordering::SeqCst);
    }

    pub fn release_grabs(&self) {
        self.hold_grabs.store(false, Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn sessions_destroyed(&self) -> usize {
        self.sessions_destroyed.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn grab_count(&self) -> u64 {
        self.grab_count.load(Ordering::SeqCst)
    }

    /// Parameters the most recent session was created with
    pub fn last_params(&self) -> Option<SessionParams> {
        self.state.lock().unwrap().last_params.clone()
    }

    /// Virtual-clock timestamps of all grabs, in ms
    pub fn grab_times_ms(&self) -> Vec<u64> {
        self.state.lock().unwrap().grab_times_ms.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for MockBackend {
    fn status(&self) -> Result<BackendStatus> {
        let state = self.state.lock().unwrap();
        Ok(BackendStatus {
            can_create_now: state.can_create_now,
            outputs: state.outputs.clone(),
        })
    }

    fn create_session(&self, params: &SessionParams) -> Result<SessionHandle> {
        if self
            .fail_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FbcError::backend(7, "scripted create failure"));
        }
        let mut state = self.state.lock().unwrap();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open.insert(handle);
        state.last_params = Some(params.clone());
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle::from_raw(handle))
    }

    fn setup_buffers(&self, session: SessionHandle) -> Result<()> {
        if !self.state.lock().unwrap().open.contains(&session.as_raw()) {
            return Err(FbcError::backend(5, "unknown session handle"));
        }
        if self
            .fail_setups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FbcError::backend(2, "scripted setup failure"));
        }
        Ok(())
    }

    fn grab_frame(&self, session: SessionHandle) -> Result<usize> {
        // Bounded wait so a test that forgets release_grabs cannot hang
        // the worker join forever.
        let mut waited = Duration::ZERO;
        while self.hold_grabs.load(Ordering::SeqCst) && waited < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
            waited += Duration::from_millis(1);
        }

        let (sampling_ms, forced_slot) = {
            let state = self.state.lock().unwrap();
            if !state.open.contains(&session.as_raw()) {
                return Err(FbcError::backend(5, "unknown session handle"));
            }
            let sampling = state
                .last_params
                .as_ref()
                .map(|p| if p.push_model { 16 } else { p.sampling_ms.max(1) })
                .unwrap_or(16);
            (sampling, state.forced_slot)
        };

        // The backend paces the loop: each grab consumes one sampling
        // interval of virtual time.
        let now = self
            .clock_ms
            .fetch_add(sampling_ms as u64, Ordering::SeqCst)
            + sampling_ms as u64;
        self.state.lock().unwrap().grab_times_ms.push(now);

        let count = self.grab_count.fetch_add(1, Ordering::SeqCst);
        // Keep real time moving so stop flags get checked promptly.
        std::thread::sleep(Duration::from_micros(200));
        Ok(forced_slot.unwrap_or((count % 2) as usize))
    }

    fn destroy_session(&self, session: SessionHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.open.remove(&session.as_raw()) {
            return Err(FbcError::backend(5, "unknown session handle"));
        }
        self.sessions_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn frame_memory(&self, session: SessionHandle, slot: usize) -> Result<DeviceMemory> {
        let state = self.state.lock().unwrap();
        if !state.open.contains(&session.as_raw()) {
            return Err(FbcError::backend(5, "unknown session handle"));
        }
        let size = state
            .last_params
            .as_ref()
            .map(|p| p.frame_size.width as u64 * p.frame_size.height as u64 * 4)
            .unwrap_or(0);
        Ok(DeviceMemory {
            raw: 0x1000 + slot as u64,
            size,
        })
    }

    fn export_memory(
        &self,
        _session: SessionHandle,
        memory: DeviceMemory,
    ) -> Result<ExportedMemory> {
        // A real fd so drop semantics match production.
        let fd: OwnedFd = File::open("/dev/null")?.into();
        Ok(ExportedMemory {
            fd,
            size: memory.size,
        })
    }
}

/// Recording render API
pub struct MockRenderApi {
    next_image: AtomicU64,
    created: Mutex<Vec<(ImageHandle, ImageDesc)>>,
    destroyed: Mutex<Vec<ImageHandle>>,
    bound_sizes: Mutex<Vec<(ImageHandle, u64)>>,
    draws: Mutex<Vec<(ImageHandle, u32, u32)>>,
    /// Upcoming bind_memory calls to fail
    fail_binds: AtomicUsize,
}

impl MockRenderApi {
    pub fn new() -> Self {
        Self {
            next_image: AtomicU64::new(1),
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            bound_sizes: Mutex::new(Vec::new()),
            draws: Mutex::new(Vec::new()),
            fail_binds: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_binds(&self, n: usize) {
        self.fail_binds.store(n, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<(ImageHandle, ImageDesc)> {
        self.created.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<ImageHandle> {
        self.destroyed.lock().unwrap().clone()
    }

    pub fn live_images(&self) -> usize {
        self.created.lock().unwrap().len() - self.destroyed.lock().unwrap().len()
    }

    pub fn draws(&self) -> Vec<(ImageHandle, u32, u32)> {
        self.draws.lock().unwrap().clone()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.lock().unwrap().len()
    }
}

impl Default for MockRenderApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderApi for MockRenderApi {
    fn enter_context(&self) {}

    fn leave_context(&self) {}

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        let image = ImageHandle::from_raw(self.next_image.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().push((image, *desc));
        Ok(image)
    }

    fn bind_memory(&self, image: ImageHandle, memory: ExportedMemory) -> Result<()> {
        if self
            .fail_binds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FbcError::render("scripted bind failure"));
        }
        self.bound_sizes.lock().unwrap().push((image, memory.size));
        Ok(())
    }

    fn destroy_image(&self, image: ImageHandle) {
        self.destroyed.lock().unwrap().push(image);
    }

    fn draw(&self, image: ImageHandle, width: u32, height: u32) {
        self.draws.lock().unwrap().push((image, width, height));
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
