//! Session negotiation
//!
//! Turns a [`CaptureConfig`] into an open backend capture session and
//! tears one down again. [`Negotiator`] owns the at-most-one-session
//! invariant: opening while a session is active is rejected, closing
//! with nothing open is a no-op.

use crate::backend::{CaptureBackend, SessionParams, TrackingKind};
use crate::config::{CaptureConfig, TrackingTarget};
use crate::error::{FbcError, Result, ResultExt};
use crate::probe;
use crate::types::SessionHandle;
use tracing::{debug, info};

/// One open backend capture session
#[derive(Debug)]
pub struct CaptureSession {
    /// Backend session handle
    pub handle: SessionHandle,
    /// Resolved output id (0 when tracking is not output-based)
    pub output_id: u32,
    /// The parameters the session was created with
    pub params: SessionParams,
}

/// Owner of the source's single capture session
#[derive(Debug, Default)]
pub struct Negotiator {
    active: Option<CaptureSession>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a capture session for the given config.
    ///
    /// Queries the backend status (a probe failure is fatal to the
    /// attempt), resolves the tracking target to an output id, creates
    /// the session and negotiates the buffer format. Any failure after
    /// session creation destroys the partially created session before
    /// the error is returned, so the backend never leaks a half-open
    /// handle. Opening while a session is already active is a caller
    /// error.
    pub fn open(&mut self, backend: &dyn CaptureBackend, config: &CaptureConfig) -> Result<()> {
        if self.active.is_some() {
            return Err(FbcError::SessionAlreadyOpen);
        }

        let status = backend.status().context("capability probe failed")?;
        if !status.can_create_now {
            return Err(FbcError::backend(
                0,
                "capture is not available on this system",
            ));
        }

        let output_id = probe::resolve_target(&config.target, &status.outputs);
        let tracking = match &config.target {
            TrackingTarget::PrimaryDisplay => TrackingKind::Default,
            TrackingTarget::EntireVirtualScreen => TrackingKind::Screen,
            TrackingTarget::Output(_) => TrackingKind::Output,
        };

        let params = SessionParams {
            with_cursor: config.with_cursor,
            tracking,
            output_id,
            frame_size: config.frame_size,
            capture_box: config.crop,
            sampling_ms: config.delivery.sampling_ms(),
            push_model: config.delivery.sampling_ms() == 0,
            allow_direct: config.direct,
        };
        debug!(?params, "creating capture session");

        let handle = backend
            .create_session(&params)
            .context("session creation failed")?;

        if let Err(err) = backend.setup_buffers(handle) {
            // Release the half-open session; the setup error is the one
            // worth reporting.
            let _ = backend.destroy_session(handle);
            return Err(err.with_context("buffer setup failed"));
        }

        info!(%handle, output_id, size = %params.frame_size, "capture session open");
        self.active = Some(CaptureSession {
            handle,
            output_id,
            params,
        });
        Ok(())
    }

    /// The active session, if one is open
    pub fn session(&self) -> Option<&CaptureSession> {
        self.active.as_ref()
    }

    /// The active session, or an error when nothing is open
    pub fn require(&self) -> Result<&CaptureSession> {
        self.active.as_ref().ok_or(FbcError::NoActiveSession)
    }

    /// Close the active session. A no-op when nothing is open.
    pub fn close(&mut self, backend: &dyn CaptureBackend) -> Result<()> {
        let Some(session) = self.active.take() else {
            return Ok(());
        };
        backend
            .destroy_session(session.handle)
            .context("session teardown failed")?;
        info!(handle = %session.handle, "capture session closed");
        Ok(())
    }
}
