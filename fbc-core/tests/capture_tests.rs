//! Integration tests for the capture pipeline
//!
//! Everything runs against the scripted backend and render doubles in
//! `mocks`; no driver, GPU or X server is involved.

mod mocks;

use std::sync::Arc;
use std::time::Duration;

use fbc_core::backend::{CaptureBackend, TrackingKind};
use fbc_core::capture::worker::CaptureWorker;
use fbc_core::error::FbcError;
use fbc_core::render::{ChannelSwizzle, FilterMode, RenderApi};
use fbc_core::session::Negotiator;
use fbc_core::settings::SourceSettings;
use fbc_core::source::FbcSource;
use fbc_core::types::{FrameSize, OutputInfo};

use mocks::{MockBackend, MockRenderApi, wait_until};

const WAIT: Duration = Duration::from_secs(2);

fn test_outputs() -> Vec<OutputInfo> {
    vec![
        OutputInfo::new(3, "HDMI-0").with_size(FrameSize::new(1920, 1080)),
        OutputInfo::new(7, "DP-1").with_size(FrameSize::new(2560, 1440)),
    ]
}

fn make_source(
    backend: &Arc<MockBackend>,
    render: &Arc<MockRenderApi>,
    settings: SourceSettings,
) -> FbcSource {
    FbcSource::new(backend.clone(), render.clone(), settings).expect("source should spawn")
}

#[test]
fn test_direct_capture_overrides_cursor_and_pacing() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let settings = SourceSettings {
        direct_capture: true,
        with_cursor: true,
        sampling_rate: 16,
        ..Default::default()
    };

    let source = make_source(&backend, &render, settings);
    source.start();
    assert!(wait_until(WAIT, || backend.sessions_created() == 1));

    let params = backend.last_params().expect("session was created");
    assert!(!params.with_cursor, "direct capture must drop the cursor");
    assert!(params.push_model, "direct capture must use push delivery");
    assert_eq!(params.sampling_ms, 0);
    source.stop();
}

#[test]
fn test_named_output_resolves_to_backend_id() {
    let backend = Arc::new(MockBackend::with_outputs(test_outputs()));
    let render = Arc::new(MockRenderApi::new());
    let settings = SourceSettings {
        tracking_type: "DP-1: 2560x1440+0+0".to_string(),
        ..Default::default()
    };

    let source = make_source(&backend, &render, settings);
    source.start();
    assert!(wait_until(WAIT, || backend.sessions_created() == 1));

    let params = backend.last_params().expect("session was created");
    assert_eq!(params.tracking, TrackingKind::Output);
    assert_eq!(params.output_id, 7);
    source.stop();
}

#[test]
fn test_missing_output_degrades_to_primary() {
    let backend = Arc::new(MockBackend::with_outputs(test_outputs()));
    let render = Arc::new(MockRenderApi::new());
    let settings = SourceSettings {
        tracking_type: "DP-9".to_string(),
        ..Default::default()
    };

    let source = make_source(&backend, &render, settings);
    source.start();
    assert!(wait_until(WAIT, || backend.sessions_created() == 1));

    let params = backend.last_params().expect("session was created");
    assert_eq!(params.output_id, 0, "missing outputs fall back to primary");
    source.stop();
}

#[test]
fn test_session_handles_balance_across_restarts() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let source = make_source(&backend, &render, SourceSettings::default());

    for round in 1..=3 {
        source.start();
        assert!(wait_until(WAIT, || backend.sessions_created() == round));
        source.stop();
        assert!(wait_until(WAIT, || backend.sessions_destroyed() == round));
    }

    assert_eq!(backend.sessions_created(), 3);
    assert_eq!(backend.sessions_destroyed(), 3);
    assert_eq!(backend.open_sessions(), 0);
    assert_eq!(render.live_images(), 0);
}

#[test]
fn test_setup_failure_releases_partial_session_and_retries() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    backend.fail_next_setups(1);

    let source = make_source(&backend, &render, SourceSettings::default());
    source.start();

    // First attempt creates a session and fails in setup; the retry on
    // the next poll succeeds.
    assert!(wait_until(WAIT, || backend.grab_count() > 0));
    assert_eq!(backend.sessions_created(), 2);
    assert_eq!(backend.sessions_destroyed(), 1);

    source.stop();
    assert!(wait_until(WAIT, || backend.open_sessions() == 0));
    assert_eq!(backend.sessions_created(), backend.sessions_destroyed());
}

#[test]
fn test_bind_failure_invalidates_whole_image_set() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    render.fail_next_binds(1);

    let source = make_source(&backend, &render, SourceSettings::default());
    source.start();
    assert!(wait_until(WAIT, || backend.grab_count() > 0));

    // The failed attempt tore its session down before the retry.
    assert_eq!(backend.sessions_created(), 2);
    assert_eq!(backend.sessions_destroyed(), 1);

    source.stop();
    assert!(wait_until(WAIT, || render.live_images() == 0));
    assert_eq!(backend.sessions_created(), backend.sessions_destroyed());
}

#[test]
fn test_reopening_an_active_session_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    let config = SourceSettings::default().to_config();
    let mut negotiator = Negotiator::new();

    negotiator
        .open(backend.as_ref(), &config)
        .expect("first open should succeed");
    let err = negotiator
        .open(backend.as_ref(), &config)
        .expect_err("second open must be rejected");
    assert!(matches!(err, FbcError::SessionAlreadyOpen));

    // The rejected open created no second driver session.
    assert_eq!(backend.sessions_created(), 1);
    negotiator.close(backend.as_ref()).expect("close");
    assert_eq!(backend.sessions_destroyed(), 1);
    assert!(negotiator.session().is_none());
}

#[test]
fn test_close_with_nothing_open_is_a_noop() {
    let backend = Arc::new(MockBackend::new());
    let mut negotiator = Negotiator::new();
    negotiator
        .close(backend.as_ref())
        .expect("close without a session is a no-op");
    assert_eq!(backend.sessions_destroyed(), 0);

    let err = negotiator.require().expect_err("nothing is open");
    assert!(matches!(err, FbcError::NoActiveSession));
}

#[test]
fn test_out_of_range_slot_fails_the_session_not_the_process() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    backend.force_grab_slot(2);

    let source = make_source(&backend, &render, SourceSettings::default());
    source.start();

    // The bad slot is fatal to the session only; the worker tears it
    // down and retries from scratch.
    assert!(wait_until(WAIT, || backend.sessions_destroyed() >= 1));

    // The render thread keeps ticking without panicking and never
    // draws a frame that was never published.
    for _ in 0..10 {
        source.render_tick();
    }
    assert_eq!(render.draw_count(), 0);

    source.stop();
    assert!(wait_until(WAIT, || backend.open_sessions() == 0));
    assert_eq!(backend.sessions_created(), backend.sessions_destroyed());
}

#[test]
fn test_published_image_always_one_of_the_bound_set() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let worker = CaptureWorker::spawn(
        backend.clone() as Arc<dyn CaptureBackend>,
        render.clone() as Arc<dyn RenderApi>,
        SourceSettings::default().to_config(),
    )
    .expect("worker should spawn");

    worker.start_capture();
    assert!(wait_until(WAIT, || backend.grab_count() > 0));
    let bound: Vec<_> = render.created().iter().map(|(image, _)| *image).collect();
    assert_eq!(bound.len(), 2);

    // Hammer the lock-free read from this thread while grabs continue.
    let shared = worker.shared().clone();
    let start = std::time::Instant::now();
    let mut seen = 0u32;
    while start.elapsed() < Duration::from_millis(100) {
        if let Some(image) = shared.published_image() {
            assert!(
                bound.contains(&image),
                "published handle must come from the bound set"
            );
            seen += 1;
        }
    }
    assert!(seen > 0, "frames should have been published");
    assert!(worker.stop_capture(WAIT));
}

#[test]
fn test_no_draws_before_first_frame() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    backend.hold_grabs();

    let source = make_source(&backend, &render, SourceSettings::default());
    source.start();
    assert!(wait_until(WAIT, || backend.sessions_created() == 1));

    // Session is up and images are bound, but no frame was grabbed yet.
    for _ in 0..10 {
        source.render_tick();
    }
    assert_eq!(render.draw_count(), 0);

    backend.release_grabs();
    assert!(wait_until(WAIT, || backend.grab_count() > 0));
    source.render_tick();
    assert_eq!(render.draw_count(), 1);
    let (_, width, height) = render.draws()[0];
    assert_eq!((width, height), (1920, 1080));

    source.stop();
}

#[test]
fn test_reload_with_new_size_recreates_images_once() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let source = make_source(&backend, &render, SourceSettings::default());

    source.start();
    assert!(wait_until(WAIT, || backend.grab_count() > 0));

    let old: Vec<_> = render.created().iter().map(|(image, _)| *image).collect();
    assert_eq!(old.len(), 2);

    let resized = SourceSettings {
        width: 2560,
        height: 1440,
        ..Default::default()
    };
    let grabs_before = backend.grab_count();
    source.update(resized);
    source.reload();
    assert!(wait_until(WAIT, || backend.sessions_created() == 2
        && backend.grab_count() > grabs_before));
    assert!(wait_until(WAIT, || render.created().len() == 4));

    // The new set carries the new dimensions.
    for (_, desc) in &render.created()[2..] {
        assert_eq!(desc.size, FrameSize::new(2560, 1440));
        assert_eq!(desc.filter, FilterMode::Bilinear);
        assert_eq!(desc.swizzle, ChannelSwizzle::SwapRedBlue);
    }
    assert_eq!((source.width(), source.height()), (2560, 1440));

    // The old set was released exactly once.
    let mut destroyed = render.destroyed();
    destroyed.retain(|image| old.contains(image));
    destroyed.sort_by_key(|image| image.as_raw());
    let mut expected = old.clone();
    expected.sort_by_key(|image| image.as_raw());
    assert_eq!(destroyed, expected);

    source.stop();
    assert!(wait_until(WAIT, || render.live_images() == 0));
}

#[test]
fn test_default_16ms_interval_scenario() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let source = make_source(&backend, &render, SourceSettings::default());

    source.start();
    assert!(wait_until(WAIT, || backend.grab_count() >= 4));
    source.stop();

    let params = backend.last_params().expect("session was created");
    assert!(!params.push_model);
    assert_eq!(params.sampling_ms, 16);
    assert!(params.with_cursor);
    assert_eq!(params.output_id, 0);
    assert_eq!(params.tracking, TrackingKind::Default);

    // The loop adds no pacing of its own: each grab consumed one full
    // sampling interval of the backend's virtual time, so the grab
    // count can never exceed elapsed time divided by the interval.
    let times = backend.grab_times_ms();
    let elapsed = *times.last().expect("grabs were recorded");
    assert!(
        times.len() as u64 * 16 <= elapsed,
        "loop outpaced the sampling interval"
    );
}

#[test]
fn test_drop_forces_capture_to_stop() {
    let backend = Arc::new(MockBackend::new());
    let render = Arc::new(MockRenderApi::new());
    let source = make_source(&backend, &render, SourceSettings::default());

    source.start();
    assert!(wait_until(WAIT, || backend.grab_count() > 0));
    drop(source);

    assert_eq!(backend.open_sessions(), 0);
    assert_eq!(render.live_images(), 0);
    assert_eq!(backend.sessions_created(), backend.sessions_destroyed());
}
