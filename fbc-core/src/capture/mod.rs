//! Capture loop and frame publishing
//!
//! `worker` owns the dedicated capture thread and the state shared with
//! the render thread; `publisher` is the lock-free render-tick side.

pub mod publisher;
pub mod worker;

pub use worker::{CaptureWorker, Phase};
