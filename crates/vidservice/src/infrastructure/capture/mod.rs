//! Capture backends.
//!
//! - [`v4l2::V4l2Device`] talks to a real Video4Linux2 node (Linux only).
//! - [`mock::MockCaptureBackend`] emulates the driver in memory for tests.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod v4l2;
