//! # vidservice
//!
//! Library half of the vidservice daemon.  The binary in `main.rs` only wires
//! concrete devices together; everything else lives here so that it can be
//! exercised by the integration tests in `tests/` and by the benchmarks.
//!
//! # Layers
//!
//! - **`application`** – the capture state machine, display surface, overlay
//!   compositor, and the event loop.  Depends only on traits.
//! - **`infrastructure`** – V4L2, fbdev, evdev, sysfs, and `poll(2)`
//!   adapters, plus the in-memory mocks, configuration, and signal handling.

pub mod application;
pub mod infrastructure;
