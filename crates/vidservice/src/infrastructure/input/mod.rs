//! Input sources.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod evdev;
