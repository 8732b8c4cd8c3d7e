//! Display backends.
//!
//! - [`fbdev::FbDevice`] talks to a Linux framebuffer node.
//! - [`mock::MockDisplayBackend`] keeps display memory in a `Vec<u8>`.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod fbdev;
