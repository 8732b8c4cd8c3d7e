//! Infrastructure layer: concrete device adapters and process plumbing.
//!
//! Each device area has a real Linux implementation and an always-compiled
//! mock used by unit and integration tests:
//!
//! | area        | real                               | mock                    |
//! |-------------|------------------------------------|-------------------------|
//! | `capture`   | `V4l2Device` (ioctl + mmap)        | `MockCaptureBackend`    |
//! | `display`   | `FbDevice` (fbdev ioctl + mmap)    | `MockDisplayBackend`    |
//! | `input`     | `EvdevInput` (non-blocking read)   | `ScriptedInput`         |
//! | `overlay`   | `MappedAssetStore`                 | `InMemoryAssetStore`    |
//! | `readiness` | `PollWaiter` (`poll(2)`)           | `ScriptedWaiter`        |
//! | `route`     | `SysfsRouteSwitch`                 | `RecordingRouteSwitch`  |
//!
//! `config` loads the TOML configuration and `signals` installs the
//! SIGINT/SIGTERM handlers.

pub mod capture;
pub mod config;
pub mod display;
pub mod input;
pub mod overlay;
pub mod readiness;
pub mod route;

#[cfg(target_os = "linux")]
pub mod signals;
