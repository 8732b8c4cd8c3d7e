//! Application layer of the daemon.
//!
//! Everything in here depends only on traits (the hardware "ports") and on
//! `vid_core` domain types.  Concrete devices are injected from the
//! infrastructure layer, so every module is unit-testable with the mock
//! adapters.
//!
//! # Sub-modules
//!
//! - **`capture`** – [`capture::CaptureDevice`]: the V4L2 streaming state
//!   machine and its buffer pool, over a [`capture::CaptureBackend`].
//! - **`display`** – [`display::DisplaySurface`]: a mapped framebuffer region
//!   with bounds-checked writes, over a [`display::DisplayBackend`].
//! - **`overlay`** – [`overlay::OverlayCompositor`]: copies a HUD bitmap into
//!   a display surface.
//! - **`input`** – the [`input::InputSource`] port for button events.
//! - **`route`** – the [`route::OutputRouteSwitch`] port.
//! - **`event_loop`** – [`event_loop::EventLoop`]: the single-threaded
//!   scheduler tying all of the above together.

pub mod capture;
pub mod display;
pub mod event_loop;
pub mod input;
pub mod overlay;
pub mod route;
