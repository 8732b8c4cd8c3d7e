//! # vid-core
//!
//! Shared library for vidservice containing the daemon's domain state, the
//! button-to-command mapping, display geometry arithmetic, the overlay asset
//! catalog, and the codec for Linux evdev input records.
//!
//! This crate has zero dependencies on device files, ioctls, or memory
//! mappings.  Everything here is plain data and pure functions, so it can be
//! unit-tested on any host.
//!
//! # Architecture overview (for beginners)
//!
//! vidservice is a small daemon that copies camera frames straight into a
//! display framebuffer, with a static "HUD" picture on a second display plane.
//! A handful of physical buttons switch the active camera path, the LCD output
//! route, and the HUD picture.
//!
//! This crate (`vid-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – Pure daemon logic.  The most important piece is the
//!   `CommandHandler`: a pure function from (current state, button event) to
//!   (next state, side effects).
//!
//! - **`keymap`** – The evdev key codes the buttons emit and their mapping to
//!   daemon commands.
//!
//! - **`protocol`** – How bytes arrive from the input device.  The kernel
//!   delivers fixed-size `struct input_event` records; this module decodes
//!   them into typed Rust structs.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `vid_core::DaemonState` instead of `vid_core::domain::state::DaemonState`.
pub use domain::command::{Command, CommandHandler, Dispatch, Effect};
pub use domain::format::{FourCc, PixelFormat};
pub use domain::geometry::{DisplayGeometry, GeometryError};
pub use domain::overlay::{
    OverlayCatalog, OverlayIndexError, BITMAP_PIXEL_DATA_OFFSET, HUD_NUM_OF_PICTURES,
};
pub use domain::state::{ActiveSource, DaemonState, OutputRoute};
pub use protocol::input_event::{InputEventRecord, RecordError, INPUT_EVENT_SIZE};
