//! Domain layer: pure daemon logic with no OS dependencies.
//!
//! - **`state`** – [`state::DaemonState`], the process-wide state that button
//!   commands mutate and the event loop reads every tick.
//! - **`command`** – the pure command dispatcher.
//! - **`geometry`** – framebuffer geometry and region arithmetic.
//! - **`format`** – capture pixel formats and FourCC codes.
//! - **`overlay`** – the HUD asset catalog (file naming and bitmap offset).

pub mod command;
pub mod format;
pub mod geometry;
pub mod overlay;
pub mod state;
