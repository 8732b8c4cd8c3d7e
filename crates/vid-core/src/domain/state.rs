//! Process-wide daemon state.
//!
//! # Who owns this? (for beginners)
//!
//! There is exactly one [`DaemonState`] per process.  It is owned by the
//! event loop and handed *by value* to the [`CommandHandler`], which returns
//! the next state.  Nothing else writes to it, so no locking is needed: the
//! daemon is single-threaded and the state is only touched between two waits.
//!
//! [`CommandHandler`]: crate::domain::command::CommandHandler

use serde::{Deserialize, Serialize};

/// Which capture path the event loop renders.
///
/// `External` frames are copied into the display surface.  While `Internal`
/// is active, captured frames are still dequeued and requeued (so the driver
/// never runs out of buffers) but nothing is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveSource {
    #[default]
    External,
    Internal,
}

impl ActiveSource {
    /// Returns `true` when captured frames must be composited.
    pub fn renders_capture(self) -> bool {
        matches!(self, ActiveSource::External)
    }
}

/// A display output path selectable through the route switch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRoute {
    /// Route A, selected by writing `"0"`.
    Primary,
    /// Route B, selected by writing `"1"`.
    Secondary,
}

impl OutputRoute {
    /// The single ASCII digit the route switch expects for this route.
    pub fn as_digit(self) -> u8 {
        match self {
            OutputRoute::Primary => b'0',
            OutputRoute::Secondary => b'1',
        }
    }
}

/// Mutable daemon state consumed by the event loop on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaemonState {
    /// Capture path whose frames are rendered.
    pub active_source: ActiveSource,
    /// Index of the HUD picture currently shown, in `[0, N)`.
    pub overlay_index: usize,
    /// Set by the quit command; the event loop exits once it sees it.
    pub shutdown: bool,
}

impl DaemonState {
    /// Creates the startup state: external source, first overlay, running.
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
