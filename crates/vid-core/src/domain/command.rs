//! CommandHandler: maps button events to daemon state transitions.
//!
//! Dispatch is a pure function of (current [`DaemonState`], key code, key
//! value).  It never touches a device.  Anything that needs I/O, such as
//! writing the route switch file or repainting the HUD, is returned as an
//! [`Effect`] for the event loop to execute.
//!
//! | key | command | state change | effects |
//! |-----|---------|--------------|---------|
//! | F1  | `SelectSourceA` | source = External | route `"0"` |
//! | F2  | `SelectSourceB` | source = External | route `"1"` |
//! | F3  | `SelectSourceC` | source = Internal | route `"1"` |
//! | F4  | `CycleOverlay`  | index = (index + 1) mod N | apply overlay |
//! | C   | `Quit`          | shutdown = true | none |

use tracing::trace;

use crate::domain::overlay::HUD_NUM_OF_PICTURES;
use crate::domain::state::{ActiveSource, DaemonState, OutputRoute};
use crate::keymap::command_for_key;

/// A daemon command bound to a physical button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Render the external camera on output route A.
    SelectSourceA,
    /// Render the external camera on output route B.
    SelectSourceB,
    /// Stop rendering captured frames and switch to output route B.
    SelectSourceC,
    /// Advance to the next HUD picture.
    CycleOverlay,
    /// Request daemon shutdown.
    Quit,
}

/// A side effect requested by a command, executed by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Write the route's digit to the output-route switch.
    SelectRoute(OutputRoute),
    /// Composite the HUD picture with this index onto the overlay plane.
    ApplyOverlay(usize),
}

/// The result of dispatching one event: the next state plus its side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub state: DaemonState,
    pub command: Option<Command>,
    pub effects: Vec<Effect>,
}

impl Dispatch {
    fn unchanged(state: DaemonState) -> Self {
        Self {
            state,
            command: None,
            effects: Vec::new(),
        }
    }
}

/// Pure mapping from input events to state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHandler {
    overlay_count: usize,
}

impl CommandHandler {
    /// Creates a handler cycling through `overlay_count` HUD pictures.
    ///
    /// A count of zero is raised to one so the modulo never divides by zero.
    pub fn new(overlay_count: usize) -> Self {
        Self {
            overlay_count: overlay_count.max(1),
        }
    }

    /// Number of HUD pictures the overlay index cycles through.
    pub fn overlay_count(&self) -> usize {
        self.overlay_count
    }

    /// Dispatches a key event.
    ///
    /// `value` follows evdev semantics: 0 = release, 1 = press, 2 = autorepeat.
    /// Releases and unbound codes return the state unchanged with no effects.
    pub fn dispatch(&self, state: DaemonState, code: u16, value: i32) -> Dispatch {
        if value == 0 {
            return Dispatch::unchanged(state);
        }
        match command_for_key(code) {
            Some(command) => self.execute(state, command),
            None => {
                trace!(code, "ignoring unbound key code");
                Dispatch::unchanged(state)
            }
        }
    }

    /// Applies `command` to `state`.
    pub fn execute(&self, state: DaemonState, command: Command) -> Dispatch {
        let mut next = state;
        let mut effects = Vec::new();

        match command {
            Command::SelectSourceA => {
                next.active_source = ActiveSource::External;
                effects.push(Effect::SelectRoute(OutputRoute::Primary));
            }
            Command::SelectSourceB => {
                next.active_source = ActiveSource::External;
                effects.push(Effect::SelectRoute(OutputRoute::Secondary));
            }
            Command::SelectSourceC => {
                next.active_source = ActiveSource::Internal;
                effects.push(Effect::SelectRoute(OutputRoute::Secondary));
            }
            Command::CycleOverlay => {
                next.overlay_index = (state.overlay_index + 1) % self.overlay_count;
                effects.push(Effect::ApplyOverlay(next.overlay_index));
            }
            Command::Quit => {
                next.shutdown = true;
            }
        }

        Dispatch {
            state: next,
            command: Some(command),
            effects,
        }
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new(HUD_NUM_OF_PICTURES)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
