//! Linux evdev key codes emitted by the front-panel buttons.
//!
//! The values come from `<linux/input-event-codes.h>`.  Only the codes the
//! daemon reacts to are listed; every other code maps to `None` and is
//! ignored by the [`CommandHandler`](crate::domain::command::CommandHandler).

use crate::domain::command::Command;

/// `EV_SYN`: end-of-packet marker emitted after every key event.
pub const EV_SYN: u16 = 0x00;
/// `EV_KEY`: key or button state change.
pub const EV_KEY: u16 = 0x01;
/// `EV_MSC`: miscellaneous data (e.g. raw scan codes).
pub const EV_MSC: u16 = 0x04;

pub const KEY_C: u16 = 46;
pub const KEY_F1: u16 = 59;
pub const KEY_F2: u16 = 60;
pub const KEY_F3: u16 = 61;
pub const KEY_F4: u16 = 62;

/// Translates an evdev key code to the daemon command bound to it.
///
/// Returns `None` for unbound codes.
pub fn command_for_key(code: u16) -> Option<Command> {
    match code {
        KEY_F1 => Some(Command::SelectSourceA),
        KEY_F2 => Some(Command::SelectSourceB),
        KEY_F3 => Some(Command::SelectSourceC),
        KEY_F4 => Some(Command::CycleOverlay),
        KEY_C => Some(Command::Quit),
        _ => None,
    }
}
