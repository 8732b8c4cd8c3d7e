//! Input port: the source of button events.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vid_core::InputEventRecord;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot open input device {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device returned less than one full event record.
    #[error("short input read: got {got} bytes, expected {expected}")]
    ShortRead { got: usize, expected: usize },

    #[error("input read failed: {0}")]
    Io(#[source] io::Error),
}

/// Non-blocking reader of evdev records.
#[cfg_attr(test, mockall::automock)]
pub trait InputSource {
    /// Reads one event.  Returns `Ok(None)` when nothing is pending.
    fn read_event(&mut self) -> Result<Option<InputEventRecord>, InputError>;
}
