//! Scripted input source for tests.
//!
//! Tests push records (or failures) into the script; each
//! [`read_event`](InputSource::read_event) call pops one entry, and an empty
//! script reads as "nothing pending".

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use vid_core::{InputEventRecord, INPUT_EVENT_SIZE};

use crate::application::input::{InputError, InputSource};

#[derive(Debug)]
enum Scripted {
    Event(InputEventRecord),
    ShortRead(usize),
    Failure(io::ErrorKind),
}

#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<Scripted>,
    reads: usize,
}

/// Shared-handle scripted [`InputSource`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&self, record: InputEventRecord) {
        self.push(Scripted::Event(record));
    }

    /// Queues a key press (value 1) for `code`.
    pub fn press(&self, code: u16) {
        self.push_event(InputEventRecord::key(code, 1));
    }

    pub fn push_short_read(&self, got: usize) {
        self.push(Scripted::ShortRead(got));
    }

    pub fn push_failure(&self, kind: io::ErrorKind) {
        self.push(Scripted::Failure(kind));
    }

    /// Number of `read_event` calls so far.
    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().script.len()
    }

    fn push(&self, entry: Scripted) {
        self.state.lock().unwrap().script.push_back(entry);
    }
}

impl InputSource for ScriptedInput {
    fn read_event(&mut self) -> Result<Option<InputEventRecord>, InputError> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        match state.script.pop_front() {
            None => Ok(None),
            Some(Scripted::Event(record)) => Ok(Some(record)),
            Some(Scripted::ShortRead(got)) => Err(InputError::ShortRead {
                got,
                expected: INPUT_EVENT_SIZE,
            }),
            Some(Scripted::Failure(kind)) => Err(InputError::Io(io::Error::from(kind))),
        }
    }
}
