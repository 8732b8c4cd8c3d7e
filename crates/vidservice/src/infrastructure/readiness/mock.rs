//! Scripted readiness waiter for tests.
//!
//! Each `wait` pops the next scripted result.  An exhausted script behaves as
//! a timeout, so a test loop without a Quit press would spin forever; always
//! script one or raise the stop flag.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::event_loop::{Readiness, ReadinessWaiter};

#[derive(Debug, Default)]
struct WaiterState {
    script: VecDeque<Result<Readiness, io::ErrorKind>>,
    timeouts: Vec<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedWaiter {
    state: Arc<Mutex<WaiterState>>,
}

impl ScriptedWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, readiness: Readiness) {
        self.state.lock().unwrap().script.push_back(Ok(readiness));
    }

    pub fn push_error(&self, kind: io::ErrorKind) {
        self.state.lock().unwrap().script.push_back(Err(kind));
    }

    /// Timeout passed to every `wait` call so far.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().timeouts.clone()
    }
}

impl ReadinessWaiter for ScriptedWaiter {
    fn wait(&mut self, timeout: Duration) -> io::Result<Readiness> {
        let mut state = self.state.lock().unwrap();
        state.timeouts.push(timeout);
        match state.script.pop_front() {
            None => Ok(Readiness::default()),
            Some(Ok(readiness)) => Ok(readiness),
            Some(Err(kind)) => Err(io::Error::from(kind)),
        }
    }
}
