//! Route switch that records every selection.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vid_core::OutputRoute;

use crate::application::route::{OutputRouteSwitch, RouteError};

#[derive(Debug, Clone, Default)]
pub struct RecordingRouteSwitch {
    selections: Arc<Mutex<Vec<OutputRoute>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingRouteSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes selected so far, in order.  Failed writes are not recorded.
    pub fn selections(&self) -> Vec<OutputRoute> {
        self.selections.lock().unwrap().clone()
    }

    /// Digits written so far, as the control file would have seen them.
    pub fn written(&self) -> String {
        self.selections()
            .iter()
            .map(|route| route.as_digit() as char)
            .collect()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl OutputRouteSwitch for RecordingRouteSwitch {
    fn select(&mut self, route: OutputRoute) -> Result<(), RouteError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RouteError::WriteFailed {
                route,
                source: io::Error::new(io::ErrorKind::Other, "mock route failure"),
            });
        }
        self.selections.lock().unwrap().push(route);
        Ok(())
    }
}
