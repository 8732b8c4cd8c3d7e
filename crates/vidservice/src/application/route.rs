//! Output route port.
//!
//! The board's LCD can be fed from one of two video paths.  A sysfs control
//! file selects the path by its digit (`"0"` or `"1"`).

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vid_core::OutputRoute;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("cannot open route switch {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot select route {route:?}: {source}")]
    WriteFailed {
        route: OutputRoute,
        #[source]
        source: io::Error,
    },
}

/// Selects which video path feeds the display.
#[cfg_attr(test, mockall::automock)]
pub trait OutputRouteSwitch {
    fn select(&mut self, route: OutputRoute) -> Result<(), RouteError>;
}
