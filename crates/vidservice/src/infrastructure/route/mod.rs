//! Output route switch backed by a sysfs control file.

pub mod mock;

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::info;
use vid_core::OutputRoute;

use crate::application::route::{OutputRouteSwitch, RouteError};

/// Writes the route digit at offset 0 of a control file.
#[derive(Debug)]
pub struct SysfsRouteSwitch {
    file: File,
    path: PathBuf,
}

impl SysfsRouteSwitch {
    /// Opens the control file.  Failing here is fatal at startup.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RouteError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| RouteError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputRouteSwitch for SysfsRouteSwitch {
    fn select(&mut self, route: OutputRoute) -> Result<(), RouteError> {
        self.file
            .write_at(&[route.as_digit()], 0)
            .map_err(|source| RouteError::WriteFailed { route, source })?;
        info!(route = ?route, digit = %(route.as_digit() as char), "output route selected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_overwrites_first_byte() {
        // Arrange
        let path = std::env::temp_dir().join(format!("vidservice-route-{}", std::process::id()));
        std::fs::write(&path, b"0").unwrap();
        let mut switch = SysfsRouteSwitch::open(&path).unwrap();

        // Act
        switch.select(OutputRoute::Secondary).unwrap();

        // Assert
        assert_eq!(std::fs::read(&path).unwrap(), b"1");

        switch.select(OutputRoute::Primary).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"0");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_missing_control_file_fails() {
        assert!(matches!(
            SysfsRouteSwitch::open("/nonexistent/video_output/state"),
            Err(RouteError::OpenFailed { .. })
        ));
    }
}
