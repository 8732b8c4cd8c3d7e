//! evdev input device reader.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use tracing::debug;
use vid_core::{InputEventRecord, INPUT_EVENT_SIZE};

use crate::application::input::{InputError, InputSource};

/// A `/dev/input/eventN` node opened non-blocking.
#[derive(Debug)]
pub struct EvdevInput {
    file: File,
    path: PathBuf,
}

impl EvdevInput {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
            .map_err(|source| InputError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "input device opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_clone_fd(&self) -> io::Result<OwnedFd> {
        self.file.as_fd().try_clone_to_owned()
    }
}

impl InputSource for EvdevInput {
    fn read_event(&mut self) -> Result<Option<InputEventRecord>, InputError> {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        match self.file.read(&mut buf) {
            Ok(n) if n < INPUT_EVENT_SIZE => Err(InputError::ShortRead {
                got: n,
                expected: INPUT_EVENT_SIZE,
            }),
            Ok(_) => InputEventRecord::decode(&buf)
                .map(Some)
                .map_err(|e| InputError::Io(io::Error::new(io::ErrorKind::InvalidData, e))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(InputError::Io(e)),
        }
    }
}
