//! Mock framebuffer backend for unit and integration testing.
//!
//! Display memory is a shared `Vec<u8>`.  A mapping takes a copy of that
//! memory and writes it back when it is dropped, the way a shared mapping's
//! contents persist in the device after `munmap`.  While a surface is alive,
//! inspect its region through
//! [`DisplaySurface::region`](crate::application::display::DisplaySurface::region);
//! after it is dropped, use [`MockDisplayBackend::memory`].

use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::application::display::{DisplayBackend, FixedInfo, VariableInfo};

/// Geometry and failure injection for the mock.
#[derive(Debug, Clone, Default)]
pub struct MockDisplayConfig {
    pub fixed: FixedInfo,
    pub variable: VariableInfo,
    pub fail_fixed_info: bool,
    pub fail_variable_info: bool,
    pub fail_map: bool,
}

#[derive(Debug, Default)]
struct MockDisplayState {
    config: MockDisplayConfig,
    memory: Vec<u8>,
    map_lengths: Vec<usize>,
    variable_queries: usize,
}

/// In-memory stand-in for a framebuffer device.
#[derive(Debug, Clone, Default)]
pub struct MockDisplayBackend {
    state: Arc<Mutex<MockDisplayState>>,
}

impl MockDisplayBackend {
    /// A `xres × yres` display with a `yres_virtual`-line virtual area.
    pub fn new(xres: u32, yres: u32, yres_virtual: u32, bits_per_pixel: u32) -> Self {
        let config = MockDisplayConfig {
            fixed: FixedInfo {
                id: "mockfb".to_owned(),
                line_length: xres * bits_per_pixel / 8,
                smem_len: xres * yres_virtual * bits_per_pixel / 8,
            },
            variable: VariableInfo {
                xres,
                yres,
                xres_virtual: xres,
                yres_virtual,
                bits_per_pixel,
                yoffset: 0,
            },
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(MockDisplayState {
                config,
                ..Default::default()
            })),
        }
    }

    pub fn configure(&self, f: impl FnOnce(&mut MockDisplayConfig)) {
        f(&mut self.state.lock().unwrap().config);
    }

    /// Display memory as written back by dropped mappings.
    pub fn memory(&self) -> Vec<u8> {
        self.state.lock().unwrap().memory.clone()
    }

    /// Length of every mapping created so far.
    pub fn map_lengths(&self) -> Vec<usize> {
        self.state.lock().unwrap().map_lengths.clone()
    }

    pub fn variable_queries(&self) -> usize {
        self.state.lock().unwrap().variable_queries
    }
}

impl DisplayBackend for MockDisplayBackend {
    type Mapping = MockRegion;

    fn fixed_info(&mut self) -> io::Result<FixedInfo> {
        let state = self.state.lock().unwrap();
        if state.config.fail_fixed_info {
            return Err(io::Error::new(io::ErrorKind::Other, "mock FSCREENINFO failure"));
        }
        Ok(state.config.fixed.clone())
    }

    fn variable_info(&mut self) -> io::Result<VariableInfo> {
        let mut state = self.state.lock().unwrap();
        state.variable_queries += 1;
        if state.config.fail_variable_info {
            return Err(io::Error::new(io::ErrorKind::Other, "mock VSCREENINFO failure"));
        }
        Ok(state.config.variable)
    }

    fn map_region(&mut self, len: usize) -> io::Result<MockRegion> {
        let mut state = self.state.lock().unwrap();
        if state.config.fail_map {
            return Err(io::Error::new(io::ErrorKind::Other, "mock mmap failure"));
        }
        state.map_lengths.push(len);
        if state.memory.len() < len {
            state.memory.resize(len, 0);
        }
        Ok(MockRegion {
            bytes: state.memory[..len].to_vec(),
            state: Arc::clone(&self.state),
        })
    }
}

/// A mapped copy of mock display memory.
#[derive(Debug)]
pub struct MockRegion {
    bytes: Vec<u8>,
    state: Arc<Mutex<MockDisplayState>>,
}

impl Deref for MockRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for MockRegion {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for MockRegion {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            let len = self.bytes.len().min(state.memory.len());
            state.memory[..len].copy_from_slice(&self.bytes[..len]);
        }
    }
}
