//! In-memory overlay collaborators for tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::application::display::{DisplayError, DisplaySurface};
use crate::application::overlay::{AssetStore, OverlayApplier, OverlayError, SurfaceOpener};
use crate::infrastructure::display::mock::MockDisplayBackend;

/// Asset store backed by a path → bytes map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAssetStore {
    assets: HashMap<PathBuf, Vec<u8>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.assets.insert(path.into(), bytes);
    }
}

impl AssetStore for InMemoryAssetStore {
    type Asset = Vec<u8>;

    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.assets
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// Opens surfaces over a shared [`MockDisplayBackend`].
#[derive(Debug, Clone, Default)]
pub struct MockSurfaceOpener {
    backend: MockDisplayBackend,
    fail_open: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl MockSurfaceOpener {
    pub fn new(backend: MockDisplayBackend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// When set, every open fails with [`DisplayError::OpenFailed`].
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of open attempts so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SurfaceOpener for MockSurfaceOpener {
    type Backend = MockDisplayBackend;

    fn open_surface(&self) -> Result<DisplaySurface<MockDisplayBackend>, DisplayError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DisplayError::OpenFailed {
                path: PathBuf::from("/dev/mock-hud"),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        DisplaySurface::open(self.backend.clone())
    }
}

/// Overlay port that records applied indices.
#[derive(Debug, Clone, Default)]
pub struct RecordingOverlay {
    applied: Arc<Mutex<Vec<usize>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices applied successfully, in order.
    pub fn applied(&self) -> Vec<usize> {
        self.applied.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl OverlayApplier for RecordingOverlay {
    fn apply_overlay(&mut self, index: usize) -> Result<usize, OverlayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OverlayError::AssetMissing {
                path: PathBuf::from(format!("/mock/hud/screen_{index}.bmp")),
                source: io::Error::from(io::ErrorKind::NotFound),
            });
        }
        self.applied.lock().unwrap().push(index);
        Ok(0)
    }
}
