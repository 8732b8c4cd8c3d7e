//! HUD overlay compositor.
//!
//! The HUD is a second display plane showing one of a fixed set of bitmap
//! pictures.  Applying overlay `i` means:
//!
//! 1. resolve the asset path for `i` through the [`OverlayCatalog`],
//! 2. load the asset and skip its header,
//! 3. refresh the target surface's geometry,
//! 4. copy the pixel bytes to the visible part of the region.
//!
//! Overlay failures are never fatal to the daemon; callers log them and keep
//! running with whatever picture was shown before.

use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use vid_core::{GeometryError, OverlayCatalog, OverlayIndexError};

use crate::application::display::{DisplayBackend, DisplayError, DisplaySurface};

/// Errors raised while applying an overlay.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error(transparent)]
    IndexOutOfRange(#[from] OverlayIndexError),

    #[error("overlay asset {path} not found")]
    AssetMissing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read overlay asset {path}: {source}")]
    AssetUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The asset holds fewer pixel bytes than the visible region needs.
    #[error("overlay asset {path} holds {available} pixel bytes, {needed} needed")]
    AssetTooSmall {
        path: PathBuf,
        needed: usize,
        available: usize,
    },

    #[error("overlay plane unavailable: {0}")]
    Display(#[from] DisplayError),
}

/// Source of overlay asset bytes.
pub trait AssetStore {
    type Asset: Deref<Target = [u8]>;

    fn load(&self, path: &Path) -> io::Result<Self::Asset>;
}

/// Opens the display surface an overlay is drawn on.
pub trait SurfaceOpener {
    type Backend: DisplayBackend;

    fn open_surface(&self) -> Result<DisplaySurface<Self::Backend>, DisplayError>;
}

/// Copies catalog pictures into display surfaces.
#[derive(Debug)]
pub struct OverlayCompositor<S> {
    catalog: OverlayCatalog,
    store: S,
}

impl<S: AssetStore> OverlayCompositor<S> {
    pub fn new(catalog: OverlayCatalog, store: S) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &OverlayCatalog {
        &self.catalog
    }

    /// Draws picture `index` onto `target` and returns the number of bytes
    /// written.
    ///
    /// The copy starts at the surface's visible offset and runs to the end of
    /// the region.  Nothing is written if the asset is too small for that, or
    /// if the visible offset leaves no room in the region.
    pub fn apply<B: DisplayBackend>(
        &self,
        index: usize,
        target: &mut DisplaySurface<B>,
    ) -> Result<usize, OverlayError> {
        let path = self.catalog.path_for(index)?;
        let asset = self.store.load(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                OverlayError::AssetMissing {
                    path: path.clone(),
                    source,
                }
            } else {
                OverlayError::AssetUnreadable {
                    path: path.clone(),
                    source,
                }
            }
        })?;
        let pixels = self.catalog.pixel_data(&asset).unwrap_or_default();

        let geometry = target.refresh_geometry()?;
        let offset = geometry.visible_offset();
        let region_len = target.region_len();
        if offset >= region_len {
            return Err(OverlayError::Display(DisplayError::Geometry(
                GeometryError::OutOfBounds {
                    offset,
                    len: 0,
                    region_len,
                },
            )));
        }
        let needed = region_len - offset;
        if pixels.len() < needed {
            return Err(OverlayError::AssetTooSmall {
                path,
                needed,
                available: pixels.len(),
            });
        }

        target.write_region(offset, &pixels[..needed])?;
        debug!(index, offset, bytes = needed, path = %path.display(), "overlay copied");
        Ok(needed)
    }
}

/// Object-safe overlay port used by the event loop.
pub trait OverlayApplier {
    fn apply_overlay(&mut self, index: usize) -> Result<usize, OverlayError>;
}

/// The HUD plane: opens its surface on every application so a plane that
/// appears or changes mode at runtime is picked up.
pub struct HudPlane<S, O> {
    compositor: OverlayCompositor<S>,
    opener: O,
}

impl<S: AssetStore, O: SurfaceOpener> HudPlane<S, O> {
    pub fn new(compositor: OverlayCompositor<S>, opener: O) -> Self {
        Self { compositor, opener }
    }
}

impl<S: AssetStore, O: SurfaceOpener> OverlayApplier for HudPlane<S, O> {
    fn apply_overlay(&mut self, index: usize) -> Result<usize, OverlayError> {
        let mut surface = self.opener.open_surface()?;
        let written = self.compositor.apply(index, &mut surface)?;
        info!(index, bytes = written, "HUD overlay applied");
        Ok(written)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display::mock::MockDisplayBackend;
    use crate::infrastructure::overlay::mock::{InMemoryAssetStore, MockSurfaceOpener};

    const HEADER: usize = 54;

    fn catalog() -> OverlayCatalog {
        OverlayCatalog::new("/hud/screen_{}.bmp", 4, HEADER)
    }

    fn asset(fill: u8, pixels: usize) -> Vec<u8> {
        let mut bytes = vec![0xEE; HEADER];
        bytes.extend(std::iter::repeat(fill).take(pixels));
        bytes
    }

    #[test]
    fn test_apply_copies_pixels_after_header() {
        // Arrange
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let store = InMemoryAssetStore::new().with("/hud/screen_2.bmp", asset(0x22, 16));
        let compositor = OverlayCompositor::new(catalog(), store);

        // Act
        let written = compositor.apply(2, &mut surface).unwrap();

        // Assert
        assert_eq!(written, 16);
        assert!(surface.region().iter().all(|b| *b == 0x22));
    }

    #[test]
    fn test_apply_starts_at_visible_offset() {
        // Arrange: 4 visible lines of a 8-line virtual area, panned to line 4.
        let backend = MockDisplayBackend::new(4, 4, 8, 8);
        backend.configure(|s| s.variable.yoffset = 4);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let store = InMemoryAssetStore::new().with("/hud/screen_0.bmp", asset(0x11, 16));
        let compositor = OverlayCompositor::new(catalog(), store);

        // Act
        let written = compositor.apply(0, &mut surface).unwrap();

        // Assert
        assert_eq!(written, 16);
        assert!(surface.region()[..16].iter().all(|b| *b == 0));
        assert!(surface.region()[16..].iter().all(|b| *b == 0x11));
    }

    #[test]
    fn test_apply_rejects_offset_at_end_of_region() {
        // Arrange: panned past the last line of a 4-line virtual area.
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        backend.configure(|s| s.variable.yoffset = 4);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let store = InMemoryAssetStore::new().with("/hud/screen_0.bmp", asset(0x11, 16));
        let compositor = OverlayCompositor::new(catalog(), store);

        // Act
        let err = compositor.apply(0, &mut surface).unwrap_err();

        // Assert
        assert!(matches!(
            err,
            OverlayError::Display(DisplayError::Geometry(GeometryError::OutOfBounds {
                offset: 16,
                len: 0,
                region_len: 16,
            }))
        ));
        assert!(surface.region().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_apply_refreshes_geometry_first() {
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let mut surface = DisplaySurface::open(backend.clone()).unwrap();
        let store = InMemoryAssetStore::new().with("/hud/screen_0.bmp", asset(1, 16));
        let compositor = OverlayCompositor::new(catalog(), store);
        let before = backend.variable_queries();

        compositor.apply(0, &mut surface).unwrap();

        assert_eq!(backend.variable_queries(), before + 1);
    }

    #[test]
    fn test_apply_rejects_short_asset_without_writing() {
        // Arrange
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let store = InMemoryAssetStore::new().with("/hud/screen_1.bmp", asset(0x33, 15));
        let compositor = OverlayCompositor::new(catalog(), store);

        // Act
        let err = compositor.apply(1, &mut surface).unwrap_err();

        // Assert
        assert!(matches!(
            err,
            OverlayError::AssetTooSmall {
                needed: 16,
                available: 15,
                ..
            }
        ));
        assert!(surface.region().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_apply_reports_missing_asset() {
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let compositor = OverlayCompositor::new(catalog(), InMemoryAssetStore::new());

        let err = compositor.apply(3, &mut surface).unwrap_err();

        match err {
            OverlayError::AssetMissing { path, .. } => {
                assert_eq!(path, PathBuf::from("/hud/screen_3.bmp"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_rejects_index_outside_catalog() {
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let compositor = OverlayCompositor::new(catalog(), InMemoryAssetStore::new());

        assert!(matches!(
            compositor.apply(4, &mut surface),
            Err(OverlayError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn test_hud_plane_writes_through_opened_surface() {
        // Arrange
        let backend = MockDisplayBackend::new(4, 4, 4, 8);
        let store = InMemoryAssetStore::new().with("/hud/screen_0.bmp", asset(0x44, 16));
        let mut plane = HudPlane::new(
            OverlayCompositor::new(catalog(), store),
            MockSurfaceOpener::new(backend.clone()),
        );

        // Act
        plane.apply_overlay(0).unwrap();

        // Assert
        assert_eq!(backend.memory(), vec![0x44; 16]);
    }

    #[test]
    fn test_hud_plane_reports_unavailable_surface() {
        let opener = MockSurfaceOpener::new(MockDisplayBackend::new(4, 4, 4, 8));
        opener.set_fail_open(true);
        let mut plane = HudPlane::new(
            OverlayCompositor::new(catalog(), InMemoryAssetStore::new()),
            opener,
        );

        assert!(matches!(
            plane.apply_overlay(0),
            Err(OverlayError::Display(DisplayError::OpenFailed { .. }))
        ));
    }
}
