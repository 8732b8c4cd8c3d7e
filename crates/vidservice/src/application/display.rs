//! Display surface: a memory-mapped framebuffer region.
//!
//! The surface owns the mapping and re-derives its [`DisplayGeometry`] from
//! the backend on demand.  All writes go through
//! [`DisplaySurface::write_region`], which bounds-checks against the mapped
//! length, so a geometry change between two frames can never produce an
//! out-of-range copy.

use std::io;
use std::ops::DerefMut;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};
use vid_core::{DisplayGeometry, GeometryError};

/// Errors raised by [`DisplaySurface`].
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("cannot open display device {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("display geometry query failed: {0}")]
    GeometryQueryFailed(#[source] io::Error),

    /// The geometry is unusable, or a write would leave the mapped region.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("cannot map {len} bytes of display memory: {source}")]
    MapFailed {
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// Fixed (per-device) framebuffer properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedInfo {
    /// Driver identification string.
    pub id: String,
    /// Bytes per scanline.
    pub line_length: u32,
    /// Length of framebuffer memory.
    pub smem_len: u32,
}

/// Variable (mode-dependent) framebuffer properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariableInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub bits_per_pixel: u32,
    pub yoffset: u32,
}

/// Raw access to a framebuffer device.
pub trait DisplayBackend {
    /// A writable mapping of display memory.  Dropping it unmaps.
    type Mapping: DerefMut<Target = [u8]>;

    fn fixed_info(&mut self) -> io::Result<FixedInfo>;

    fn variable_info(&mut self) -> io::Result<VariableInfo>;

    /// Maps the first `len` bytes of display memory, shared and writable.
    fn map_region(&mut self, len: usize) -> io::Result<Self::Mapping>;
}

fn geometry_from(fixed: &FixedInfo, var: &VariableInfo) -> DisplayGeometry {
    DisplayGeometry {
        visible_width: var.xres,
        visible_height: var.yres,
        width: var.xres_virtual,
        height: var.yres_virtual,
        bits_per_pixel: var.bits_per_pixel,
        line_length: fixed.line_length,
        yoffset: var.yoffset,
    }
}

/// A framebuffer with its memory mapped into the process.
pub struct DisplaySurface<B: DisplayBackend> {
    // Unmapped before the device handle closes.
    region: B::Mapping,
    backend: B,
    fixed: FixedInfo,
    geometry: DisplayGeometry,
}

impl<B: DisplayBackend> DisplaySurface<B> {
    /// Queries fixed and variable geometry and maps the full virtual region.
    ///
    /// # Errors
    ///
    /// [`DisplayError::GeometryQueryFailed`], [`DisplayError::Geometry`] for a
    /// zero-sized region, or [`DisplayError::MapFailed`].
    pub fn open(mut backend: B) -> Result<Self, DisplayError> {
        let fixed = backend
            .fixed_info()
            .map_err(DisplayError::GeometryQueryFailed)?;
        let var = backend
            .variable_info()
            .map_err(DisplayError::GeometryQueryFailed)?;
        let geometry = geometry_from(&fixed, &var);
        let len = geometry.region_len()?;
        let region = backend
            .map_region(len)
            .map_err(|source| DisplayError::MapFailed { len, source })?;

        info!(
            id = %fixed.id,
            visible = %format_args!("{}x{}", geometry.visible_width, geometry.visible_height),
            virtual_size = %format_args!("{}x{}", geometry.width, geometry.height),
            bpp = geometry.bits_per_pixel,
            "display surface mapped"
        );

        Ok(Self {
            region,
            backend,
            fixed,
            geometry,
        })
    }

    /// Geometry as of the last refresh.
    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn fixed(&self) -> &FixedInfo {
        &self.fixed
    }

    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    /// Read-only view of the mapped region.
    pub fn region(&self) -> &[u8] {
        &self.region
    }

    /// Re-reads the variable geometry, remapping if the region size changed.
    ///
    /// # Errors
    ///
    /// On any error the previous mapping and geometry are kept.
    pub fn refresh_geometry(&mut self) -> Result<DisplayGeometry, DisplayError> {
        let var = self
            .backend
            .variable_info()
            .map_err(DisplayError::GeometryQueryFailed)?;
        let geometry = geometry_from(&self.fixed, &var);
        let len = geometry.region_len()?;

        if len != self.region.len() {
            self.region = self
                .backend
                .map_region(len)
                .map_err(|source| DisplayError::MapFailed { len, source })?;
            debug!(len, "display region remapped after geometry change");
        }

        self.geometry = geometry;
        Ok(geometry)
    }

    /// Copies `src` into the region at `offset`.
    ///
    /// # Errors
    ///
    /// [`DisplayError::Geometry`] wrapping [`GeometryError::OutOfBounds`] when
    /// the write would not fit.  Nothing is written in that case.
    pub fn write_region(&mut self, offset: usize, src: &[u8]) -> Result<(), DisplayError> {
        DisplayGeometry::check_write(offset, src.len(), self.region.len())?;
        self.region[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display::mock::MockDisplayBackend;

    #[test]
    fn test_open_maps_full_virtual_region() {
        // Arrange
        let backend = MockDisplayBackend::new(8, 4, 8, 16);

        // Act
        let surface = DisplaySurface::open(backend.clone()).unwrap();

        // Assert
        assert_eq!(surface.region_len(), 8 * 8 * 2);
        assert_eq!(surface.geometry().line_length, 16);
        assert_eq!(backend.map_lengths(), vec![128]);
    }

    #[test]
    fn test_open_rejects_zero_sized_geometry() {
        let backend = MockDisplayBackend::new(0, 0, 0, 16);

        assert!(matches!(
            DisplaySurface::open(backend),
            Err(DisplayError::Geometry(GeometryError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_open_reports_failed_query() {
        let backend = MockDisplayBackend::new(8, 4, 8, 16);
        backend.configure(|s| s.fail_variable_info = true);

        assert!(matches!(
            DisplaySurface::open(backend),
            Err(DisplayError::GeometryQueryFailed(_))
        ));
    }

    #[test]
    fn test_refresh_picks_up_new_yoffset_without_remap() {
        // Arrange
        let backend = MockDisplayBackend::new(8, 4, 8, 16);
        let mut surface = DisplaySurface::open(backend.clone()).unwrap();
        backend.configure(|s| s.variable.yoffset = 4);

        // Act
        let geometry = surface.refresh_geometry().unwrap();

        // Assert
        assert_eq!(geometry.visible_offset(), 4 * 16);
        assert_eq!(backend.map_lengths().len(), 1);
    }

    #[test]
    fn test_refresh_remaps_when_region_grows() {
        let backend = MockDisplayBackend::new(8, 4, 4, 16);
        let mut surface = DisplaySurface::open(backend.clone()).unwrap();
        backend.configure(|s| s.variable.yres_virtual = 8);

        surface.refresh_geometry().unwrap();

        assert_eq!(surface.region_len(), 128);
        assert_eq!(backend.map_lengths(), vec![64, 128]);
    }

    #[test]
    fn test_write_region_copies_at_offset() {
        let backend = MockDisplayBackend::new(8, 4, 8, 16);
        let mut surface = DisplaySurface::open(backend).unwrap();

        surface.write_region(10, &[7, 8, 9]).unwrap();

        assert_eq!(&surface.region()[9..14], &[0, 7, 8, 9, 0]);
    }

    #[test]
    fn test_write_region_rejects_overflow_without_writing() {
        // Arrange
        let backend = MockDisplayBackend::new(8, 4, 8, 16);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let len = surface.region_len();

        // Act
        let err = surface.write_region(len - 2, &[1, 2, 3]).unwrap_err();

        // Assert
        assert!(matches!(
            err,
            DisplayError::Geometry(GeometryError::OutOfBounds { len: 3, .. })
        ));
        assert!(surface.region().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_write_region_accepts_exact_fit() {
        let backend = MockDisplayBackend::new(8, 4, 8, 16);
        let mut surface = DisplaySurface::open(backend).unwrap();
        let len = surface.region_len();

        assert!(surface.write_region(0, &vec![0xAB; len]).is_ok());
        assert_eq!(surface.region()[len - 1], 0xAB);
    }
}
