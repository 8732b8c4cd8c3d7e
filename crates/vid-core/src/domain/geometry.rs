//! Framebuffer geometry and region arithmetic.
//!
//! # Why re-query the geometry? (for beginners)
//!
//! A Linux framebuffer may be larger than the visible screen.  Drivers that
//! double-buffer expose a *virtual* resolution twice the visible height and
//! move a vertical offset (`yoffset`) between the two halves.  Whatever is
//! drawn must land at `yoffset × line_length` bytes from the start of the
//! mapping, and `yoffset` can change between two frames.  That is why the
//! display surface re-reads the variable geometry before every composition.
//!
//! ```text
//! mapping start ─► ┌──────────────────────┐
//!                  │  page 0              │
//!  yoffset × line ─► ├──────────────────────┤ ◄─ write frames here
//!                  │  page 1              │
//!                  └──────────────────────┘ ◄─ region_len()
//! ```

use thiserror::Error;

/// Error type for geometry arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// The reported geometry describes an empty or overflowing region.
    #[error("invalid geometry {width}x{height}@{bits_per_pixel}bpp")]
    Invalid {
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    },

    /// A write would run past the end of the mapped region.
    #[error("write of {len} bytes at offset {offset} exceeds region of {region_len} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        region_len: usize,
    },
}

/// Display geometry as reported by the framebuffer driver.
///
/// `width`/`height` are the *virtual* resolution, which is what the mapped
/// region covers.  `visible_width`/`visible_height` are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayGeometry {
    pub visible_width: u32,
    pub visible_height: u32,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per scanline, including any driver padding.
    pub line_length: u32,
    /// First visible scanline within the virtual area.
    pub yoffset: u32,
}

impl DisplayGeometry {
    /// Size in bytes of the full mapped region:
    /// `width × height × bits_per_pixel / 8`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Invalid`] for a zero-sized or overflowing
    /// region.
    pub fn region_len(&self) -> Result<usize, GeometryError> {
        let invalid = || GeometryError::Invalid {
            width: self.width,
            height: self.height,
            bits_per_pixel: self.bits_per_pixel,
        };
        let bits = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(self.bits_per_pixel as usize))
            .ok_or_else(invalid)?;
        let bytes = bits / 8;
        if bytes == 0 {
            return Err(invalid());
        }
        Ok(bytes)
    }

    /// Byte offset of the first visible scanline: `yoffset × line_length`.
    pub fn visible_offset(&self) -> usize {
        self.yoffset as usize * self.line_length as usize
    }

    /// Validates that `len` bytes written at `offset` stay inside a region of
    /// `region_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::OutOfBounds`] when the write would overflow.
    pub fn check_write(offset: usize, len: usize, region_len: usize) -> Result<(), GeometryError> {
        match offset.checked_add(len) {
            Some(end) if end <= region_len => Ok(()),
            _ => Err(GeometryError::OutOfBounds {
                offset,
                len,
                region_len,
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn vga_rgb565(yoffset: u32) -> DisplayGeometry {
        DisplayGeometry {
            visible_width: 640,
            visible_height: 480,
            width: 640,
            height: 960,
            bits_per_pixel: 16,
            line_length: 1280,
            yoffset,
        }
    }

    #[test]
    fn test_region_len_uses_virtual_resolution() {
        // Arrange
        let geometry = vga_rgb565(0);

        // Act
        let len = geometry.region_len().expect("valid geometry");

        // Assert
        assert_eq!(len, 640 * 960 * 2);
    }

    #[test]
    fn test_visible_offset_is_yoffset_times_stride() {
        assert_eq!(vga_rgb565(0).visible_offset(), 0);
        assert_eq!(vga_rgb565(480).visible_offset(), 480 * 1280);
    }

    #[test]
    fn test_region_len_rejects_zero_bpp() {
        let geometry = DisplayGeometry {
            bits_per_pixel: 0,
            ..vga_rgb565(0)
        };
        assert!(matches!(
            geometry.region_len(),
            Err(GeometryError::Invalid { bits_per_pixel: 0, .. })
        ));
    }

    #[test]
    fn test_check_write_accepts_exact_fit() {
        assert!(DisplayGeometry::check_write(100, 900, 1000).is_ok());
    }

    #[test]
    fn test_check_write_rejects_overflow() {
        let err = DisplayGeometry::check_write(100, 901, 1000).unwrap_err();
        assert_eq!(
            err,
            GeometryError::OutOfBounds {
                offset: 100,
                len: 901,
                region_len: 1000
            }
        );
    }

    #[test]
    fn test_check_write_rejects_arithmetic_overflow() {
        assert!(DisplayGeometry::check_write(usize::MAX, 1, usize::MAX).is_err());
    }
}
