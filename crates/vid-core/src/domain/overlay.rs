//! HUD overlay asset catalog.
//!
//! The HUD pictures are plain Windows bitmaps stored next to the boot image,
//! one file per picture, named by substituting the picture index into a fixed
//! pattern:
//!
//! ```text
//! /boot/hud/screen_{}.bmp  ──index 2──►  /boot/hud/screen_2.bmp
//! ```
//!
//! The catalog owns everything that is specific to that file format, so the
//! compositor only ever sees "pixel bytes for picture N".

use std::path::PathBuf;

use thiserror::Error;

/// Number of HUD pictures shipped with the device.
pub const HUD_NUM_OF_PICTURES: usize = 4;

/// Offset of the pixel array in the bitmap variant used by the HUD assets:
/// a 14-byte `BITMAPFILEHEADER` followed by a 40-byte `BITMAPINFOHEADER`,
/// no colour table.  Other bitmap variants place pixel data elsewhere.
pub const BITMAP_PIXEL_DATA_OFFSET: usize = 54;

/// Default asset naming pattern; `{}` is replaced by the picture index.
pub const DEFAULT_PICTURE_PATTERN: &str = "/boot/hud/screen_{}.bmp";

/// Error returned when an overlay index is outside the catalog.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("overlay index {index} out of range (catalog holds {count} pictures)")]
pub struct OverlayIndexError {
    pub index: usize,
    pub count: usize,
}

/// Describes where HUD pictures live and how their pixel data is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayCatalog {
    pattern: String,
    count: usize,
    pixel_data_offset: usize,
}

impl OverlayCatalog {
    pub fn new(pattern: impl Into<String>, count: usize, pixel_data_offset: usize) -> Self {
        Self {
            pattern: pattern.into(),
            count,
            pixel_data_offset,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Byte offset at which pixel data starts inside every asset file.
    pub fn pixel_data_offset(&self) -> usize {
        self.pixel_data_offset
    }

    /// Resolves the file path of picture `index`.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayIndexError`] when `index >= count`.
    pub fn path_for(&self, index: usize) -> Result<PathBuf, OverlayIndexError> {
        if index >= self.count {
            return Err(OverlayIndexError {
                index,
                count: self.count,
            });
        }
        Ok(PathBuf::from(
            self.pattern.replacen("{}", &index.to_string(), 1),
        ))
    }

    /// Returns the pixel bytes of an asset file, skipping its header.
    ///
    /// Returns `None` when the file is shorter than the header.
    pub fn pixel_data<'a>(&self, asset: &'a [u8]) -> Option<&'a [u8]> {
        asset.get(self.pixel_data_offset..)
    }
}

impl Default for OverlayCatalog {
    fn default() -> Self {
        Self::new(
            DEFAULT_PICTURE_PATTERN,
            HUD_NUM_OF_PICTURES,
            BITMAP_PIXEL_DATA_OFFSET,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
