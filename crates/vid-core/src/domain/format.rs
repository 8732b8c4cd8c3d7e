//! Capture pixel formats and V4L2 FourCC codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A V4L2 four-character code, stored little-endian as the kernel does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    /// Builds a code from its four ASCII characters.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Pixel formats the capture device can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// YUV 4:2:0 semi-planar, the camera's native output.
    Nv12,
    /// YUV 4:2:2 packed.
    Yuyv,
    /// 24-bit packed RGB (`RGB3`).
    Rgb24,
    /// 16-bit packed RGB 5:6:5 (`RGBP`).
    Rgb565,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCc {
        match self {
            PixelFormat::Nv12 => FourCc::from_bytes(*b"NV12"),
            PixelFormat::Yuyv => FourCc::from_bytes(*b"YUYV"),
            PixelFormat::Rgb24 => FourCc::from_bytes(*b"RGB3"),
            PixelFormat::Rgb565 => FourCc::from_bytes(*b"RGBP"),
        }
    }

    /// Nominal frame size in bytes for a `width × height` image.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Nv12 => pixels * 3 / 2,
            PixelFormat::Yuyv | PixelFormat::Rgb565 => pixels * 2,
            PixelFormat::Rgb24 => pixels * 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fourcc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nv12_fourcc_matches_kernel_value() {
        // v4l2_fourcc('N','V','1','2')
        assert_eq!(PixelFormat::Nv12.fourcc().0, 0x3231_564E);
    }

    #[test]
    fn test_fourcc_display_prints_characters() {
        assert_eq!(PixelFormat::Rgb24.fourcc().to_string(), "RGB3");
        assert_eq!(FourCc(0x0000_0041).to_string(), "A...");
    }

    #[test]
    fn test_frame_len_per_format() {
        assert_eq!(PixelFormat::Nv12.frame_len(640, 480), 460_800);
        assert_eq!(PixelFormat::Yuyv.frame_len(640, 480), 614_400);
        assert_eq!(PixelFormat::Rgb24.frame_len(2, 2), 12);
    }

    #[test]
    fn test_pixel_format_deserializes_from_uppercase_name() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: PixelFormat,
        }
        let w: Wrapper = toml::from_str("format = \"NV12\"").expect("deserialize");
        assert_eq!(w.format, PixelFormat::Nv12);
    }
}
