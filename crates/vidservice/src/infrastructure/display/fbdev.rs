//! Linux framebuffer (`/dev/fbN`) backend.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::application::display::{
    DisplayBackend, DisplayError, DisplaySurface, FixedInfo, VariableInfo,
};
use crate::application::overlay::SurfaceOpener;
use crate::infrastructure::capture::v4l2::xioctl;

// ── <linux/fb.h> ──────────────────────────────────────────────────────────────

#[allow(non_camel_case_types, dead_code)]
mod sys {
    use nix::ioctl_read_bad;
    use nix::libc::c_ulong;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct fb_bitfield {
        pub offset: u32,
        pub length: u32,
        pub msb_right: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct fb_var_screeninfo {
        pub xres: u32,
        pub yres: u32,
        pub xres_virtual: u32,
        pub yres_virtual: u32,
        pub xoffset: u32,
        pub yoffset: u32,
        pub bits_per_pixel: u32,
        pub grayscale: u32,
        pub red: fb_bitfield,
        pub green: fb_bitfield,
        pub blue: fb_bitfield,
        pub transp: fb_bitfield,
        pub nonstd: u32,
        pub activate: u32,
        pub height: u32,
        pub width: u32,
        pub accel_flags: u32,
        pub pixclock: u32,
        pub left_margin: u32,
        pub right_margin: u32,
        pub upper_margin: u32,
        pub lower_margin: u32,
        pub hsync_len: u32,
        pub vsync_len: u32,
        pub sync: u32,
        pub vmode: u32,
        pub rotate: u32,
        pub colorspace: u32,
        pub reserved: [u32; 4],
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct fb_fix_screeninfo {
        pub id: [u8; 16],
        pub smem_start: c_ulong,
        pub smem_len: u32,
        pub type_: u32,
        pub type_aux: u32,
        pub visual: u32,
        pub xpanstep: u16,
        pub ypanstep: u16,
        pub ywrapstep: u16,
        pub line_length: u32,
        pub mmio_start: c_ulong,
        pub mmio_len: u32,
        pub accel: u32,
        pub capabilities: u16,
        pub reserved: [u16; 2],
    }

    ioctl_read_bad!(fbioget_vscreeninfo, 0x4600, fb_var_screeninfo);
    ioctl_read_bad!(fbioget_fscreeninfo, 0x4602, fb_fix_screeninfo);
}

use sys::{fb_fix_screeninfo, fb_var_screeninfo, fbioget_fscreeninfo, fbioget_vscreeninfo};

// ── Device ────────────────────────────────────────────────────────────────────

/// An open framebuffer device node.
#[derive(Debug)]
pub struct FbDevice {
    file: File,
    path: PathBuf,
}

impl FbDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DisplayError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| DisplayError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "framebuffer opened");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplayBackend for FbDevice {
    type Mapping = MmapMut;

    fn fixed_info(&mut self) -> io::Result<FixedInfo> {
        let fd = self.file.as_raw_fd();
        let mut info = fb_fix_screeninfo::default();
        xioctl(|| unsafe { fbioget_fscreeninfo(fd, &mut info) }.map_err(io::Error::from))?;

        let id_len = info.id.iter().position(|b| *b == 0).unwrap_or(info.id.len());
        Ok(FixedInfo {
            id: String::from_utf8_lossy(&info.id[..id_len]).into_owned(),
            line_length: info.line_length,
            smem_len: info.smem_len,
        })
    }

    fn variable_info(&mut self) -> io::Result<VariableInfo> {
        let fd = self.file.as_raw_fd();
        let mut info = fb_var_screeninfo::default();
        xioctl(|| unsafe { fbioget_vscreeninfo(fd, &mut info) }.map_err(io::Error::from))?;
        Ok(VariableInfo {
            xres: info.xres,
            yres: info.yres,
            xres_virtual: info.xres_virtual,
            yres_virtual: info.yres_virtual,
            bits_per_pixel: info.bits_per_pixel,
            yoffset: info.yoffset,
        })
    }

    fn map_region(&mut self, len: usize) -> io::Result<MmapMut> {
        // SAFETY: framebuffer memory is device memory shared with the
        // display controller; the daemon is its only writer.
        unsafe { MmapOptions::new().len(len).map_mut(&self.file) }
    }
}

/// Opens a framebuffer surface at a fixed path on demand.
#[derive(Debug, Clone)]
pub struct FbdevSurfaceOpener {
    path: PathBuf,
}

impl FbdevSurfaceOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SurfaceOpener for FbdevSurfaceOpener {
    type Backend = FbDevice;

    fn open_surface(&self) -> Result<DisplaySurface<FbDevice>, DisplayError> {
        DisplaySurface::open(FbDevice::open(&self.path)?)
    }
}
