//! V4L2 capture backend using memory-mapped streaming I/O.
//!
//! The device is opened through [`v4l::Device`] and the format is set with
//! the crate's [`Capture`] trait.  Buffer exchange goes through the crate's
//! raw layer (`v4l::v4l2::ioctl` with `v4l_sys` structs) because the
//! event loop needs to own each buffer index between dequeue and requeue,
//! which the high-level `MmapStream` does not expose.
//!
//! Every ioctl is retried while it fails with `EINTR`.  The descriptor is
//! non-blocking, so a dequeue with no completed frame fails with `EAGAIN`,
//! which surfaces as [`io::ErrorKind::WouldBlock`].

use std::io;
use std::mem;
use std::os::fd::{BorrowedFd, OwnedFd, RawFd};
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::debug;
use v4l::buffer::{Flags, Type};
use v4l::format::FieldOrder;
use v4l::memory::Memory;
use v4l::v4l2::{self, vidioc};
use v4l::v4l_sys::{v4l2_buffer, v4l2_crop, v4l2_cropcap, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::application::capture::{
    BufferDescriptor, CaptureBackend, CaptureError, CaptureSettings, DequeueError,
    DequeuedBuffer, NegotiatedFormat,
};

/// Sentinel written into `index` before a dequeue to detect whether the
/// driver handed a buffer back together with an error.
const NO_BUFFER: u32 = u32::MAX;

/// Runs a device call, retrying while it is interrupted by a signal.
pub(crate) fn xioctl<T>(mut call: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match call() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Issues a raw `VIDIOC_*` request with `$arg` as the argument struct.
macro_rules! vidioc_call {
    ($fd:expr, $request:ident, $arg:expr) => {{
        let fd: RawFd = $fd;
        let arg = ($arg as *mut _).cast::<c_void>();
        // SAFETY: `arg` points at a live, correctly typed argument for
        // `$request`, and `fd` belongs to the open device.
        xioctl(|| unsafe { v4l2::ioctl(fd, vidioc::$request, arg) })
    }};
}

fn capture_buffer(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: all-zero is a valid `v4l2_buffer`.
        ..unsafe { mem::zeroed() }
    }
}

/// An open V4L2 capture device node.
pub struct V4l2Device {
    device: Device,
    fd: RawFd,
    path: PathBuf,
}

impl std::fmt::Debug for V4l2Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Device")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .finish()
    }
}

impl V4l2Device {
    /// Opens `path` read-write and non-blocking.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let open_failed = |source| CaptureError::OpenFailed {
            path: path.to_path_buf(),
            source,
        };
        let device = Device::with_path(path).map_err(open_failed)?;
        let fd = device.handle().fd();

        let flags = fcntl(fd, FcntlArg::F_GETFL)
            .map(OFlag::from_bits_truncate)
            .map_err(|errno| open_failed(io::Error::from(errno)))?;
        fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))
            .map_err(|errno| open_failed(io::Error::from(errno)))?;

        debug!(path = %path.display(), "capture device opened");
        Ok(Self {
            device,
            fd,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duplicates the descriptor so the event loop can poll it while the
    /// capture state machine owns the device.
    pub fn try_clone_fd(&self) -> io::Result<OwnedFd> {
        // SAFETY: `fd` stays open for as long as `self.device` lives.
        unsafe { BorrowedFd::borrow_raw(self.fd) }.try_clone_to_owned()
    }
}

impl CaptureBackend for V4l2Device {
    type Mapping = MmapMut;

    fn select_input(&mut self, line: u32) -> io::Result<()> {
        let mut input = line as c_int;
        debug!(input = line, path = %self.path.display(), "selecting V4L2 input");
        vidioc_call!(self.fd, VIDIOC_S_INPUT, &mut input)
    }

    fn reset_crop(&mut self) -> io::Result<()> {
        // SAFETY: all-zero is a valid `v4l2_cropcap`.
        let mut cropcap: v4l2_cropcap = unsafe { mem::zeroed() };
        cropcap.type_ = Type::VideoCapture as u32;
        vidioc_call!(self.fd, VIDIOC_CROPCAP, &mut cropcap)?;

        // SAFETY: all-zero is a valid `v4l2_crop`.
        let mut crop: v4l2_crop = unsafe { mem::zeroed() };
        crop.type_ = Type::VideoCapture as u32;
        crop.c = cropcap.defrect;
        vidioc_call!(self.fd, VIDIOC_S_CROP, &mut crop)
    }

    fn set_format(&mut self, settings: &CaptureSettings) -> io::Result<NegotiatedFormat> {
        let fourcc = FourCC::new(&settings.format.fourcc().to_bytes());
        let mut requested = Format::new(settings.width, settings.height, fourcc);
        requested.field_order = FieldOrder::Progressive;

        let actual = xioctl(|| self.device.set_format(&requested))?;
        Ok(NegotiatedFormat {
            width: actual.width,
            height: actual.height,
            fourcc: vid_core::FourCc::from_bytes(actual.fourcc.repr),
            bytes_per_line: actual.stride,
            size_image: actual.size,
            field: actual.field_order as u32,
        })
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut request = v4l2_requestbuffers {
            count,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: all-zero is a valid `v4l2_requestbuffers`.
            ..unsafe { mem::zeroed() }
        };
        vidioc_call!(self.fd, VIDIOC_REQBUFS, &mut request)?;
        Ok(request.count)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferDescriptor> {
        let mut buffer = capture_buffer(index);
        vidioc_call!(self.fd, VIDIOC_QUERYBUF, &mut buffer)?;
        Ok(BufferDescriptor {
            index,
            // SAFETY: `offset` is the active member for V4L2_MEMORY_MMAP.
            offset: unsafe { buffer.m.offset },
            length: buffer.length,
        })
    }

    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> io::Result<MmapMut> {
        // SAFETY: the offset/length pair was issued by the driver for this
        // descriptor; the mapping is dropped before the device is closed.
        unsafe {
            MmapOptions::new()
                .offset(u64::from(buffer.offset))
                .len(buffer.length as usize)
                .map_mut(self.fd)
        }
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buffer = capture_buffer(index);
        vidioc_call!(self.fd, VIDIOC_QBUF, &mut buffer)
    }

    fn dequeue_buffer(&mut self) -> Result<DequeuedBuffer, DequeueError> {
        let mut buffer = capture_buffer(NO_BUFFER);
        match vidioc_call!(self.fd, VIDIOC_DQBUF, &mut buffer) {
            Ok(()) => Ok(DequeuedBuffer {
                index: buffer.index,
                bytes_used: buffer.bytesused,
                corrupted: Flags::from(buffer.flags).contains(Flags::ERROR),
            }),
            Err(source) => Err(DequeueError {
                source,
                returned_index: (buffer.index != NO_BUFFER).then_some(buffer.index),
            }),
        }
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut kind = Type::VideoCapture as c_int;
        vidioc_call!(self.fd, VIDIOC_STREAMON, &mut kind)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut kind = Type::VideoCapture as c_int;
        vidioc_call!(self.fd, VIDIOC_STREAMOFF, &mut kind)
    }
}
