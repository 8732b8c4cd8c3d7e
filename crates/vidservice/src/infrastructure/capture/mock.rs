//! Mock capture backend for unit and integration testing.
//!
//! # Why a mock backend?
//!
//! The real backend needs a V4L2 device node and a camera behind it.  The
//! `MockCaptureBackend` emulates the driver side of the buffer exchange in
//! memory: it keeps the driver's incoming queue, lets the test decide when a
//! queued buffer "completes", and records every call so assertions can check
//! the exact ioctl sequence.
//!
//! # Shared handle
//!
//! The backend is a cheap handle around `Arc<Mutex<..>>`.  Clone it before
//! moving it into a [`CaptureDevice`](crate::application::capture::CaptureDevice)
//! and keep the clone to drive and inspect the mock:
//!
//! ```ignore
//! let backend = MockCaptureBackend::new();
//! let mut device = CaptureDevice::negotiate(backend.clone(), &settings)?;
//! device.allocate_buffers(4)?;
//! device.start_streaming()?;
//!
//! backend.complete_next_frame();
//! let frame = device.pull_frame()?.expect("frame ready");
//! ```
//!
//! Each mapped buffer is filled with the byte `index + 1`, so tests can tell
//! which buffer a frame came from by looking at its contents.

use std::collections::VecDeque;
use std::io;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use vid_core::FourCc;

use crate::application::capture::{
    BufferDescriptor, CaptureBackend, CaptureSettings, DequeueError, DequeuedBuffer,
    NegotiatedFormat,
};

/// Buffer size used unless a test configures another one.
pub const DEFAULT_MOCK_BUFFER_LEN: usize = 64;

/// One recorded backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOp {
    SelectInput(u32),
    ResetCrop,
    SetFormat,
    RequestBuffers(u32),
    QueryBuffer(u32),
    Map(u32),
    Unmap(u32),
    Queue(u32),
    Dequeue(u32),
    StreamOn,
    StreamOff,
}

/// Failure injection and sizing knobs.
#[derive(Debug, Clone)]
pub struct MockCaptureConfig {
    /// Upper bound on the number of buffers granted.
    pub grant_limit: Option<u32>,
    /// Grant exactly this many buffers, even more than requested.
    pub grant_exact: Option<u32>,
    pub buffer_len: usize,
    pub fail_select_input: bool,
    pub fail_crop: bool,
    pub fail_format: bool,
    /// Report this FourCC instead of the requested one.
    pub substitute_fourcc: Option<FourCc>,
    pub fail_map_at: Option<u32>,
    pub fail_queue_at: Option<u32>,
    pub fail_stream_on: bool,
    pub fail_stream_off: bool,
}

impl Default for MockCaptureConfig {
    fn default() -> Self {
        Self {
            grant_limit: None,
            grant_exact: None,
            buffer_len: DEFAULT_MOCK_BUFFER_LEN,
            fail_select_input: false,
            fail_crop: false,
            fail_format: false,
            substitute_fourcc: None,
            fail_map_at: None,
            fail_queue_at: None,
            fail_stream_on: false,
            fail_stream_off: false,
        }
    }
}

type PendingDequeue = Result<DequeuedBuffer, (io::ErrorKind, Option<u32>)>;

#[derive(Debug, Default)]
struct MockCaptureState {
    config: MockCaptureConfig,
    ops: Vec<CaptureOp>,
    unmapped: Vec<u32>,
    granted: u32,
    /// Buffers currently owned by the "driver", in completion order.
    queued: VecDeque<u32>,
    completed: VecDeque<PendingDequeue>,
    streaming: bool,
}

/// In-memory stand-in for a V4L2 capture device.
#[derive(Debug, Clone, Default)]
pub struct MockCaptureBackend {
    state: Arc<Mutex<MockCaptureState>>,
}

impl MockCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjusts the mock's configuration.
    pub fn configure(&self, f: impl FnOnce(&mut MockCaptureConfig)) {
        f(&mut self.state.lock().unwrap().config);
    }

    pub fn buffer_len(&self) -> usize {
        self.state.lock().unwrap().config.buffer_len
    }

    /// Every call made so far, in order.
    pub fn ops(&self) -> Vec<CaptureOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Indices of unmapped buffers, in unmap order.
    pub fn unmapped(&self) -> Vec<u32> {
        self.state.lock().unwrap().unmapped.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    /// Completes the oldest queued buffer.  Returns its index, or `None` if
    /// the driver holds no buffers.
    pub fn complete_next_frame(&self) -> Option<u32> {
        self.complete_next(false)
    }

    /// Completes the oldest queued buffer with the error flag set.
    pub fn complete_next_corrupted_frame(&self) -> Option<u32> {
        self.complete_next(true)
    }

    fn complete_next(&self, corrupted: bool) -> Option<u32> {
        let mut state = self.state.lock().unwrap();
        let index = state.queued.pop_front()?;
        let bytes_used = state.config.buffer_len as u32;
        state.completed.push_back(Ok(DequeuedBuffer {
            index,
            bytes_used,
            corrupted,
        }));
        Some(index)
    }

    /// Makes the next dequeue fail with `kind`.  With `with_buffer`, the
    /// oldest queued buffer is returned alongside the error.
    pub fn fail_next_dequeue(&self, kind: io::ErrorKind, with_buffer: bool) {
        let mut state = self.state.lock().unwrap();
        let index = if with_buffer {
            state.queued.pop_front()
        } else {
            None
        };
        state.completed.push_back(Err((kind, index)));
    }

    /// Makes the next dequeue return a buffer index the device never mapped.
    pub fn return_unknown_buffer(&self, index: u32) {
        self.state.lock().unwrap().completed.push_back(Ok(DequeuedBuffer {
            index,
            bytes_used: 0,
            corrupted: false,
        }));
    }

    fn record(&self, op: CaptureOp) -> std::sync::MutexGuard<'_, MockCaptureState> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(op);
        state
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("mock {what} failure"))
}

impl CaptureBackend for MockCaptureBackend {
    type Mapping = MockMapping;

    fn select_input(&mut self, line: u32) -> io::Result<()> {
        let state = self.record(CaptureOp::SelectInput(line));
        if state.config.fail_select_input {
            return Err(injected("select input"));
        }
        Ok(())
    }

    fn reset_crop(&mut self) -> io::Result<()> {
        let state = self.record(CaptureOp::ResetCrop);
        if state.config.fail_crop {
            return Err(io::Error::from(io::ErrorKind::Unsupported));
        }
        Ok(())
    }

    fn set_format(&mut self, settings: &CaptureSettings) -> io::Result<NegotiatedFormat> {
        let state = self.record(CaptureOp::SetFormat);
        if state.config.fail_format {
            return Err(injected("set format"));
        }
        Ok(NegotiatedFormat {
            width: settings.width,
            height: settings.height,
            fourcc: state
                .config
                .substitute_fourcc
                .unwrap_or_else(|| settings.format.fourcc()),
            bytes_per_line: settings.width,
            size_image: settings.format.frame_len(settings.width, settings.height) as u32,
            field: 1,
        })
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut state = self.record(CaptureOp::RequestBuffers(count));
        let granted = match (count, state.config.grant_exact) {
            (0, _) => 0,
            (_, Some(exact)) => exact,
            (_, None) => state.config.grant_limit.map_or(count, |limit| count.min(limit)),
        };
        state.granted = granted;
        if count == 0 {
            state.queued.clear();
            state.completed.clear();
        }
        Ok(granted)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferDescriptor> {
        let state = self.record(CaptureOp::QueryBuffer(index));
        if index >= state.granted {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let length = state.config.buffer_len as u32;
        Ok(BufferDescriptor {
            index,
            offset: index * length,
            length,
        })
    }

    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> io::Result<MockMapping> {
        let state = self.record(CaptureOp::Map(buffer.index));
        if state.config.fail_map_at == Some(buffer.index) {
            return Err(injected("mmap"));
        }
        drop(state);
        Ok(MockMapping {
            index: buffer.index,
            data: vec![buffer.index as u8 + 1; buffer.length as usize],
            state: Arc::clone(&self.state),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut state = self.record(CaptureOp::Queue(index));
        if state.config.fail_queue_at == Some(index) {
            return Err(injected("queue"));
        }
        state.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> Result<DequeuedBuffer, DequeueError> {
        let mut state = self.state.lock().unwrap();
        match state.completed.pop_front() {
            None => Err(DequeueError::would_block()),
            Some(Ok(buffer)) => {
                state.ops.push(CaptureOp::Dequeue(buffer.index));
                Ok(buffer)
            }
            Some(Err((kind, returned_index))) => Err(DequeueError {
                source: io::Error::from(kind),
                returned_index,
            }),
        }
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut state = self.record(CaptureOp::StreamOn);
        if state.config.fail_stream_on {
            return Err(injected("stream on"));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut state = self.record(CaptureOp::StreamOff);
        if state.config.fail_stream_off {
            return Err(injected("stream off"));
        }
        state.streaming = false;
        state.queued.clear();
        state.completed.clear();
        Ok(())
    }
}

/// A "mapped" mock buffer.  Records its unmap on drop.
#[derive(Debug)]
pub struct MockMapping {
    index: u32,
    data: Vec<u8>,
    state: Arc<Mutex<MockCaptureState>>,
}

impl Deref for MockMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.ops.push(CaptureOp::Unmap(self.index));
            state.unmapped.push(self.index);
        }
    }
}
