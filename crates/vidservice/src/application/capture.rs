//! Capture device: the V4L2 streaming state machine and its buffer pool.
//!
//! # How memory-mapped streaming works (for beginners)
//!
//! A V4L2 camera does not hand frames over with `read()`.  Instead the
//! application asks the driver for a small ring of kernel buffers, maps each
//! one into its own address space, and then passes buffer *ownership* back
//! and forth:
//!
//! ```text
//!             queue_buffer(i)               dequeue_buffer() -> i
//!  Application ──────────────► Driver fills ──────────────────► Application
//!      ▲                        buffer i                             │
//!      └────────────────────── FrameRef dropped ◄────────────────────┘
//! ```
//!
//! While the driver owns a buffer it may write into it at any time, so the
//! application must only read a buffer between dequeue and re-queue.  The
//! [`FrameRef`] guard enforces this: it borrows the device mutably, exposes
//! the frame bytes, and re-queues the buffer when it goes out of scope.
//!
//! # Lifecycle
//!
//! ```text
//! negotiate ─► Idle ─allocate_buffers─► BuffersAllocated ─start_streaming─► Streaming
//!               ▲                             │    ▲                            │
//!               └───────release_buffers───────┘    └───────stop_streaming───────┘
//! ```
//!
//! Buffers are unmapped in reverse order of acquisition when the pool is
//! dropped, and the stream is switched off if the device is dropped while
//! still streaming.

use std::io;
use std::ops::Deref;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, trace, warn};
use vid_core::{FourCc, PixelFormat};

/// Minimum number of driver buffers required for smooth streaming.
pub const MIN_CAPTURE_BUFFERS: u32 = 4;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors raised by [`CaptureDevice`].
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot open capture device {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Input selection or format negotiation was rejected.
    #[error("capture negotiation failed while trying to {stage}: {source}")]
    NegotiationFailed {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// The driver refused the buffer request outright (e.g. no mmap support).
    #[error("buffer request rejected: {0}")]
    RequestFailed(#[source] io::Error),

    /// The driver granted fewer buffers than the streaming minimum.
    #[error("insufficient buffer memory: requested {requested}, granted {granted}")]
    InsufficientBuffers { requested: u32, granted: u32 },

    #[error("buffer {index} could not be mapped: {source}")]
    MapFailed {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("buffer {index} could not be enqueued: {source}")]
    EnqueueFailed {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("stream-on rejected: {0}")]
    StreamOnFailed(#[source] io::Error),

    #[error("stream-off rejected: {0}")]
    StreamOffFailed(#[source] io::Error),

    /// A dequeue failed for a reason other than "no frame ready", or the
    /// driver returned a corrupted or unknown buffer.
    #[error("capture I/O fault: {0}")]
    IoFault(String),

    /// The buffer is already owned by the driver.
    #[error("buffer {index} is not owned by the application")]
    BufferNotOwned { index: u32 },

    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: StreamingState,
    },
}

// ── Backend port ──────────────────────────────────────────────────────────────

/// Requested capture configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Video input line on the capture device (the camera connector).
    pub input_line: u32,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Format actually configured by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    pub bytes_per_line: u32,
    pub size_image: u32,
    pub field: u32,
}

/// Location of one driver buffer inside the device's mmap space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub index: u32,
    pub offset: u32,
    pub length: u32,
}

/// A buffer handed back by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    pub bytes_used: u32,
    /// Set when the driver flagged the frame contents as unusable.
    pub corrupted: bool,
}

/// A failed dequeue.
///
/// Some drivers return a buffer together with an error; `returned_index`
/// carries that index so the buffer can be handed back to the driver.
#[derive(Debug, Error)]
#[error("dequeue failed: {source}")]
pub struct DequeueError {
    #[source]
    pub source: io::Error,
    pub returned_index: Option<u32>,
}

impl DequeueError {
    pub fn new(source: io::Error) -> Self {
        Self {
            source,
            returned_index: None,
        }
    }

    /// Dequeue on a non-blocking device with no completed frame.
    pub fn would_block() -> Self {
        Self::new(io::Error::from(io::ErrorKind::WouldBlock))
    }

    pub fn is_would_block(&self) -> bool {
        self.source.kind() == io::ErrorKind::WouldBlock
    }
}

/// Raw operations on a streaming capture device.
///
/// Implemented by the V4L2 ioctl backend and by the mock used in tests.
/// All calls are non-blocking; "no frame ready" is reported by
/// [`dequeue_buffer`](Self::dequeue_buffer) as [`io::ErrorKind::WouldBlock`].
pub trait CaptureBackend {
    /// A mapped buffer.  Dropping it unmaps the buffer.
    type Mapping: Deref<Target = [u8]>;

    fn select_input(&mut self, line: u32) -> io::Result<()>;

    /// Resets cropping to the driver default rectangle.
    fn reset_crop(&mut self) -> io::Result<()>;

    fn set_format(&mut self, settings: &CaptureSettings) -> io::Result<NegotiatedFormat>;

    /// Requests `count` buffers and returns how many the driver granted.
    /// A `count` of zero releases all buffers.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferDescriptor>;

    fn map_buffer(&mut self, buffer: &BufferDescriptor) -> io::Result<Self::Mapping>;

    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    fn dequeue_buffer(&mut self) -> Result<DequeuedBuffer, DequeueError>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;
}

// ── Buffer pool ───────────────────────────────────────────────────────────────

/// Streaming state of a [`CaptureDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    Idle,
    BuffersAllocated,
    Streaming,
}

/// Who may touch a buffer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwner {
    Application,
    Driver,
}

/// One driver buffer mapped into the process.
#[derive(Debug)]
pub struct MappedBuffer<M> {
    index: u32,
    mapping: M,
    owner: BufferOwner,
}

impl<M: Deref<Target = [u8]>> MappedBuffer<M> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn owner(&self) -> BufferOwner {
        self.owner
    }
}

/// The set of mapped buffers.  Unmaps in reverse acquisition order on drop.
#[derive(Debug)]
pub struct BufferPool<M> {
    buffers: Vec<MappedBuffer<M>>,
}

impl<M> BufferPool<M> {
    fn new() -> Self {
        Self {
            buffers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&MappedBuffer<M>> {
        self.buffers.get(index as usize)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut MappedBuffer<M>> {
        self.buffers.get_mut(index as usize)
    }

    fn push(&mut self, buffer: MappedBuffer<M>) {
        self.buffers.push(buffer);
    }

    fn clear(&mut self) {
        while self.buffers.pop().is_some() {}
    }
}

impl<M> Drop for BufferPool<M> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Counters reported on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_dequeued: u64,
    pub io_faults: u64,
    pub requeue_failures: u64,
}

// ── Capture device ────────────────────────────────────────────────────────────

/// A negotiated capture device plus its buffer pool.
pub struct CaptureDevice<B: CaptureBackend> {
    // Declared before `backend` so mappings are released before the device
    // handle is closed.
    pool: BufferPool<B::Mapping>,
    backend: B,
    format: NegotiatedFormat,
    state: StreamingState,
    stats: CaptureStats,
}

impl<B: CaptureBackend> CaptureDevice<B> {
    /// Selects the input line, resets cropping, and sets the pixel format.
    ///
    /// Crop reset failures are ignored: many capture drivers do not support
    /// cropping at all.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NegotiationFailed`] if the input line or the
    /// format is rejected, or if the driver substituted a different pixel
    /// format or resolution.
    pub fn negotiate(mut backend: B, settings: &CaptureSettings) -> Result<Self, CaptureError> {
        backend
            .select_input(settings.input_line)
            .map_err(|source| CaptureError::NegotiationFailed {
                stage: "select input",
                source,
            })?;

        if let Err(e) = backend.reset_crop() {
            debug!("crop reset not supported: {e}");
        }

        let format =
            backend
                .set_format(settings)
                .map_err(|source| CaptureError::NegotiationFailed {
                    stage: "set format",
                    source,
                })?;

        let requested = settings.format.fourcc();
        if format.fourcc != requested
            || format.width != settings.width
            || format.height != settings.height
        {
            return Err(CaptureError::NegotiationFailed {
                stage: "set format",
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "driver substituted {}x{} {} for requested {}x{} {}",
                        format.width,
                        format.height,
                        format.fourcc,
                        settings.width,
                        settings.height,
                        requested
                    ),
                ),
            });
        }

        info!(
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            field = format.field,
            size_image = format.size_image,
            "capture format negotiated"
        );

        Ok(Self {
            pool: BufferPool::new(),
            backend,
            format,
            state: StreamingState::Idle,
            stats: CaptureStats::default(),
        })
    }

    pub fn format(&self) -> NegotiatedFormat {
        self.format
    }

    pub fn state(&self) -> StreamingState {
        self.state
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn buffers(&self) -> &BufferPool<B::Mapping> {
        &self.pool
    }

    /// Requests at least `min_count` buffers (never fewer than
    /// [`MIN_CAPTURE_BUFFERS`]), maps every granted buffer, and returns the
    /// number of mapped buffers.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::InsufficientBuffers`] when the driver grants fewer
    ///   than requested.
    /// - [`CaptureError::MapFailed`] when any buffer cannot be queried or
    ///   mapped.  Buffers mapped before the failure are unmapped again.
    pub fn allocate_buffers(&mut self, min_count: u32) -> Result<usize, CaptureError> {
        self.expect_state(StreamingState::Idle, "allocate buffers")?;

        let requested = min_count.max(MIN_CAPTURE_BUFFERS);
        let granted = self
            .backend
            .request_buffers(requested)
            .map_err(CaptureError::RequestFailed)?;

        if granted < requested {
            self.release_driver_buffers();
            return Err(CaptureError::InsufficientBuffers {
                requested,
                granted,
            });
        }

        for index in 0..granted {
            match self.map_one(index) {
                Ok(buffer) => self.pool.push(buffer),
                Err(e) => {
                    self.pool.clear();
                    self.release_driver_buffers();
                    return Err(e);
                }
            }
        }

        self.state = StreamingState::BuffersAllocated;
        debug!(requested, granted, "capture buffers mapped");
        Ok(self.pool.len())
    }

    fn map_one(&mut self, index: u32) -> Result<MappedBuffer<B::Mapping>, CaptureError> {
        let map_err = |source| CaptureError::MapFailed { index, source };
        let descriptor = self.backend.query_buffer(index).map_err(map_err)?;
        let mapping = self.backend.map_buffer(&descriptor).map_err(map_err)?;
        trace!(index, offset = descriptor.offset, length = descriptor.length, "buffer mapped");
        Ok(MappedBuffer {
            index,
            mapping,
            owner: BufferOwner::Application,
        })
    }

    /// Enqueues every buffer and switches the stream on.
    ///
    /// # Errors
    ///
    /// [`CaptureError::EnqueueFailed`] or [`CaptureError::StreamOnFailed`].
    pub fn start_streaming(&mut self) -> Result<(), CaptureError> {
        self.expect_state(StreamingState::BuffersAllocated, "start streaming")?;

        for index in 0..self.pool.len() as u32 {
            self.requeue(index)?;
        }

        self.backend
            .stream_on()
            .map_err(CaptureError::StreamOnFailed)?;
        self.state = StreamingState::Streaming;
        info!(buffers = self.pool.len(), "capture streaming started");
        Ok(())
    }

    /// Takes the next completed frame, if any.
    ///
    /// Returns `Ok(None)` when no frame is ready.  On success the returned
    /// [`FrameRef`] owns the buffer until it is dropped or released.
    ///
    /// # Errors
    ///
    /// [`CaptureError::IoFault`] for any dequeue failure other than "no frame
    /// ready", and for corrupted or unknown buffers.  Any buffer the driver
    /// returned alongside the error has already been re-queued.
    pub fn pull_frame(&mut self) -> Result<Option<FrameRef<'_, B>>, CaptureError> {
        self.expect_state(StreamingState::Streaming, "pull a frame")?;

        let dequeued = match self.backend.dequeue_buffer() {
            Ok(buffer) => buffer,
            Err(e) if e.is_would_block() => return Ok(None),
            Err(e) => {
                self.stats.io_faults += 1;
                if let Some(index) = e.returned_index {
                    self.reclaim(index);
                }
                return Err(CaptureError::IoFault(format!("dequeue failed: {}", e.source)));
            }
        };

        let index = dequeued.index;
        let pool_len = self.pool.len();
        let Some(slot) = self.pool.get_mut(index) else {
            self.stats.io_faults += 1;
            return Err(CaptureError::IoFault(format!(
                "driver returned unknown buffer {index} (pool holds {pool_len})"
            )));
        };
        slot.owner = BufferOwner::Application;

        if dequeued.corrupted {
            self.stats.io_faults += 1;
            self.requeue_or_log(index);
            return Err(CaptureError::IoFault(format!(
                "buffer {index} flagged as corrupted"
            )));
        }

        self.stats.frames_dequeued += 1;
        trace!(index, bytes_used = dequeued.bytes_used, "frame dequeued");
        Ok(Some(FrameRef {
            device: self,
            index,
            bytes_used: dequeued.bytes_used,
            released: false,
        }))
    }

    /// Switches the stream off.  Returns all buffers to the application.
    ///
    /// # Errors
    ///
    /// [`CaptureError::StreamOffFailed`] if the driver rejects the request.
    pub fn stop_streaming(&mut self) -> Result<(), CaptureError> {
        self.expect_state(StreamingState::Streaming, "stop streaming")?;
        self.backend
            .stream_off()
            .map_err(CaptureError::StreamOffFailed)?;
        // Stream-off implicitly dequeues every buffer.
        for buffer in &mut self.pool.buffers {
            buffer.owner = BufferOwner::Application;
        }
        self.state = StreamingState::BuffersAllocated;
        info!(
            frames = self.stats.frames_dequeued,
            faults = self.stats.io_faults,
            "capture streaming stopped"
        );
        Ok(())
    }

    /// Unmaps every buffer and returns them to the driver.
    pub fn release_buffers(&mut self) -> Result<(), CaptureError> {
        self.expect_state(StreamingState::BuffersAllocated, "release buffers")?;
        self.pool.clear();
        self.release_driver_buffers();
        self.state = StreamingState::Idle;
        Ok(())
    }

    fn release_driver_buffers(&mut self) {
        if let Err(e) = self.backend.request_buffers(0) {
            debug!("driver buffer release failed: {e}");
        }
    }

    fn expect_state(
        &self,
        expected: StreamingState,
        operation: &'static str,
    ) -> Result<(), CaptureError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Hands buffer `index` back to the driver.
    fn requeue(&mut self, index: u32) -> Result<(), CaptureError> {
        let slot = self
            .pool
            .get_mut(index)
            .ok_or(CaptureError::BufferNotOwned { index })?;
        if slot.owner != BufferOwner::Application {
            return Err(CaptureError::BufferNotOwned { index });
        }
        self.backend
            .queue_buffer(index)
            .map_err(|source| CaptureError::EnqueueFailed { index, source })?;
        slot.owner = BufferOwner::Driver;
        Ok(())
    }

    fn requeue_or_log(&mut self, index: u32) {
        if let Err(e) = self.requeue(index) {
            self.stats.requeue_failures += 1;
            warn!("failed to return buffer to the driver: {e}");
        }
    }

    /// Takes back a buffer the driver returned with an error and re-queues it.
    fn reclaim(&mut self, index: u32) {
        if let Some(slot) = self.pool.get_mut(index) {
            slot.owner = BufferOwner::Application;
            self.requeue_or_log(index);
        }
    }
}

impl<B: CaptureBackend> Drop for CaptureDevice<B> {
    fn drop(&mut self) {
        if self.state == StreamingState::Streaming {
            if let Err(e) = self.backend.stream_off() {
                warn!("stream-off during teardown failed: {e}");
            }
        }
    }
}

// ── Frame guard ───────────────────────────────────────────────────────────────

/// A dequeued frame.  The buffer goes back to the driver when this is dropped.
pub struct FrameRef<'a, B: CaptureBackend> {
    device: &'a mut CaptureDevice<B>,
    index: u32,
    bytes_used: u32,
    released: bool,
}

impl<B: CaptureBackend> FrameRef<'_, B> {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Payload size reported by the driver.
    pub fn bytes_used(&self) -> u32 {
        self.bytes_used
    }

    /// The whole mapped buffer.
    pub fn data(&self) -> &[u8] {
        self.device
            .pool
            .get(self.index)
            .map(|buffer| &*buffer.mapping)
            .unwrap_or_default()
    }

    /// Re-queues the buffer now and reports the outcome.
    pub fn release(mut self) -> Result<(), CaptureError> {
        self.released = true;
        self.device.requeue(self.index)
    }
}

impl<B: CaptureBackend> Drop for FrameRef<'_, B> {
    fn drop(&mut self) {
        if !self.released {
            self.device.requeue_or_log(self.index);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
