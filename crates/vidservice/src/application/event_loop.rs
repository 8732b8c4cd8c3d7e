//! EventLoop: the daemon's single-threaded scheduler.
//!
//! # What happens on every tick (for beginners)
//!
//! The loop blocks in one readiness wait over two file descriptors, the
//! capture device and the input device, with a timeout so that a shutdown
//! request from a signal handler is noticed even when nothing happens.
//!
//! ```text
//!  wait(capture, input, timeout)
//!     │
//!     ├─ capture ready ─► pull frame ─► render (External) or drop (Internal)
//!     │                                  └─► buffer goes back to the driver
//!     │
//!     └─ input ready ──► read one event ─► CommandHandler::dispatch
//!                                            └─► run effects (route, overlay)
//! ```
//!
//! Capture is always serviced before input within a tick, so a frame that is
//! already complete is rendered even if the same tick carries a Quit press.
//!
//! Nothing in here is fatal except a failing readiness wait.  Frame faults,
//! short input reads, route write errors, and overlay errors are logged and
//! the loop keeps going.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, trace, warn};
use vid_core::{Command, CommandHandler, DaemonState, Effect, OutputRoute};

use crate::application::capture::{CaptureBackend, CaptureDevice, StreamingState};
use crate::application::display::{DisplayBackend, DisplayError, DisplaySurface};
use crate::application::input::{InputError, InputSource};
use crate::application::overlay::OverlayApplier;
use crate::application::route::OutputRouteSwitch;

// ── Readiness port ────────────────────────────────────────────────────────────

/// Which descriptors became readable during a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub capture: bool,
    pub input: bool,
}

impl Readiness {
    pub fn is_timeout(&self) -> bool {
        !self.capture && !self.input
    }
}

/// Blocks until the capture or input descriptor is ready, or the timeout
/// elapses.  An interrupted wait reports as a timeout.
pub trait ReadinessWaiter {
    fn wait(&mut self, timeout: Duration) -> io::Result<Readiness>;
}

// ── Errors, outcomes, and counters ────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),
}

/// What the capture half of a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was copied to the display.
    Rendered { bytes: usize },
    /// A frame was dequeued and returned unrendered (internal source).
    Drained,
    /// The device reported readiness but had no completed frame.
    Empty,
    /// The dequeue failed.
    Fault,
    /// The frame could not be written to the display.
    RenderFailed,
}

/// What the input half of a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Command(Command),
    /// An event was read but did not map to a command.
    Ignored,
    /// Nothing was pending.
    Idle,
    ShortRead,
    Failed,
}

/// Summary of one [`EventLoop::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub readiness: Readiness,
    pub frame: Option<FrameOutcome>,
    pub input: Option<InputOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub timeouts: u64,
    pub frames_rendered: u64,
    pub frames_drained: u64,
    pub render_failures: u64,
    pub capture_faults: u64,
    pub input_events: u64,
    pub short_reads: u64,
    pub commands: u64,
}

// ── EventLoop ─────────────────────────────────────────────────────────────────

/// Everything the loop drives, injected by the caller.
pub struct Collaborators<C: CaptureBackend, D: DisplayBackend> {
    pub capture: CaptureDevice<C>,
    pub display: DisplaySurface<D>,
    pub input: Box<dyn InputSource>,
    pub waiter: Box<dyn ReadinessWaiter>,
    pub route_switch: Box<dyn OutputRouteSwitch>,
    pub overlay: Box<dyn OverlayApplier>,
}

pub struct EventLoop<C: CaptureBackend, D: DisplayBackend> {
    capture: CaptureDevice<C>,
    display: DisplaySurface<D>,
    input: Box<dyn InputSource>,
    waiter: Box<dyn ReadinessWaiter>,
    route_switch: Box<dyn OutputRouteSwitch>,
    overlay: Box<dyn OverlayApplier>,
    handler: CommandHandler,
    state: DaemonState,
    tick: Duration,
    stats: LoopStats,
}

impl<C: CaptureBackend, D: DisplayBackend> EventLoop<C, D> {
    pub fn new(
        parts: Collaborators<C, D>,
        handler: CommandHandler,
        initial: DaemonState,
        tick: Duration,
    ) -> Self {
        Self {
            capture: parts.capture,
            display: parts.display,
            input: parts.input,
            waiter: parts.waiter,
            route_switch: parts.route_switch,
            overlay: parts.overlay,
            handler,
            state: initial,
            tick,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn capture(&self) -> &CaptureDevice<C> {
        &self.capture
    }

    pub fn display(&self) -> &DisplaySurface<D> {
        &self.display
    }

    /// Puts the outputs into their power-on state: the primary route and the
    /// current HUD picture.
    pub fn startup(&mut self) {
        self.execute(Effect::SelectRoute(OutputRoute::Primary));
        self.execute(Effect::ApplyOverlay(self.state.overlay_index));
    }

    /// Runs until Quit is pressed or `stop` is raised, then stops streaming.
    ///
    /// # Errors
    ///
    /// [`LoopError::Wait`] if the readiness wait fails.  Streaming is stopped
    /// in that case too.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<LoopStats, LoopError> {
        info!(tick_ms = self.tick.as_millis() as u64, "event loop started");

        let result = loop {
            if self.state.shutdown {
                info!("quit requested");
                break Ok(());
            }
            if stop.load(Ordering::SeqCst) {
                info!("termination signal received");
                break Ok(());
            }
            if let Err(e) = self.tick() {
                break Err(e);
            }
        };

        self.shutdown();
        result.map(|()| self.stats)
    }

    /// Performs one wait and services whatever became ready.
    pub fn tick(&mut self) -> Result<TickReport, LoopError> {
        let readiness = self.waiter.wait(self.tick).map_err(LoopError::Wait)?;
        self.stats.ticks += 1;

        let mut report = TickReport {
            readiness,
            frame: None,
            input: None,
        };

        if readiness.is_timeout() {
            self.stats.timeouts += 1;
            trace!("wait timed out");
            return Ok(report);
        }
        if readiness.capture {
            report.frame = Some(self.service_capture());
        }
        if readiness.input {
            report.input = Some(self.service_input());
        }
        Ok(report)
    }

    /// Stops streaming if it is still on and logs the session counters.
    pub fn shutdown(&mut self) {
        if self.capture.state() == StreamingState::Streaming {
            if let Err(e) = self.capture.stop_streaming() {
                warn!("failed to stop capture: {e}");
            }
        }
        let capture = self.capture.stats();
        info!(
            ticks = self.stats.ticks,
            rendered = self.stats.frames_rendered,
            drained = self.stats.frames_drained,
            faults = capture.io_faults,
            commands = self.stats.commands,
            "event loop stopped"
        );
    }

    fn service_capture(&mut self) -> FrameOutcome {
        let frame = match self.capture.pull_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return FrameOutcome::Empty,
            Err(e) => {
                self.stats.capture_faults += 1;
                warn!("frame dequeue failed: {e}");
                return FrameOutcome::Fault;
            }
        };

        if !self.state.active_source.renders_capture() {
            drop(frame);
            self.stats.frames_drained += 1;
            return FrameOutcome::Drained;
        }

        let outcome = match composite(&mut self.display, frame.data()) {
            Ok(bytes) => {
                self.stats.frames_rendered += 1;
                FrameOutcome::Rendered { bytes }
            }
            Err(e) => {
                self.stats.render_failures += 1;
                warn!(index = frame.index(), "frame not rendered: {e}");
                FrameOutcome::RenderFailed
            }
        };

        if let Err(e) = frame.release() {
            warn!("failed to return buffer to the driver: {e}");
        }
        outcome
    }

    fn service_input(&mut self) -> InputOutcome {
        let record = match self.input.read_event() {
            Ok(Some(record)) => record,
            Ok(None) => return InputOutcome::Idle,
            Err(InputError::ShortRead { got, expected }) => {
                self.stats.short_reads += 1;
                warn!(got, expected, "short input read, event discarded");
                return InputOutcome::ShortRead;
            }
            Err(e) => {
                warn!("input read failed: {e}");
                return InputOutcome::Failed;
            }
        };

        self.stats.input_events += 1;
        debug!(
            kind = record.kind,
            code = record.code,
            value = record.value,
            "input event"
        );
        if !record.is_key() {
            return InputOutcome::Ignored;
        }

        let dispatch = self.handler.dispatch(self.state, record.code, record.value);
        self.state = dispatch.state;
        for effect in dispatch.effects {
            self.execute(effect);
        }

        match dispatch.command {
            Some(command) => {
                self.stats.commands += 1;
                info!(?command, source = ?self.state.active_source, "command executed");
                InputOutcome::Command(command)
            }
            None => InputOutcome::Ignored,
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::SelectRoute(route) => {
                if let Err(e) = self.route_switch.select(route) {
                    warn!("{e}");
                }
            }
            Effect::ApplyOverlay(index) => {
                if let Err(e) = self.overlay.apply_overlay(index) {
                    warn!(index, "HUD overlay not applied: {e}");
                }
            }
        }
    }
}

/// Copies one frame to the visible part of the display.
fn composite<D: DisplayBackend>(
    display: &mut DisplaySurface<D>,
    frame: &[u8],
) -> Result<usize, DisplayError> {
    let geometry = display.refresh_geometry()?;
    display.write_region(geometry.visible_offset(), frame)?;
    trace!(bytes = frame.len(), offset = geometry.visible_offset(), "frame rendered");
    Ok(frame.len())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capture::CaptureSettings;
    use crate::application::input::MockInputSource;
    use crate::application::route::{MockOutputRouteSwitch, RouteError};
    use crate::infrastructure::capture::mock::{CaptureOp, MockCaptureBackend};
    use crate::infrastructure::display::mock::MockDisplayBackend;
    use crate::infrastructure::input::mock::ScriptedInput;
    use crate::infrastructure::overlay::mock::RecordingOverlay;
    use crate::infrastructure::readiness::mock::ScriptedWaiter;
    use crate::infrastructure::route::mock::RecordingRouteSwitch;
    use mockall::predicate::eq;
    use vid_core::keymap::{EV_SYN, KEY_C, KEY_F2, KEY_F3, KEY_F4};
    use vid_core::{ActiveSource, InputEventRecord, PixelFormat};

    const BOTH: Readiness = Readiness {
        capture: true,
        input: true,
    };
    const CAPTURE: Readiness = Readiness {
        capture: true,
        input: false,
    };
    const INPUT: Readiness = Readiness {
        capture: false,
        input: true,
    };

    struct Fixture {
        capture: MockCaptureBackend,
        display: MockDisplayBackend,
        input: ScriptedInput,
        waiter: ScriptedWaiter,
        route: RecordingRouteSwitch,
        overlay: RecordingOverlay,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                capture: MockCaptureBackend::new(),
                display: MockDisplayBackend::new(8, 4, 8, 16),
                input: ScriptedInput::new(),
                waiter: ScriptedWaiter::new(),
                route: RecordingRouteSwitch::new(),
                overlay: RecordingOverlay::new(),
            }
        }

        fn capture_device(&self) -> CaptureDevice<MockCaptureBackend> {
            let settings = CaptureSettings {
                input_line: 1,
                format: PixelFormat::Nv12,
                width: 640,
                height: 480,
            };
            let mut device = CaptureDevice::negotiate(self.capture.clone(), &settings).unwrap();
            device.allocate_buffers(4).unwrap();
            device.start_streaming().unwrap();
            device
        }

        fn build(&self) -> EventLoop<MockCaptureBackend, MockDisplayBackend> {
            self.build_with(
                Box::new(self.input.clone()),
                Box::new(self.route.clone()),
            )
        }

        fn build_with(
            &self,
            input: Box<dyn InputSource>,
            route_switch: Box<dyn OutputRouteSwitch>,
        ) -> EventLoop<MockCaptureBackend, MockDisplayBackend> {
            let parts = Collaborators {
                capture: self.capture_device(),
                display: DisplaySurface::open(self.display.clone()).unwrap(),
                input,
                waiter: Box::new(self.waiter.clone()),
                route_switch,
                overlay: Box::new(self.overlay.clone()),
            };
            EventLoop::new(
                parts,
                CommandHandler::new(4),
                DaemonState::new(),
                Duration::from_millis(2000),
            )
        }

        fn dequeues(&self) -> usize {
            self.capture
                .ops()
                .iter()
                .filter(|op| matches!(op, CaptureOp::Dequeue(_)))
                .count()
        }
    }

    #[test]
    fn test_startup_selects_primary_route_and_first_overlay() {
        // Arrange
        let fx = Fixture::new();
        let mut event_loop = fx.build();

        // Act
        event_loop.startup();

        // Assert
        assert_eq!(fx.route.written(), "0");
        assert_eq!(fx.overlay.applied(), vec![0]);
    }

    #[test]
    fn test_ready_frame_is_rendered_and_requeued() {
        // Arrange
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.capture.complete_next_frame();
        fx.waiter.push(CAPTURE);

        // Act
        let report = event_loop.tick().unwrap();

        // Assert
        assert_eq!(report.frame, Some(FrameOutcome::Rendered { bytes: 64 }));
        assert!(event_loop.display().region()[..64].iter().all(|b| *b == 1));
        assert_eq!(fx.capture.ops().last(), Some(&CaptureOp::Queue(0)));
    }

    #[test]
    fn test_frame_lands_at_visible_offset() {
        let fx = Fixture::new();
        fx.display.configure(|s| s.variable.yoffset = 4);
        let mut event_loop = fx.build();
        fx.capture.complete_next_frame();
        fx.waiter.push(CAPTURE);

        event_loop.tick().unwrap();

        let region = event_loop.display().region();
        assert!(region[..64].iter().all(|b| *b == 0));
        assert!(region[64..128].iter().all(|b| *b == 1));
    }

    #[test]
    fn test_internal_source_drains_frames_without_rendering() {
        // Arrange
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.input.press(KEY_F3);
        fx.waiter.push(INPUT);
        event_loop.tick().unwrap();
        fx.capture.complete_next_frame();
        fx.waiter.push(CAPTURE);

        // Act
        let report = event_loop.tick().unwrap();

        // Assert
        assert_eq!(event_loop.state().active_source, ActiveSource::Internal);
        assert_eq!(report.frame, Some(FrameOutcome::Drained));
        assert!(event_loop.display().region().iter().all(|b| *b == 0));
        assert_eq!(fx.capture.ops().last(), Some(&CaptureOp::Queue(0)));
    }

    #[test]
    fn test_oversized_frame_is_skipped_and_requeued() {
        let fx = Fixture::new();
        fx.capture.configure(|s| s.buffer_len = 1024);
        let mut event_loop = fx.build();
        fx.capture.complete_next_frame();
        fx.waiter.push(CAPTURE);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.frame, Some(FrameOutcome::RenderFailed));
        assert_eq!(fx.capture.ops().last(), Some(&CaptureOp::Queue(0)));
        assert_eq!(event_loop.stats().render_failures, 1);
    }

    #[test]
    fn test_readiness_without_frame_is_empty() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.waiter.push(CAPTURE);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.frame, Some(FrameOutcome::Empty));
        assert!(event_loop.display().region().iter().all(|b| *b == 0));
        assert!(fx.display.memory().iter().all(|b| *b == 0));
        assert_eq!(event_loop.stats().frames_rendered, 0);
    }

    #[test]
    fn test_capture_fault_does_not_stop_the_loop() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.capture.fail_next_dequeue(io::ErrorKind::Other, false);
        fx.waiter.push(CAPTURE);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.frame, Some(FrameOutcome::Fault));
        assert_eq!(event_loop.stats().capture_faults, 1);
    }

    #[test]
    fn test_cycle_overlay_applies_next_picture() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.input.press(KEY_F4);
        fx.waiter.push(INPUT);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.input, Some(InputOutcome::Command(Command::CycleOverlay)));
        assert_eq!(event_loop.state().overlay_index, 1);
        assert_eq!(fx.overlay.applied(), vec![1]);
    }

    #[test]
    fn test_overlay_failure_keeps_new_index() {
        let fx = Fixture::new();
        fx.overlay.set_fail(true);
        let mut event_loop = fx.build();
        fx.input.press(KEY_F4);
        fx.waiter.push(INPUT);

        event_loop.tick().unwrap();

        assert_eq!(event_loop.state().overlay_index, 1);
    }

    #[test]
    fn test_source_b_writes_route_one() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.input.press(KEY_F2);
        fx.waiter.push(INPUT);

        event_loop.tick().unwrap();

        assert_eq!(fx.route.written(), "1");
        assert_eq!(event_loop.state().active_source, ActiveSource::External);
    }

    #[test]
    fn test_route_failure_is_logged_and_state_still_changes() {
        // Arrange
        let fx = Fixture::new();
        let mut route = MockOutputRouteSwitch::new();
        route
            .expect_select()
            .with(eq(OutputRoute::Secondary))
            .times(1)
            .returning(|route| {
                Err(RouteError::WriteFailed {
                    route,
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                })
            });
        let mut event_loop = fx.build_with(Box::new(fx.input.clone()), Box::new(route));
        fx.input.press(KEY_F3);
        fx.waiter.push(INPUT);

        // Act
        let report = event_loop.tick().unwrap();

        // Assert
        assert_eq!(report.input, Some(InputOutcome::Command(Command::SelectSourceC)));
        assert_eq!(event_loop.state().active_source, ActiveSource::Internal);
    }

    #[test]
    fn test_short_read_is_discarded() {
        // Arrange
        let fx = Fixture::new();
        let mut input = MockInputSource::new();
        input.expect_read_event().times(1).returning(|| {
            Err(InputError::ShortRead {
                got: 3,
                expected: vid_core::INPUT_EVENT_SIZE,
            })
        });
        let mut event_loop = fx.build_with(Box::new(input), Box::new(fx.route.clone()));
        fx.waiter.push(INPUT);

        // Act
        let report = event_loop.tick().unwrap();

        // Assert
        assert_eq!(report.input, Some(InputOutcome::ShortRead));
        assert_eq!(event_loop.state(), DaemonState::new());
        assert_eq!(event_loop.stats().short_reads, 1);
    }

    #[test]
    fn test_non_key_events_are_ignored() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.input.push_event(InputEventRecord {
            kind: EV_SYN,
            code: KEY_C,
            value: 1,
            ..Default::default()
        });
        fx.waiter.push(INPUT);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.input, Some(InputOutcome::Ignored));
        assert!(!event_loop.state().shutdown);
    }

    #[test]
    fn test_key_release_is_ignored() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.input.push_event(InputEventRecord::key(KEY_F4, 0));
        fx.waiter.push(INPUT);

        let report = event_loop.tick().unwrap();

        assert_eq!(report.input, Some(InputOutcome::Ignored));
        assert!(fx.overlay.applied().is_empty());
    }

    #[test]
    fn test_timeout_tick_counts_and_does_nothing() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();

        let report = event_loop.tick().unwrap();

        assert!(report.readiness.is_timeout());
        assert_eq!(report.frame, None);
        assert_eq!(fx.input.reads(), 0);
        assert_eq!(event_loop.stats().timeouts, 1);
        assert_eq!(fx.waiter.timeouts(), vec![Duration::from_millis(2000)]);
    }

    #[test]
    fn test_quit_renders_pending_frame_then_stops() {
        // Arrange
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.capture.complete_next_frame();
        fx.input.press(KEY_C);
        fx.waiter.push(BOTH);
        fx.capture.complete_next_frame();
        fx.waiter.push(CAPTURE);
        let stop = AtomicBool::new(false);

        // Act
        let stats = event_loop.run(&stop).unwrap();

        // Assert
        assert_eq!(stats.frames_rendered, 1);
        assert_eq!(stats.ticks, 1);
        assert_eq!(fx.dequeues(), 1);
        assert!(!fx.capture.is_streaming());
        assert_eq!(event_loop.capture().state(), StreamingState::BuffersAllocated);
    }

    #[test]
    fn test_external_stop_flag_ends_run_before_waiting() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        let stop = AtomicBool::new(true);

        let stats = event_loop.run(&stop).unwrap();

        assert_eq!(stats.ticks, 0);
        assert!(!fx.capture.is_streaming());
    }

    #[test]
    fn test_wait_failure_is_fatal_and_stops_streaming() {
        let fx = Fixture::new();
        let mut event_loop = fx.build();
        fx.waiter.push_error(io::ErrorKind::InvalidInput);
        let stop = AtomicBool::new(false);

        let result = event_loop.run(&stop);

        assert!(matches!(result, Err(LoopError::Wait(_))));
        assert!(!fx.capture.is_streaming());
    }
}
