//! vidservice daemon entry point.
//!
//! Opens every device, puts the outputs into their power-on state, and runs
//! the event loop until the Quit button or SIGINT/SIGTERM.
//!
//! # Startup order
//!
//! ```text
//! main()
//!  └─ load config (argv[1], optional)
//!  └─ init tracing
//!  └─ open input device, route switch, display, capture device
//!  └─ negotiate format, map buffers, stream on
//!  └─ EventLoop::startup()   -- route "0", HUD picture 0
//!  └─ EventLoop::run()
//! ```
//!
//! Any failure before the loop starts exits with a non-zero status.

#[cfg(target_os = "linux")]
use anyhow::Context;
#[cfg(target_os = "linux")]
use tracing::{error, info};
#[cfg(target_os = "linux")]
use vidservice::infrastructure::config::DaemonConfig;

#[cfg(target_os = "linux")]
fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;

    use tracing_subscriber::EnvFilter;

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = DaemonConfig::load(config_path.as_deref()).context("loading configuration")?;

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "vidservice starting");

    if let Err(e) = serve(&config) {
        error!("vidservice failed: {e:#}");
        return Err(e);
    }
    Ok(())
}

/// Opens the devices and runs the event loop to completion.
#[cfg(target_os = "linux")]
fn serve(config: &DaemonConfig) -> anyhow::Result<()> {
    use vid_core::{CommandHandler, DaemonState};

    use vidservice::application::capture::CaptureDevice;
    use vidservice::application::display::DisplaySurface;
    use vidservice::application::event_loop::{Collaborators, EventLoop};
    use vidservice::application::overlay::{HudPlane, OverlayCompositor};
    use vidservice::infrastructure::capture::v4l2::V4l2Device;
    use vidservice::infrastructure::display::fbdev::{FbDevice, FbdevSurfaceOpener};
    use vidservice::infrastructure::input::evdev::EvdevInput;
    use vidservice::infrastructure::overlay::bitmap::MappedAssetStore;
    use vidservice::infrastructure::readiness::PollWaiter;
    use vidservice::infrastructure::route::SysfsRouteSwitch;
    use vidservice::infrastructure::signals;

    let stop = signals::install_termination_handlers().context("installing signal handlers")?;

    // ── Devices ────────────────────────────────────────────────────────────────
    let input = EvdevInput::open(&config.input.device)?;
    let route_switch = SysfsRouteSwitch::open(&config.route.control)?;
    let display = DisplaySurface::open(FbDevice::open(&config.display.device)?)
        .with_context(|| format!("mapping display {}", config.display.device.display()))?;

    let camera = V4l2Device::open(&config.capture.device)?;
    let waiter = PollWaiter::new(
        camera.try_clone_fd().context("duplicating capture descriptor")?,
        input.try_clone_fd().context("duplicating input descriptor")?,
    );

    let mut capture = CaptureDevice::negotiate(camera, &config.capture_settings())?;
    capture.allocate_buffers(config.capture.min_buffers)?;
    capture.start_streaming()?;

    // ── HUD plane ──────────────────────────────────────────────────────────────
    let hud = HudPlane::new(
        OverlayCompositor::new(config.overlay_catalog(), MappedAssetStore::new()),
        FbdevSurfaceOpener::new(&config.hud.device),
    );

    // ── Event loop ─────────────────────────────────────────────────────────────
    let initial = DaemonState {
        active_source: config.initial_source,
        ..DaemonState::new()
    };
    let mut event_loop = EventLoop::new(
        Collaborators {
            capture,
            display,
            input: Box::new(input),
            waiter: Box::new(waiter),
            route_switch: Box::new(route_switch),
            overlay: Box::new(hud),
        },
        CommandHandler::new(config.hud.count),
        initial,
        config.tick(),
    );

    event_loop.startup();
    let stats = event_loop.run(stop)?;

    info!(
        frames = stats.frames_rendered,
        commands = stats.commands,
        "vidservice stopped"
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("vidservice needs Linux V4L2, fbdev, and evdev devices")
}
