use anyhow::{Context, Result};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;
use vospi_core::constants::{DEFAULT_FRAME_INTERVAL, DEFAULT_SHM_NAME};
use vospi_core::{CaptureLoop, FrameGeometry, SharedMemorySink, SpiConfig, SpiTransport, StopFlag};

/// Settings for a capture run
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// SPI bus settings
    pub spi: SpiConfig,
    /// Shared memory region receiving frames
    pub shm_name: String,
    /// Pause after each published frame
    pub frame_interval: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            spi: SpiConfig::from_env(),
            shm_name: DEFAULT_SHM_NAME.to_string(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// Set by SIGINT/SIGTERM; the capture loop checks it before each transfer
static STOP: OnceLock<StopFlag> = OnceLock::new();

extern "C" fn signal_handler(_sig: libc::c_int) {
    if let Some(stop) = STOP.get() {
        stop.stop();
    }
}

fn install_signal_handlers() -> StopFlag {
    let stop = STOP.get_or_init(StopFlag::new).clone();
    // SAFETY: the handler only performs an atomic store.
    unsafe {
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
    stop
}

pub fn execute(options: &CaptureOptions) -> Result<()> {
    let geometry = FrameGeometry::LEPTON;

    let transport = SpiTransport::open(options.spi.clone())
        .with_context(|| format!("Failed to set up SPI bus {}", options.spi.device))?;

    let sink = SharedMemorySink::create(&options.shm_name, geometry).with_context(|| {
        format!(
            "Failed to set up shared memory region {}",
            options.shm_name
        )
    })?;

    info!(
        "Publishing frames to {} ({} bytes)",
        options.shm_name,
        geometry.frame_bytes()
    );

    let stop = install_signal_handlers();
    let mut capture = CaptureLoop::new(transport, sink).frame_interval(options.frame_interval);

    let stats = capture
        .run(&stop)
        .with_context(|| format!("Capture from {} aborted", options.spi.device))?;

    println!("\n=== Capture Summary ===");
    println!("Frames published:  {}", stats.frames_published);
    println!("Packets:           {}", stats.packets);
    println!("Discards:          {} ({:.2}%)", stats.discards, stats.discard_rate());
    println!("Out-of-range rows: {}", stats.out_of_range);
    println!("Incomplete frames: {}", stats.incomplete_frames);

    Ok(())
}
