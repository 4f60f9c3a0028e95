use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vospi_cli::commands::{self, capture::CaptureOptions, dump::DumpSource};
use vospi_cli::ReportFormat;
use vospi_core::constants::{
    DEFAULT_BITS_PER_WORD, DEFAULT_SHM_NAME, DEFAULT_SPEED_HZ, DEFAULT_SPI_DEVICE,
    DEFAULT_SPI_MODE, SPI_DEVICE_ENV,
};
use vospi_core::SpiConfig;

#[derive(Parser)]
#[command(name = "vospi")]
#[command(about = "VoSPI - Thermal frame capture into shared memory", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture frames from the sensor into shared memory
    Capture {
        /// SPI device
        #[arg(short, long, env = SPI_DEVICE_ENV, default_value = DEFAULT_SPI_DEVICE)]
        device: String,

        /// SPI clock in Hz
        #[arg(long, default_value_t = DEFAULT_SPEED_HZ)]
        speed_hz: u32,

        /// SPI mode
        #[arg(long, default_value_t = DEFAULT_SPI_MODE)]
        mode: u8,

        /// Shared memory region name
        #[arg(long, default_value = DEFAULT_SHM_NAME)]
        shm_name: String,

        /// Pause after each frame in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },

    /// Render the current frame as a PGM image
    Dump {
        /// Shared memory region name
        #[arg(long, default_value = DEFAULT_SHM_NAME)]
        shm_name: String,

        /// Read a raw sink snapshot file instead of shared memory
        #[arg(long)]
        snapshot: Option<String>,

        /// Output PGM file
        #[arg(short, long, default_value = "image.pgm")]
        output: String,
    },

    /// Replay a recorded packet stream through the pipeline
    Replay {
        /// Recorded packets
        #[arg(short, long)]
        input: String,

        /// Write the last frame as PGM
        #[arg(long)]
        pgm: Option<String>,

        /// Write statistics as JSON
        #[arg(long)]
        stats: Option<String>,

        /// Report format on stdout
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Logs go to stderr; stdout carries command output only
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Execute command
    match cli.command {
        Commands::Capture {
            device,
            speed_hz,
            mode,
            shm_name,
            interval_ms,
        } => {
            let options = CaptureOptions {
                spi: SpiConfig {
                    device,
                    mode,
                    bits_per_word: DEFAULT_BITS_PER_WORD,
                    speed_hz,
                    delay_usecs: 0,
                },
                shm_name,
                frame_interval: Duration::from_millis(interval_ms),
            };
            commands::capture::execute(&options)
        }

        Commands::Dump {
            shm_name,
            snapshot,
            output,
        } => {
            let source = match snapshot.as_deref() {
                Some(path) => DumpSource::Snapshot(path),
                None => DumpSource::SharedMemory(&shm_name),
            };
            commands::dump::execute(source, &output)
        }

        Commands::Replay {
            input,
            pgm,
            stats,
            format,
        } => commands::replay::execute(&input, pgm.as_deref(), stats.as_deref(), format),
    }
}
