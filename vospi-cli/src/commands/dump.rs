use anyhow::{Context, Result};
use std::fs;
use tracing::info;
use vospi_core::{pgm, Frame, FrameGeometry, ImageSink, SharedMemorySink};

/// Where the frame to dump comes from
#[derive(Debug, Clone)]
pub enum DumpSource<'a> {
    /// A live shared memory region
    SharedMemory(&'a str),
    /// A file holding a raw copy of the sink
    Snapshot(&'a str),
}

pub fn execute(source: DumpSource<'_>, output: &str) -> Result<()> {
    let geometry = FrameGeometry::LEPTON;

    let frame = match source {
        DumpSource::SharedMemory(name) => {
            info!("Reading frame from shared memory region {}", name);
            let sink = SharedMemorySink::open_existing(name, geometry)
                .with_context(|| format!("Failed to open shared memory region {}", name))?;
            sink.snapshot()
        }
        DumpSource::Snapshot(path) => {
            info!("Reading frame from snapshot {}", path);
            let data = fs::read(path)
                .with_context(|| format!("Failed to read snapshot file: {}", path))?;
            Frame::from_bytes(geometry, &data)
                .with_context(|| format!("Invalid snapshot file: {}", path))?
        }
    };

    let (min, max) = frame.min_max().unwrap_or((0, 0));
    println!("maxval = {}", max);
    println!("minval = {}", min);

    fs::write(output, pgm::to_pgm(&frame))
        .with_context(|| format!("Failed to write output file: {}", output))?;

    info!("Frame written to: {}", output);

    Ok(())
}
