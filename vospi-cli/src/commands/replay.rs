use crate::ReportFormat;
use anyhow::{Context, Result};
use bytes::Bytes;
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::{info, warn};
use vospi_core::{
    pgm, CaptureError, CaptureLoop, CaptureStats, CycleReport, FrameGeometry, ImageSink,
    MemorySink, ReplayTransport,
};

/// Everything a replay produced
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Totals across the recording
    pub stats: CaptureStats,
    /// One entry per completed frame
    pub frames: Vec<CycleReport>,
    /// Packets read before the recording ran out
    pub packets_read: u64,
}

/// Feed a recorded packet stream through the capture pipeline
///
/// Frames are assembled into an in-memory sink. When `pgm_output` is given,
/// the sink contents after the last completed frame are written as PGM.
pub fn execute(
    input: &str,
    pgm_output: Option<&str>,
    stats_output: Option<&str>,
    format: ReportFormat,
) -> Result<()> {
    info!("Replaying recording: {}", input);

    let data = fs::read(input).with_context(|| format!("Failed to read input file: {}", input))?;
    info!("File size: {} bytes", data.len());

    let geometry = FrameGeometry::LEPTON;
    let transport = ReplayTransport::new(Bytes::from(data));
    let mut capture =
        CaptureLoop::new(transport, MemorySink::new(geometry)).frame_interval(Duration::ZERO);

    let mut frames = Vec::new();
    let packets_read = loop {
        match capture.capture_frame() {
            Ok(report) => frames.push(report),
            Err(CaptureError::ReplayExhausted { packets }) => break packets,
            Err(e) => return Err(e).context("Replay failed"),
        }
    };

    let report = ReplayReport {
        stats: capture.stats().clone(),
        frames,
        packets_read,
    };

    match format {
        ReportFormat::Text => print_summary(&report),
        ReportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize replay report")?
        ),
    }

    if let Some(path) = stats_output {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize replay report")?;
        fs::write(path, json).with_context(|| format!("Failed to write stats file: {}", path))?;
        info!("Replay statistics written to: {}", path);
    }

    if let Some(path) = pgm_output {
        if report.frames.is_empty() {
            warn!("No complete frame in recording, not writing {}", path);
        } else {
            fs::write(path, pgm::to_pgm(&capture.sink().snapshot()))
                .with_context(|| format!("Failed to write output file: {}", path))?;
            info!("Last frame written to: {}", path);
        }
    }

    Ok(())
}

fn print_summary(report: &ReplayReport) {
    let stats = &report.stats;

    println!("\n=== Replay Results ===");
    println!("Packets read:      {}", report.packets_read);
    println!("Frames completed:  {}", stats.frames_published);
    println!("Discards:          {} ({:.2}%)", stats.discards, stats.discard_rate());
    println!("Out-of-range rows: {}", stats.out_of_range);

    if stats.incomplete_frames > 0 {
        println!(
            "Incomplete frames: {}",
            stats.incomplete_frames.to_string().yellow()
        );
    } else {
        println!("Incomplete frames: {}", stats.incomplete_frames);
    }

    for (i, frame) in report.frames.iter().enumerate() {
        if !frame.is_complete() {
            println!(
                "  frame {}: {:.1}% rows refreshed, missing {:?}",
                i + 1,
                frame.completeness(),
                frame.missing_rows
            );
        }
    }

    println!();
    if report.frames.is_empty() {
        println!("{} No complete frames found", "✗".red());
    } else if stats.incomplete_frames == 0 {
        println!("{} Every frame refreshed all rows", "✓".green());
    } else {
        println!(
            "{} Some frames were published with stale rows",
            "!".yellow()
        );
    }
}
