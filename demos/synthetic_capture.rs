//! Synthetic capture example

use bytes::BytesMut;
use vospi_core::{
    encoder::{encode_discards, encode_frame},
    pgm, CaptureLoop, Frame, FrameGeometry, ImageSink, MemorySink, ReplayTransport,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("VoSPI Synthetic Capture Example\n");

    let geometry = FrameGeometry::LEPTON;

    // A warm spot in the middle of a cool background
    let (cy, cx) = (geometry.rows as f64 / 2.0, geometry.cols as f64 / 2.0);
    let samples = (0..geometry.rows)
        .flat_map(|row| {
            (0..geometry.cols).map(move |col| {
                let d = ((row as f64 - cy).powi(2) + (col as f64 - cx).powi(2)).sqrt();
                (8000.0 + 400.0 * (-d / 10.0).exp()) as u16
            })
        })
        .collect();
    let frame = Frame { geometry, samples };

    // What the bus would deliver: discards until the sensor syncs, then rows
    let mut recording = BytesMut::new();
    recording.extend_from_slice(&encode_discards(&geometry, 12));
    recording.extend_from_slice(&encode_frame(&frame));

    std::fs::write("synthetic.vospi", &recording)?;
    println!("Wrote {} bytes to synthetic.vospi", recording.len());

    let transport = ReplayTransport::new(recording.freeze());
    let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry));
    let report = capture.capture_frame()?;

    println!(
        "Captured frame: {} packets, {} discards, {:.0}% rows refreshed",
        report.packets,
        report.discards,
        report.completeness()
    );

    std::fs::write("synthetic.pgm", pgm::to_pgm(&capture.sink().snapshot()))?;
    println!("\nWrote synthetic.pgm");
    println!("Use 'vospi replay --input synthetic.vospi' to replay the recording");

    Ok(())
}
