//! ASCII PGM rendering of a frame

use crate::types::Frame;
use std::io::Write;

#[cfg(feature = "logging")]
use tracing::info;

/// Write `frame` as a plain (P2) PGM image
///
/// Samples are shifted down by the frame minimum so the image spans
/// `0..=max-min`. Each sample goes on its own line. A flat frame still
/// gets a maxval of 1, since PGM requires a positive maxval.
pub fn write_pgm<W: Write>(frame: &Frame, writer: &mut W) -> std::io::Result<()> {
    let (min, max) = frame.min_max().unwrap_or((0, 0));

    #[cfg(feature = "logging")]
    info!("Scaling samples: min = {}, max = {}", min, max);

    let maxval = (max - min).max(1);
    write!(
        writer,
        "P2\n{} {}\n{}\n",
        frame.geometry.cols, frame.geometry.rows, maxval
    )?;

    for &sample in &frame.samples {
        writeln!(writer, "{} ", sample - min)?;
    }
    writer.write_all(b"\n\n")?;

    Ok(())
}

/// Render `frame` into an in-memory PGM
pub fn to_pgm(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.samples.len() * 6 + 32);
    // Writing to a Vec cannot fail
    let _ = write_pgm(frame, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FrameGeometry;

    #[test]
    fn test_pgm_header_and_scaling() {
        let frame = Frame {
            geometry: FrameGeometry::new(2, 3),
            samples: vec![100, 101, 102, 103, 104, 110],
        };

        let text = String::from_utf8(to_pgm(&frame)).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("P2"));
        assert_eq!(lines.next(), Some("3 2"));
        assert_eq!(lines.next(), Some("10"));
        assert_eq!(lines.next(), Some("0 "));
        assert_eq!(lines.next(), Some("1 "));
        assert!(text.ends_with("10 \n\n\n"));
    }

    #[test]
    fn test_flat_frame_has_positive_maxval() {
        let frame = Frame::filled(FrameGeometry::new(1, 2), 7);

        let text = String::from_utf8(to_pgm(&frame)).unwrap();
        assert!(text.starts_with("P2\n2 1\n1\n0 \n0 \n"));
    }
}
