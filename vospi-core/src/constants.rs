//! Constants and geometry for the VoSPI packet format

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes of packet header preceding the payload (ID + CRC fields)
pub const PACKET_HEADER_SIZE: usize = 4;

/// Mask selecting the validity field from the first header byte
pub const VALIDITY_MASK: u8 = 0x0F;

/// Validity field value marking a discard packet
pub const DISCARD_MARKER: u8 = 0x0F;

/// Size in bytes of one pixel sample
pub const SAMPLE_SIZE: usize = 2;

/// Rows of the reference sensor
pub const LEPTON_ROWS: usize = 60;

/// Columns of the reference sensor
pub const LEPTON_COLS: usize = 80;

/// Packet size of the reference sensor (4 byte header + 80 samples)
pub const LEPTON_PACKET_SIZE: usize = PACKET_HEADER_SIZE + LEPTON_COLS * SAMPLE_SIZE;

/// SPI device used when `SPIDEV` is not set
pub const DEFAULT_SPI_DEVICE: &str = "/dev/spidev1.0";

/// Environment variable naming the SPI device
pub const SPI_DEVICE_ENV: &str = "SPIDEV";

/// Default SPI clock
pub const DEFAULT_SPEED_HZ: u32 = 16_000_000;

/// Default SPI word size
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

/// Default SPI mode (CPOL=0, CPHA=0)
pub const DEFAULT_SPI_MODE: u8 = 0;

/// Name of the shared memory region holding the latest frame
pub const DEFAULT_SHM_NAME: &str = "/lepton_data";

/// Pause after each published frame
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// Dimensions of the frame a sensor produces
///
/// One packet carries exactly one row, so the packet size follows from the
/// column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Scanlines per frame
    pub rows: usize,

    /// Samples per scanline
    pub cols: usize,
}

impl FrameGeometry {
    /// 80x60 Lepton geometry
    pub const LEPTON: FrameGeometry = FrameGeometry {
        rows: LEPTON_ROWS,
        cols: LEPTON_COLS,
    };

    /// Most rows a frame can have: row indices travel in a single byte
    pub const MAX_ROWS: usize = 256;

    /// Create a new geometry
    ///
    /// # Panics
    ///
    /// If `rows` is zero or above [`FrameGeometry::MAX_ROWS`].
    pub const fn new(rows: usize, cols: usize) -> Self {
        assert!(
            rows > 0 && rows <= Self::MAX_ROWS,
            "row count must be between 1 and 256"
        );
        Self { rows, cols }
    }

    /// Bytes in one raw bus packet
    pub const fn packet_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.row_bytes()
    }

    /// Bytes in one scanline
    pub const fn row_bytes(&self) -> usize {
        self.cols * SAMPLE_SIZE
    }

    /// Samples in a whole frame
    pub const fn samples(&self) -> usize {
        self.rows * self.cols
    }

    /// Bytes in a whole frame, i.e. the sink size
    pub const fn frame_bytes(&self) -> usize {
        self.samples() * SAMPLE_SIZE
    }

    /// Index of the row whose arrival marks a frame as complete
    pub const fn last_row(&self) -> usize {
        self.rows - 1
    }

    /// Check whether `row` addresses a scanline of this frame
    pub const fn contains_row(&self, row: usize) -> bool {
        row < self.rows
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::LEPTON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lepton_sizes() {
        let g = FrameGeometry::LEPTON;
        assert_eq!(g.packet_size(), 164);
        assert_eq!(g.packet_size(), LEPTON_PACKET_SIZE);
        assert_eq!(g.frame_bytes(), 80 * 60 * 2);
        assert_eq!(g.last_row(), 59);
    }

    #[test]
    fn test_contains_row() {
        let g = FrameGeometry::new(4, 2);
        assert!(g.contains_row(0));
        assert!(g.contains_row(3));
        assert!(!g.contains_row(4));
    }

    #[test]
    fn test_accepts_full_byte_of_rows() {
        let g = FrameGeometry::new(FrameGeometry::MAX_ROWS, 1);
        assert_eq!(g.last_row(), 255);
    }

    #[test]
    #[should_panic(expected = "row count")]
    fn test_rejects_rows_beyond_one_byte() {
        FrameGeometry::new(257, 80);
    }

    #[test]
    #[should_panic(expected = "row count")]
    fn test_rejects_empty_geometry() {
        FrameGeometry::new(0, 80);
    }
}
