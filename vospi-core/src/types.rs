//! Core types for VoSPI packets and frames

use crate::constants::{FrameGeometry, SAMPLE_SIZE};
use crate::error::CaptureError;

/// Result of classifying one raw bus packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Discard packet: carries no usable data
    Discard,

    /// Packet carrying one scanline
    Valid(RowPacket<'a>),
}

impl<'a> Packet<'a> {
    /// Row index of a valid packet
    pub fn row(&self) -> Option<u8> {
        match self {
            Packet::Discard => None,
            Packet::Valid(p) => Some(p.row),
        }
    }
}

/// A valid packet, borrowed from the transfer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPacket<'a> {
    /// Row index exactly as sent; may be out of range for the frame
    pub row: u8,

    /// Scanline bytes (`cols` samples, native byte order)
    pub payload: &'a [u8],
}

impl<'a> RowPacket<'a> {
    /// Decode the payload into samples
    pub fn samples(&self) -> impl Iterator<Item = u16> + 'a {
        decode_samples(self.payload)
    }
}

/// Decode native-endian u16 samples from raw bytes
pub fn decode_samples(bytes: &[u8]) -> impl Iterator<Item = u16> + '_ {
    bytes
        .chunks_exact(SAMPLE_SIZE)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
}

/// Owned copy of a frame, decoded to samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame dimensions
    pub geometry: FrameGeometry,

    /// Row-major samples
    pub samples: Vec<u16>,
}

impl Frame {
    /// Create a frame filled with `value`
    pub fn filled(geometry: FrameGeometry, value: u16) -> Self {
        Self {
            geometry,
            samples: vec![value; geometry.samples()],
        }
    }

    /// Copy a frame out of raw sink bytes
    pub fn from_bytes(geometry: FrameGeometry, bytes: &[u8]) -> Result<Self, CaptureError> {
        if bytes.len() != geometry.frame_bytes() {
            return Err(CaptureError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "frame snapshot is {} bytes, expected {}",
                    bytes.len(),
                    geometry.frame_bytes()
                ),
            )));
        }

        Ok(Self {
            geometry,
            samples: decode_samples(bytes).collect(),
        })
    }

    /// Samples of one row
    pub fn row(&self, row: usize) -> &[u16] {
        let start = row * self.geometry.cols;
        &self.samples[start..start + self.geometry.cols]
    }

    /// Smallest and largest sample
    pub fn min_max(&self) -> Option<(u16, u16)> {
        let min = *self.samples.iter().min()?;
        let max = *self.samples.iter().max()?;
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_native_order() {
        let bytes = [0x34u16.to_ne_bytes(), 0x1234u16.to_ne_bytes()].concat();
        let samples: Vec<u16> = decode_samples(&bytes).collect();
        assert_eq!(samples, vec![0x34, 0x1234]);
    }

    #[test]
    fn test_frame_from_bytes_rejects_wrong_size() {
        let geometry = FrameGeometry::new(2, 2);
        assert!(Frame::from_bytes(geometry, &[0u8; 7]).is_err());

        let frame = Frame::from_bytes(geometry, &[0u8; 8]).unwrap();
        assert_eq!(frame.samples.len(), 4);
        assert_eq!(frame.row(1), &[0, 0]);
    }

    #[test]
    fn test_min_max() {
        let mut frame = Frame::filled(FrameGeometry::new(1, 3), 5);
        frame.samples[1] = 9;
        frame.samples[2] = 2;
        assert_eq!(frame.min_max(), Some((2, 9)));
    }
}
