//! Synthetic packet encoding
//!
//! Produces byte-exact bus packets for replay files, tests and benchmarks.

use crate::constants::{FrameGeometry, DISCARD_MARKER, VALIDITY_MASK};
use crate::types::Frame;
use bytes::{BufMut, Bytes, BytesMut};

/// Builder for a single raw packet
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    first_byte: u8,
    row: u8,
    crc: u16,
    samples: Vec<u16>,
    fill: u16,
}

impl PacketBuilder {
    /// Start a valid packet for `row`
    pub fn new(row: u8) -> Self {
        Self {
            first_byte: 0x00,
            row,
            crc: 0,
            samples: Vec::new(),
            fill: 0,
        }
    }

    /// Start a discard packet
    pub fn discard() -> Self {
        Self {
            first_byte: DISCARD_MARKER,
            ..Self::new(0xFF)
        }
    }

    /// Set the upper nibble of the first header byte
    ///
    /// The validity field in the low nibble is left untouched.
    pub fn status(mut self, upper: u8) -> Self {
        self.first_byte = (upper << 4) | (self.first_byte & VALIDITY_MASK);
        self
    }

    /// Set the header CRC field
    pub fn crc(mut self, crc: u16) -> Self {
        self.crc = crc;
        self
    }

    /// Set explicit samples; missing ones take the fill value
    pub fn samples(mut self, samples: impl Into<Vec<u16>>) -> Self {
        self.samples = samples.into();
        self
    }

    /// Set the value for samples not given explicitly
    pub fn fill(mut self, value: u16) -> Self {
        self.fill = value;
        self
    }

    /// Encode the packet for `geometry`
    ///
    /// Samples beyond `geometry.cols` are dropped.
    pub fn build(&self, geometry: &FrameGeometry) -> Bytes {
        let mut buf = BytesMut::with_capacity(geometry.packet_size());
        self.encode_into(geometry, &mut buf);
        buf.freeze()
    }

    fn encode_into(&self, geometry: &FrameGeometry, buf: &mut BytesMut) {
        buf.put_u8(self.first_byte);
        buf.put_u8(self.row);
        buf.put_u16(self.crc);

        for col in 0..geometry.cols {
            let sample = self.samples.get(col).copied().unwrap_or(self.fill);
            buf.put_slice(&sample.to_ne_bytes());
        }
    }
}

/// Encode a whole frame as one packet per row, in row order
pub fn encode_frame(frame: &Frame) -> Bytes {
    let geometry = frame.geometry;
    let mut buf = BytesMut::with_capacity(geometry.rows * geometry.packet_size());

    for row in 0..geometry.rows {
        PacketBuilder::new(row as u8)
            .samples(frame.row(row))
            .encode_into(&geometry, &mut buf);
    }

    buf.freeze()
}

/// Encode `count` consecutive discard packets
pub fn encode_discards(geometry: &FrameGeometry, count: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(count * geometry.packet_size());
    let discard = PacketBuilder::discard();
    for _ in 0..count {
        discard.encode_into(geometry, &mut buf);
    }
    buf.freeze()
}
