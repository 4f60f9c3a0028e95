//! Packet classification

use crate::constants::{FrameGeometry, DISCARD_MARKER, PACKET_HEADER_SIZE, VALIDITY_MASK};
use crate::error::CaptureError;
use crate::types::{Packet, RowPacket};

/// Classify one raw packet
///
/// Layout of a packet:
/// 1. Byte 0: low nibble is the validity field (`0xF` = discard)
/// 2. Byte 1: row index
/// 3. Bytes 2..4: remainder of the header, ignored
/// 4. Payload: `cols` samples in the bus's native byte order
///
/// The row index is not range checked; that is the reassembler's job.
/// Extra trailing bytes beyond the geometry's packet size are ignored.
pub fn classify<'a>(
    data: &'a [u8],
    geometry: &FrameGeometry,
) -> Result<Packet<'a>, CaptureError> {
    let packet_size = geometry.packet_size();
    if data.len() < packet_size {
        return Err(CaptureError::PacketTooShort {
            expected: packet_size,
            actual: data.len(),
        });
    }

    if is_discard(data[0]) {
        return Ok(Packet::Discard);
    }

    Ok(Packet::Valid(RowPacket {
        row: data[1],
        payload: &data[PACKET_HEADER_SIZE..packet_size],
    }))
}

/// Check the validity field of a packet's first byte
pub const fn is_discard(first_byte: u8) -> bool {
    first_byte & VALIDITY_MASK == DISCARD_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::PacketBuilder;

    #[test]
    fn test_classify_valid_row() {
        let geometry = FrameGeometry::LEPTON;
        let packet = PacketBuilder::new(7).fill(0x1234).build(&geometry);

        let classified = classify(&packet, &geometry).unwrap();
        let Packet::Valid(row) = classified else {
            panic!("expected valid packet");
        };

        assert_eq!(row.row, 7);
        assert_eq!(row.payload.len(), geometry.row_bytes());
        assert!(row.samples().all(|s| s == 0x1234));
    }

    #[test]
    fn test_classify_discard() {
        let geometry = FrameGeometry::LEPTON;
        let packet = PacketBuilder::discard().build(&geometry);

        assert_eq!(classify(&packet, &geometry).unwrap(), Packet::Discard);
    }

    #[test]
    fn test_only_low_nibble_marks_discard() {
        assert!(is_discard(0x0F));
        assert!(is_discard(0xAF));
        assert!(!is_discard(0xF0));
        assert!(!is_discard(0x0E));
    }

    #[test]
    fn test_out_of_range_row_still_valid() {
        let geometry = FrameGeometry::LEPTON;
        let packet = PacketBuilder::new(200).build(&geometry);

        assert_eq!(classify(&packet, &geometry).unwrap().row(), Some(200));
    }

    #[test]
    fn test_packet_borrows_only_from_data() {
        let packet = PacketBuilder::new(3).fill(9).build(&FrameGeometry::LEPTON);

        let classified = {
            let geometry = FrameGeometry::LEPTON;
            classify(&packet, &geometry).unwrap()
        };

        assert_eq!(classified.row(), Some(3));
    }

    #[test]
    fn test_classify_short_packet() {
        let geometry = FrameGeometry::LEPTON;
        let result = classify(&[0u8; 10], &geometry);

        assert!(matches!(
            result,
            Err(CaptureError::PacketTooShort {
                expected: 164,
                actual: 10
            })
        ));
    }
}
