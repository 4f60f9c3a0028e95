//! Fuzzing entry points for vospi-core
//!
//! To use with cargo-fuzz:
//! 1. Install cargo-fuzz: cargo install cargo-fuzz
//! 2. Run fuzzer: cargo fuzz run fuzz_reassemble

use vospi_core::{
    classifier::classify, CaptureLoop, FrameGeometry, MemorySink, Reassembler, ReplayTransport,
};

pub fn fuzz_classify(data: &[u8]) {
    // Should never panic
    let _ = classify(data, &FrameGeometry::LEPTON);
}

pub fn fuzz_reassemble(data: &[u8]) {
    let geometry = FrameGeometry::LEPTON;
    let mut reassembler = Reassembler::new(MemorySink::new(geometry));

    for packet in data.chunks_exact(geometry.packet_size()) {
        if let Ok(classified) = classify(packet, &geometry) {
            let _ = reassembler.push(classified);
        }
    }

    let _ = reassembler.finish_cycle();
}

pub fn fuzz_capture(data: &[u8]) {
    let transport = ReplayTransport::new(data.to_vec());
    let mut capture = CaptureLoop::new(transport, MemorySink::new(FrameGeometry::LEPTON));

    // Runs until the input is exhausted
    while capture.capture_frame().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzz_classify_empty() {
        fuzz_classify(&[]);
    }

    #[test]
    fn test_fuzz_classify_random() {
        fuzz_classify(&[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_fuzz_reassemble_all_ones() {
        fuzz_reassemble(&[0xFF; 164 * 8]);
    }

    #[test]
    fn test_fuzz_reassemble_all_zeros() {
        fuzz_reassemble(&[0x00; 164 * 8]);
    }

    #[test]
    fn test_fuzz_capture_random() {
        let data: Vec<u8> = (0..164 * 70).map(|i| (i * 31 % 251) as u8).collect();
        fuzz_capture(&data);
    }
}
