//! # VoSPI Core
//!
//! Frame capture for line-scan thermal sensors that stream one scanline per
//! SPI packet (FLIR Lepton "VoSPI").
//!
//! ## Modules
//!
//! - `constants`: Packet layout constants and frame geometry
//! - `types`: Classified packets and owned frames
//! - `classifier`: Discard detection and row extraction
//! - `reassembler`: Writing scanlines into a sink, completion and cycle reports
//! - `sink`: Shared memory and in-memory frame buffers
//! - `transport`: SPI and replay packet sources
//! - `capture`: The capture loop
//! - `encoder`: Synthetic packet encoding
//! - `pgm`: PGM rendering for diagnostics

#![warn(missing_docs)]

pub mod capture;
pub mod classifier;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod pgm;
pub mod reassembler;
pub mod sink;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureLoop, CaptureState, CaptureStats, StopFlag};
pub use constants::FrameGeometry;
pub use error::CaptureError;
pub use reassembler::{CycleReport, Reassembler, RowOutcome};
pub use sink::{ImageSink, MemorySink, SharedMemorySink};
pub use transport::{ReplayTransport, SpiConfig, SpiTransport, Transport};
pub use types::{Frame, Packet, RowPacket};

/// Result type alias for capture operations
pub type Result<T> = core::result::Result<T, CaptureError>;
