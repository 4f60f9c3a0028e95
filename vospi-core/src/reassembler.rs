//! Frame reassembly: placing scanlines into the sink

use crate::constants::FrameGeometry;
use crate::sink::ImageSink;
use crate::types::{Packet, RowPacket};
use serde::{Deserialize, Serialize};

#[cfg(feature = "logging")]
use tracing::trace;

/// What happened to one classified packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Discard packet, nothing written
    Discarded,

    /// Row index past the end of the frame, nothing written
    OutOfRange {
        /// Row index as received
        row: usize,
    },

    /// Scanline written
    Written {
        /// Row index written
        row: usize,
        /// This was the last row of the frame
        completed: bool,
    },
}

impl RowOutcome {
    /// Check if this packet completed the frame
    pub fn completed(&self) -> bool {
        matches!(self, RowOutcome::Written { completed: true, .. })
    }
}

/// Places valid scanlines into an [`ImageSink`]
///
/// Writes go straight into the sink: there is no staging copy, rows can
/// arrive in any order and the last write for a row wins. A frame counts as
/// complete as soon as its last row is written, whether or not the other
/// rows arrived in the same cycle. Rows that were not re-sent keep whatever
/// the sink held before.
///
/// Alongside that, the reassembler tracks which rows were written since the
/// last [`finish_cycle`](Reassembler::finish_cycle) so callers can see how
/// complete a published frame really was. The tracking never changes what is
/// written or when completion fires.
#[derive(Debug)]
pub struct Reassembler<S: ImageSink> {
    sink: S,
    geometry: FrameGeometry,
    seen: Vec<bool>,
    packets: u64,
    discards: u64,
    out_of_range: u64,
}

impl<S: ImageSink> Reassembler<S> {
    /// Create a reassembler writing into `sink`
    pub fn new(sink: S) -> Self {
        let geometry = sink.geometry();
        Self {
            sink,
            geometry,
            seen: vec![false; geometry.rows],
            packets: 0,
            discards: 0,
            out_of_range: 0,
        }
    }

    /// Handle a classified packet
    pub fn push(&mut self, packet: Packet<'_>) -> RowOutcome {
        self.packets += 1;
        match packet {
            Packet::Discard => {
                self.discards += 1;
                RowOutcome::Discarded
            }
            Packet::Valid(row) => self.write_row(&row),
        }
    }

    /// Write one valid scanline
    ///
    /// A payload longer than a scanline is truncated; a shorter one only
    /// overwrites its leading samples.
    pub fn reassemble(&mut self, packet: &RowPacket<'_>) -> RowOutcome {
        self.packets += 1;
        self.write_row(packet)
    }

    fn write_row(&mut self, packet: &RowPacket<'_>) -> RowOutcome {
        let row = packet.row as usize;
        if !self.geometry.contains_row(row) {
            self.out_of_range += 1;

            #[cfg(feature = "logging")]
            trace!("Ignoring out-of-range row {}", row);

            return RowOutcome::OutOfRange { row };
        }

        let row_bytes = self.geometry.row_bytes();
        let len = packet.payload.len().min(row_bytes);
        let start = row * row_bytes;
        self.sink.bytes_mut()[start..start + len].copy_from_slice(&packet.payload[..len]);
        self.seen[row] = true;

        RowOutcome::Written {
            row,
            completed: row == self.geometry.last_row(),
        }
    }

    /// Close the current cycle and report how much of it arrived
    pub fn finish_cycle(&mut self) -> CycleReport {
        let missing_rows: Vec<usize> = self
            .seen
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(row, _)| row)
            .collect();

        let report = CycleReport {
            packets: self.packets,
            discards: self.discards,
            out_of_range: self.out_of_range,
            rows_written: self.geometry.rows - missing_rows.len(),
            missing_rows,
        };

        self.seen.iter_mut().for_each(|s| *s = false);
        self.packets = 0;
        self.discards = 0;
        self.out_of_range = 0;

        report
    }

    /// Frame dimensions
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// The sink being written
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

/// Packet accounting for one capture cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Packets handled
    pub packets: u64,

    /// Discard packets
    pub discards: u64,

    /// Valid packets with a row past the end of the frame
    pub out_of_range: u64,

    /// Distinct rows written
    pub rows_written: usize,

    /// Rows not written this cycle; they hold values from an earlier cycle
    pub missing_rows: Vec<usize>,
}

impl CycleReport {
    /// Check if every row was written this cycle
    pub fn is_complete(&self) -> bool {
        self.missing_rows.is_empty()
    }

    /// Percentage of rows written this cycle
    pub fn completeness(&self) -> f64 {
        let total = self.rows_written + self.missing_rows.len();
        if total == 0 {
            0.0
        } else {
            (self.rows_written as f64 / total as f64) * 100.0
        }
    }
}
