//! Capture loop: transfer, classify, reassemble, publish

use crate::classifier::classify;
use crate::constants::DEFAULT_FRAME_INTERVAL;
use crate::error::CaptureError;
use crate::reassembler::{CycleReport, Reassembler, RowOutcome};
use crate::sink::ImageSink;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{debug, info};

/// Longest single sleep while pausing, so a stop request is noticed quickly
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Where the loop is in a capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Accumulating rows of a frame
    AwaitingRows,

    /// Last row seen; frame about to be published
    FrameComplete,
}

/// Cooperative stop request shared with signal handlers or other threads
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Running totals for a capture loop
///
/// Packet counters include the cycle still in progress, so they match the
/// number of transfers even when the loop stops mid-frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Frames flushed to the sink
    pub frames_published: u64,

    /// Packets transferred
    pub packets: u64,

    /// Discard packets
    pub discards: u64,

    /// Valid packets with a row past the end of the frame
    pub out_of_range: u64,

    /// Published frames where at least one row was not refreshed
    pub incomplete_frames: u64,
}

impl CaptureStats {
    fn record(&mut self, outcome: &RowOutcome) {
        self.packets += 1;
        match outcome {
            RowOutcome::Discarded => self.discards += 1,
            RowOutcome::OutOfRange { .. } => self.out_of_range += 1,
            RowOutcome::Written { .. } => {}
        }
    }

    fn absorb(&mut self, report: &CycleReport) {
        self.frames_published += 1;
        if !report.is_complete() {
            self.incomplete_frames += 1;
        }
    }

    /// Percentage of transferred packets that were discards
    pub fn discard_rate(&self) -> f64 {
        if self.packets == 0 {
            0.0
        } else {
            (self.discards as f64 / self.packets as f64) * 100.0
        }
    }
}

/// Drives a [`Transport`] and a [`Reassembler`] frame after frame
///
/// Processing is strictly sequential: one packet is transferred, classified
/// and written before the next transfer starts. When the last row of a frame
/// arrives the sink is flushed, the loop pauses for the frame interval and
/// then starts accumulating the next frame.
///
/// Any transport error ends the loop and is returned to the caller. Discard
/// packets and out-of-range rows are steady-state traffic and only counted.
#[derive(Debug)]
pub struct CaptureLoop<T: Transport, S: ImageSink> {
    transport: T,
    reassembler: Reassembler<S>,
    frame_interval: Duration,
    state: CaptureState,
    buf: Vec<u8>,
    stats: CaptureStats,
}

impl<T: Transport, S: ImageSink> CaptureLoop<T, S> {
    /// Create a loop writing into `sink`, pausing the default interval
    pub fn new(transport: T, sink: S) -> Self {
        let geometry = sink.geometry();
        Self {
            transport,
            reassembler: Reassembler::new(sink),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            state: CaptureState::AwaitingRows,
            buf: vec![0u8; geometry.packet_size()],
            stats: CaptureStats::default(),
        }
    }

    /// Set the pause after each published frame
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Transfer and handle a single packet
    pub fn step(&mut self) -> Result<RowOutcome, CaptureError> {
        self.transport.transfer(&mut self.buf)?;

        let geometry = self.reassembler.geometry();
        let packet = classify(&self.buf, &geometry)?;
        let outcome = self.reassembler.push(packet);
        self.stats.record(&outcome);

        if outcome.completed() {
            self.state = CaptureState::FrameComplete;
        }

        Ok(outcome)
    }

    /// Accumulate rows until a frame completes, then publish it
    pub fn capture_frame(&mut self) -> Result<CycleReport, CaptureError> {
        while self.state == CaptureState::AwaitingRows {
            self.step()?;
        }
        self.publish()
    }

    /// Capture and publish frames until `stop` is set
    ///
    /// The stop flag is checked before every transfer and while pausing.
    pub fn run(&mut self, stop: &StopFlag) -> Result<CaptureStats, CaptureError> {
        #[cfg(feature = "logging")]
        info!(
            "Capturing {}x{} frames every {:?}",
            self.reassembler.geometry().cols,
            self.reassembler.geometry().rows,
            self.frame_interval
        );

        while !stop.is_stopped() {
            self.step()?;

            if self.state == CaptureState::FrameComplete {
                self.publish()?;
                self.pause(stop);
            }
        }

        #[cfg(feature = "logging")]
        info!(
            "Capture stopped after {} frames ({} packets, {:.1}% discards)",
            self.stats.frames_published,
            self.stats.packets,
            self.stats.discard_rate()
        );

        Ok(self.stats.clone())
    }

    fn publish(&mut self) -> Result<CycleReport, CaptureError> {
        self.reassembler.sink_mut().flush()?;

        let report = self.reassembler.finish_cycle();
        self.stats.absorb(&report);
        self.state = CaptureState::AwaitingRows;

        #[cfg(feature = "logging")]
        debug!(
            "Published frame {} ({} packets, {} rows missing this cycle)",
            self.stats.frames_published,
            report.packets,
            report.missing_rows.len()
        );

        Ok(report)
    }

    fn pause(&self, stop: &StopFlag) {
        let deadline = Instant::now() + self.frame_interval;
        loop {
            let now = Instant::now();
            if now >= deadline || stop.is_stopped() {
                break;
            }
            std::thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }

    /// Current state
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Totals so far
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// The sink frames are published into
    pub fn sink(&self) -> &S {
        self.reassembler.sink()
    }

    /// The transport packets come from
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FrameGeometry;
    use crate::encoder::PacketBuilder;
    use crate::sink::MemorySink;
    use crate::transport::ReplayTransport;
    use bytes::BytesMut;

    fn stream(geometry: &FrameGeometry, packets: &[PacketBuilder]) -> ReplayTransport {
        let mut buf = BytesMut::new();
        for p in packets {
            buf.extend_from_slice(&p.build(geometry));
        }
        ReplayTransport::new(buf.freeze())
    }

    #[test]
    fn test_step_moves_to_frame_complete_on_last_row() {
        let geometry = FrameGeometry::new(2, 2);
        let transport = stream(&geometry, &[PacketBuilder::new(0), PacketBuilder::new(1)]);
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry));

        capture.step().unwrap();
        assert_eq!(capture.state(), CaptureState::AwaitingRows);
        capture.step().unwrap();
        assert_eq!(capture.state(), CaptureState::FrameComplete);
    }

    #[test]
    fn test_capture_frame_flushes_once() {
        let geometry = FrameGeometry::new(3, 2);
        let transport = stream(
            &geometry,
            &[
                PacketBuilder::discard(),
                PacketBuilder::new(0).fill(1),
                PacketBuilder::new(1).fill(2),
                PacketBuilder::new(2).fill(3),
            ],
        );
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry));

        let report = capture.capture_frame().unwrap();

        assert_eq!(report.packets, 4);
        assert_eq!(report.discards, 1);
        assert!(report.is_complete());
        assert_eq!(capture.state(), CaptureState::AwaitingRows);
        assert_eq!(capture.sink().flushes(), 1);
        assert_eq!(capture.sink().row_samples(2), vec![3, 3]);
    }

    #[test]
    fn test_transport_error_is_fatal() {
        let geometry = FrameGeometry::new(3, 2);
        let transport = stream(&geometry, &[PacketBuilder::new(0)]);
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry))
            .frame_interval(Duration::ZERO);

        let result = capture.run(&StopFlag::new());

        assert!(matches!(
            result,
            Err(CaptureError::ReplayExhausted { packets: 1 })
        ));
        assert_eq!(capture.sink().flushes(), 0);
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let geometry = FrameGeometry::new(1, 2);
        let transport = stream(&geometry, &[PacketBuilder::new(0)]);
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry));

        let stop = StopFlag::new();
        stop.stop();

        let stats = capture.run(&stop).unwrap();
        assert_eq!(stats.frames_published, 0);
        assert_eq!(capture.transport().served(), 0);
    }

    #[test]
    fn test_stats_track_incomplete_frames() {
        let geometry = FrameGeometry::new(3, 2);
        let transport = stream(
            &geometry,
            &[
                PacketBuilder::new(2),
                PacketBuilder::new(0),
                PacketBuilder::new(1),
                PacketBuilder::new(2),
            ],
        );
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry));

        let first = capture.capture_frame().unwrap();
        let second = capture.capture_frame().unwrap();

        assert_eq!(first.missing_rows, vec![0, 1]);
        assert!(second.is_complete());
        assert_eq!(capture.stats().frames_published, 2);
        assert_eq!(capture.stats().incomplete_frames, 1);
    }

    fn frames(geometry: &FrameGeometry, count: usize) -> ReplayTransport {
        let packets: Vec<PacketBuilder> = (0..count)
            .flat_map(|_| (0..geometry.rows as u8).map(PacketBuilder::new))
            .collect();
        stream(geometry, &packets)
    }

    #[test]
    fn test_run_flushes_once_per_frame() {
        let geometry = FrameGeometry::new(2, 2);
        let mut capture = CaptureLoop::new(frames(&geometry, 3), MemorySink::new(geometry))
            .frame_interval(Duration::ZERO);

        let result = capture.run(&StopFlag::new());

        assert!(matches!(
            result,
            Err(CaptureError::ReplayExhausted { packets: 6 })
        ));
        assert_eq!(capture.sink().flushes(), 3);
        assert_eq!(capture.stats().frames_published, 3);
    }

    #[test]
    fn test_run_pauses_after_each_frame() {
        let geometry = FrameGeometry::new(2, 2);
        let interval = Duration::from_millis(120);
        let mut capture = CaptureLoop::new(frames(&geometry, 2), MemorySink::new(geometry))
            .frame_interval(interval);

        let start = Instant::now();
        let result = capture.run(&StopFlag::new());

        assert!(result.is_err());
        assert_eq!(capture.sink().flushes(), 2);
        assert!(start.elapsed() >= interval * 2);
    }

    #[test]
    fn test_stop_during_pause() {
        let geometry = FrameGeometry::new(2, 2);
        let mut capture = CaptureLoop::new(frames(&geometry, 2), MemorySink::new(geometry))
            .frame_interval(Duration::from_secs(30));

        let stop = StopFlag::new();
        let stopper = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                stop.stop();
            })
        };

        let start = Instant::now();
        let stats = capture.run(&stop).unwrap();
        stopper.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(stats.frames_published, 1);
        assert_eq!(capture.transport().served(), 2);
    }

    #[test]
    fn test_stats_include_unfinished_cycle() {
        let geometry = FrameGeometry::new(3, 2);
        let transport = stream(
            &geometry,
            &[
                PacketBuilder::new(0),
                PacketBuilder::new(1),
                PacketBuilder::new(2),
                PacketBuilder::discard(),
                PacketBuilder::new(9),
                PacketBuilder::new(0),
            ],
        );
        let mut capture = CaptureLoop::new(transport, MemorySink::new(geometry))
            .frame_interval(Duration::ZERO);

        let result = capture.run(&StopFlag::new());

        assert!(matches!(
            result,
            Err(CaptureError::ReplayExhausted { packets: 6 })
        ));
        let stats = capture.stats();
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.packets, 6);
        assert_eq!(stats.discards, 1);
        assert_eq!(stats.out_of_range, 1);
    }
}
