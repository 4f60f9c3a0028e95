//! Error types for capture operations

/// Errors raised while setting up or driving a capture
///
/// Every variant is fatal to the capture loop. Discard packets and
/// out-of-range rows are not errors and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The bus device could not be opened
    #[error("can't open device {device}: {source}")]
    DeviceOpen {
        /// Device path
        device: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A bus configuration ioctl failed
    #[error("can't {op}: {source}")]
    BusConfig {
        /// Operation, e.g. "set spi mode"
        op: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A single bus transfer failed
    #[error("can't send spi message: {0}")]
    Transfer(#[source] std::io::Error),

    /// A replay source ran out of whole packets
    #[error("replay data exhausted after {packets} packets")]
    ReplayExhausted {
        /// Packets served before running out
        packets: u64,
    },

    /// A shared memory call failed
    #[error("{op} failed for shared memory region {name}: {source}")]
    Shm {
        /// Operation, e.g. "shm_open"
        op: &'static str,
        /// Region name
        name: String,
        /// Underlying errno
        #[source]
        source: rustix::io::Errno,
    },

    /// The shared memory name is not a valid POSIX name
    #[error("invalid shared memory name `{name}`: {reason}")]
    InvalidShmName {
        /// Region name
        name: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// An existing shared memory region has the wrong size
    #[error("shared memory region {name} is {actual} bytes, expected {expected}")]
    SinkSizeMismatch {
        /// Region name
        name: String,
        /// Frame size in bytes
        expected: usize,
        /// Size found
        actual: u64,
    },

    /// A packet buffer is shorter than the geometry requires
    #[error("packet too short: expected {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Packet size required by the geometry
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// IO error outside the bus path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub(crate) fn shm(op: &'static str, name: &str, source: rustix::io::Errno) -> Self {
        CaptureError::Shm {
            op,
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn bus_config(op: &'static str) -> Self {
        CaptureError::BusConfig {
            op,
            source: std::io::Error::last_os_error(),
        }
    }
}
