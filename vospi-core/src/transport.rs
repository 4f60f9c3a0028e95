//! Bus transports: one fixed-length synchronous transfer per call

use crate::constants::{
    DEFAULT_BITS_PER_WORD, DEFAULT_SPEED_HZ, DEFAULT_SPI_DEVICE, DEFAULT_SPI_MODE,
    SPI_DEVICE_ENV,
};
use crate::error::CaptureError;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;

#[cfg(feature = "logging")]
use tracing::{info, warn};

/// Source of raw bus packets
///
/// A transfer fills `rx` completely or fails. Failures are not retried by
/// callers: a failed transfer means the bus is out of sync in a way a
/// single packet cannot diagnose.
pub trait Transport {
    /// Perform one transfer of `rx.len()` bytes
    fn transfer(&mut self, rx: &mut [u8]) -> Result<(), CaptureError>;
}

/// SPI bus settings, negotiated once before capture starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    /// spidev device path
    pub device: String,

    /// SPI mode (clock polarity and phase)
    pub mode: u8,

    /// Word size
    pub bits_per_word: u8,

    /// Maximum clock
    pub speed_hz: u32,

    /// Delay after each transfer
    pub delay_usecs: u16,
}

impl SpiConfig {
    /// Defaults, with the device taken from `SPIDEV` when set
    pub fn from_env() -> Self {
        let device =
            std::env::var(SPI_DEVICE_ENV).unwrap_or_else(|_| DEFAULT_SPI_DEVICE.to_string());
        Self {
            device,
            ..Self::default()
        }
    }
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_SPI_DEVICE.to_string(),
            mode: DEFAULT_SPI_MODE,
            bits_per_word: DEFAULT_BITS_PER_WORD,
            speed_hz: DEFAULT_SPEED_HZ,
            delay_usecs: 0,
        }
    }
}

// linux/spi/spidev.h request codes (asm-generic ioctl encoding)
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const SPI_IOC_MAGIC: u32 = b'k' as u32;

const fn spi_ioc(dir: u32, nr: u32, size: u32) -> u32 {
    (dir << 30) | (size << 16) | (SPI_IOC_MAGIC << 8) | nr
}

const SPI_IOC_MESSAGE_1: u32 = spi_ioc(IOC_WRITE, 0, std::mem::size_of::<SpiIocTransfer>() as u32);
const SPI_IOC_RD_MODE: u32 = spi_ioc(IOC_READ, 1, 1);
const SPI_IOC_WR_MODE: u32 = spi_ioc(IOC_WRITE, 1, 1);
const SPI_IOC_RD_BITS_PER_WORD: u32 = spi_ioc(IOC_READ, 3, 1);
const SPI_IOC_WR_BITS_PER_WORD: u32 = spi_ioc(IOC_WRITE, 3, 1);
const SPI_IOC_RD_MAX_SPEED_HZ: u32 = spi_ioc(IOC_READ, 4, 4);
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = spi_ioc(IOC_WRITE, 4, 4);

/// `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

/// Linux spidev transport
#[derive(Debug)]
pub struct SpiTransport {
    file: File,
    config: SpiConfig,
    tx: Vec<u8>,
}

impl SpiTransport {
    /// Open the device and negotiate mode, word size and clock
    ///
    /// Each setting is written and then read back; the values the driver
    /// reports are what the transport uses from then on.
    pub fn open(config: SpiConfig) -> Result<Self, CaptureError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|source| CaptureError::DeviceOpen {
                device: config.device.clone(),
                source,
            })?;

        let mut config = config;
        let fd = file.as_raw_fd();

        ioctl_set(fd, SPI_IOC_WR_MODE, &mut config.mode, "set spi mode")?;
        ioctl_set(fd, SPI_IOC_RD_MODE, &mut config.mode, "get spi mode")?;
        ioctl_set(
            fd,
            SPI_IOC_WR_BITS_PER_WORD,
            &mut config.bits_per_word,
            "set bits per word",
        )?;
        ioctl_set(
            fd,
            SPI_IOC_RD_BITS_PER_WORD,
            &mut config.bits_per_word,
            "get bits per word",
        )?;
        ioctl_set(
            fd,
            SPI_IOC_WR_MAX_SPEED_HZ,
            &mut config.speed_hz,
            "set max speed hz",
        )?;
        ioctl_set(
            fd,
            SPI_IOC_RD_MAX_SPEED_HZ,
            &mut config.speed_hz,
            "get max speed hz",
        )?;

        #[cfg(feature = "logging")]
        info!(
            "Opened {}: spi mode {}, {} bits per word, max speed {} Hz ({} KHz)",
            config.device,
            config.mode,
            config.bits_per_word,
            config.speed_hz,
            config.speed_hz / 1000
        );

        Ok(Self {
            file,
            config,
            tx: Vec::new(),
        })
    }
}

impl Transport for SpiTransport {
    fn transfer(&mut self, rx: &mut [u8]) -> Result<(), CaptureError> {
        self.tx.clear();
        self.tx.resize(rx.len(), 0);

        let mut tr = SpiIocTransfer {
            tx_buf: self.tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: rx.len() as u32,
            speed_hz: self.config.speed_hz,
            delay_usecs: self.config.delay_usecs,
            bits_per_word: self.config.bits_per_word,
            ..SpiIocTransfer::default()
        };

        // SAFETY: both buffers are `len` bytes long and outlive the call.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                SPI_IOC_MESSAGE_1 as _,
                &mut tr as *mut SpiIocTransfer,
            )
        };
        if ret < 1 {
            return Err(CaptureError::Transfer(std::io::Error::last_os_error()));
        }

        Ok(())
    }
}

fn ioctl_set<T>(
    fd: std::os::fd::RawFd,
    request: u32,
    value: &mut T,
    op: &'static str,
) -> Result<(), CaptureError> {
    // SAFETY: `value` has the size encoded in `request`.
    let ret = unsafe { libc::ioctl(fd, request as _, value as *mut T) };
    if ret == -1 {
        return Err(CaptureError::bus_config(op));
    }
    Ok(())
}

/// Serves packets from a recorded capture
///
/// The recording is a plain concatenation of fixed-size packets. Running
/// out of whole packets is reported as [`CaptureError::ReplayExhausted`],
/// which a capture loop treats like any other transport failure.
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    data: Bytes,
    pos: usize,
    served: u64,
}

impl ReplayTransport {
    /// Replay `data` from the start
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            served: 0,
        }
    }

    /// Packets served so far
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Bytes not yet served
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Transport for ReplayTransport {
    fn transfer(&mut self, rx: &mut [u8]) -> Result<(), CaptureError> {
        if self.remaining() < rx.len() {
            if self.remaining() > 0 {
                #[cfg(feature = "logging")]
                warn!(
                    "Dropping {} trailing bytes: not a whole packet",
                    self.remaining()
                );
            }

            return Err(CaptureError::ReplayExhausted {
                packets: self.served,
            });
        }

        rx.copy_from_slice(&self.data[self.pos..self.pos + rx.len()]);
        self.pos += rx.len();
        self.served += 1;
        Ok(())
    }
}
