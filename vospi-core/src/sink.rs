//! Image sinks: the fixed-size region completed rows are written into
//!
//! The sink has no header, no version counter and no lock. Readers in other
//! processes may observe a frame mixing rows from two capture cycles; callers
//! that need whole frames must layer their own double buffering on top.

use crate::constants::FrameGeometry;
use crate::error::CaptureError;
use crate::types::{decode_samples, Frame};
use rustix::fs::{fstat, ftruncate, Mode};
use rustix::mm::{mmap, msync, munmap, MapFlags, MsyncFlags, ProtFlags};
use rustix::shm;
use std::ptr::{null_mut, NonNull};

#[cfg(feature = "logging")]
use tracing::debug;

/// A fixed-size byte region holding one frame, row-major
pub trait ImageSink {
    /// Frame dimensions this sink was sized for
    fn geometry(&self) -> FrameGeometry;

    /// Current contents
    fn bytes(&self) -> &[u8];

    /// Writable contents
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Make everything written so far visible to other readers
    fn flush(&mut self) -> Result<(), CaptureError>;

    /// Raw bytes of one scanline
    fn row(&self, row: usize) -> &[u8] {
        let row_bytes = self.geometry().row_bytes();
        &self.bytes()[row * row_bytes..(row + 1) * row_bytes]
    }

    /// Decoded samples of one scanline
    fn row_samples(&self, row: usize) -> Vec<u16> {
        decode_samples(self.row(row)).collect()
    }

    /// Copy the current contents out as a frame
    fn snapshot(&self) -> Frame {
        Frame {
            geometry: self.geometry(),
            samples: decode_samples(self.bytes()).collect(),
        }
    }
}

/// Heap-backed sink for tests and offline replay
#[derive(Debug, Clone)]
pub struct MemorySink {
    geometry: FrameGeometry,
    data: Vec<u8>,
    flushes: usize,
}

impl MemorySink {
    /// Create a zeroed sink
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            data: vec![0u8; geometry.frame_bytes()],
            flushes: 0,
        }
    }

    /// Create a sink pre-filled with `frame`
    pub fn from_frame(frame: &Frame) -> Self {
        let mut sink = Self::new(frame.geometry);
        for (dst, sample) in sink.data.chunks_exact_mut(2).zip(&frame.samples) {
            dst.copy_from_slice(&sample.to_ne_bytes());
        }
        sink
    }

    /// Number of times `flush` was called
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl ImageSink for MemorySink {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        self.flushes += 1;
        Ok(())
    }
}

const POSIX_NAME_MAX: usize = 255;

fn validate_shm_name(name: &str) -> Result<(), CaptureError> {
    let invalid = |reason| CaptureError::InvalidShmName {
        name: name.to_string(),
        reason,
    };

    if !name.starts_with('/') {
        return Err(invalid("name must start with '/'"));
    }
    if name[1..].contains('/') {
        return Err(invalid("name must not contain additional '/' characters"));
    }
    if name.len() > POSIX_NAME_MAX {
        return Err(invalid("name length must be <= 255 bytes"));
    }

    Ok(())
}

/// Frame buffer in a named POSIX shared memory region
///
/// The region is created if absent and resized to exactly one frame. It is
/// never unlinked by this type, so readers keep access after the producer
/// exits; use [`SharedMemorySink::unlink`] to remove it explicitly.
pub struct SharedMemorySink {
    ptr: NonNull<u8>,
    len: usize,
    name: String,
    geometry: FrameGeometry,
}

// SAFETY: the mapping is owned by this value and only reachable through it.
unsafe impl Send for SharedMemorySink {}

impl SharedMemorySink {
    /// Create (or reuse) the region `name` and map it read-write
    pub fn create(name: &str, geometry: FrameGeometry) -> Result<Self, CaptureError> {
        validate_shm_name(name)?;

        let fd = shm::open(
            name,
            shm::OFlags::CREATE | shm::OFlags::RDWR,
            Mode::RUSR | Mode::WUSR | Mode::RGRP | Mode::ROTH,
        )
        .map_err(|e| CaptureError::shm("shm_open", name, e))?;

        let len = geometry.frame_bytes();
        ftruncate(&fd, len as u64).map_err(|e| CaptureError::shm("ftruncate", name, e))?;

        let sink = Self::map(&fd, name, geometry)?;

        #[cfg(feature = "logging")]
        debug!("Mapped shared memory region {} ({} bytes)", name, len);

        Ok(sink)
    }

    /// Map an existing region created by a producer
    ///
    /// Fails if the region is missing or its size is not one frame.
    pub fn open_existing(name: &str, geometry: FrameGeometry) -> Result<Self, CaptureError> {
        validate_shm_name(name)?;

        let fd = shm::open(name, shm::OFlags::RDWR, Mode::empty())
            .map_err(|e| CaptureError::shm("shm_open", name, e))?;

        let stat = fstat(&fd).map_err(|e| CaptureError::shm("fstat", name, e))?;
        let expected = geometry.frame_bytes();
        if stat.st_size != expected as i64 {
            return Err(CaptureError::SinkSizeMismatch {
                name: name.to_string(),
                expected,
                actual: stat.st_size.max(0) as u64,
            });
        }

        Self::map(&fd, name, geometry)
    }

    /// Remove the region name
    pub fn unlink(name: &str) -> Result<(), CaptureError> {
        shm::unlink(name).map_err(|e| CaptureError::shm("shm_unlink", name, e))
    }

    fn map(
        fd: &rustix::fd::OwnedFd,
        name: &str,
        geometry: FrameGeometry,
    ) -> Result<Self, CaptureError> {
        let len = geometry.frame_bytes();

        // SAFETY: fresh shared mapping of a descriptor sized to `len` bytes; it
        // does not alias any Rust object.
        let ptr = unsafe {
            mmap(
                null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd,
                0,
            )
        }
        .map_err(|e| CaptureError::shm("mmap", name, e))?;

        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
            CaptureError::shm("mmap", name, rustix::io::Errno::NOMEM)
        })?;

        Ok(Self {
            ptr,
            len,
            name: name.to_string(),
            geometry,
        })
    }
}

impl ImageSink for SharedMemorySink {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `ptr` maps `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes this the only local view.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    fn flush(&mut self) -> Result<(), CaptureError> {
        // SAFETY: the range is exactly the live mapping.
        unsafe { msync(self.ptr.as_ptr().cast(), self.len, MsyncFlags::SYNC) }
            .map_err(|e| CaptureError::shm("msync", &self.name, e))
    }
}

impl Drop for SharedMemorySink {
    fn drop(&mut self) {
        // SAFETY: the mapping was created in `map` and is unmapped only here.
        let _ = unsafe { munmap(self.ptr.as_ptr().cast(), self.len) };
    }
}

impl std::fmt::Debug for SharedMemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemorySink")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("geometry", &self.geometry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/vospi-test-{}-{}", tag, std::process::id())
    }

    #[test]
    fn test_memory_sink_starts_zeroed() {
        let sink = MemorySink::new(FrameGeometry::LEPTON);
        assert_eq!(sink.bytes().len(), 9600);
        assert!(sink.bytes().iter().all(|&b| b == 0));
        assert_eq!(sink.flushes(), 0);
    }

    #[test]
    fn test_memory_sink_from_frame() {
        let geometry = FrameGeometry::new(2, 3);
        let frame = Frame {
            geometry,
            samples: vec![1, 2, 3, 4, 5, 6],
        };

        let sink = MemorySink::from_frame(&frame);
        assert_eq!(sink.row_samples(1), vec![4, 5, 6]);
        assert_eq!(sink.snapshot(), frame);
    }

    #[test]
    fn test_rejects_bad_names() {
        let geometry = FrameGeometry::LEPTON;
        assert!(matches!(
            SharedMemorySink::create("lepton_data", geometry),
            Err(CaptureError::InvalidShmName { .. })
        ));
        assert!(matches!(
            SharedMemorySink::create("/a/b", geometry),
            Err(CaptureError::InvalidShmName { .. })
        ));
    }

    #[test]
    fn test_shared_memory_visible_to_second_mapping() {
        let name = unique_name("visible");
        let geometry = FrameGeometry::new(2, 2);

        let mut writer = SharedMemorySink::create(&name, geometry).unwrap();
        writer.bytes_mut()[0..2].copy_from_slice(&0xABCDu16.to_ne_bytes());
        writer.flush().unwrap();

        let reader = SharedMemorySink::open_existing(&name, geometry).unwrap();
        assert_eq!(reader.row_samples(0), vec![0xABCD, 0]);

        drop(reader);
        drop(writer);
        SharedMemorySink::unlink(&name).unwrap();
    }

    #[test]
    fn test_open_existing_checks_size() {
        let name = unique_name("size");
        let writer = SharedMemorySink::create(&name, FrameGeometry::new(2, 2)).unwrap();

        let result = SharedMemorySink::open_existing(&name, FrameGeometry::new(4, 4));
        assert!(matches!(
            result,
            Err(CaptureError::SinkSizeMismatch {
                expected: 32,
                actual: 8,
                ..
            })
        ));

        drop(writer);
        SharedMemorySink::unlink(&name).unwrap();
    }
}
