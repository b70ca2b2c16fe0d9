#![forbid(unsafe_code)]
//! Backing-file I/O for the ChainFS simulated disk.
//!
//! The disk is one ordinary file accessed with positioned reads and writes
//! (`pread`/`pwrite` via `std::os::unix::fs::FileExt`), so there is no shared
//! seek cursor to coordinate. Writable images are opened with `O_SYNC`:
//! every write reaches the medium before the call returns, and `sync()`
//! additionally flushes file metadata.

use cfs_error::{CfsError, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;
use tracing::{debug, trace};

/// Scratch buffer length for zero-fill writes.
const ZERO_CHUNK: usize = 512;

/// A byte-addressable disk image over a backing file.
///
/// All offsets are absolute image offsets; reads and writes past the current
/// image length are rejected rather than extending the file, so layout bugs
/// surface as errors instead of silently growing the disk.
#[derive(Debug)]
pub struct DiskImage {
    file: File,
    len: u64,
    writable: bool,
}

impl DiskImage {
    /// Open (or create) a writable image with write-through semantics.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .custom_flags(libc::O_SYNC)
            .open(path)?;
        let len = file.metadata()?.len();
        debug!(
            target: "cfs::block",
            event = "image_open",
            path = %path.display(),
            len_bytes = len,
            writable = true
        );
        Ok(Self {
            file,
            len,
            writable: true,
        })
    }

    /// Open an existing image read-only (used by `inspect`).
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).open(path)?;
        let len = file.metadata()?.len();
        debug!(
            target: "cfs::block",
            event = "image_open",
            path = %path.display(),
            len_bytes = len,
            writable = false
        );
        Ok(Self {
            file,
            len,
            writable: false,
        })
    }

    /// Current image length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the image is zero-length (a fresh disk awaiting format).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_range(&self, offset: u64, len: usize, op: &str) -> Result<()> {
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| CfsError::Corrupt(format!("{op} range overflows u64")))?;
        if end > self.len {
            return Err(CfsError::Corrupt(format!(
                "{op} out of bounds: offset={offset} len={len} image_len={}",
                self.len
            )));
        }
        Ok(())
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len(), "read")?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    /// Write all of `buf` starting at `offset`.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(CfsError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "image opened read-only",
            )));
        }
        self.check_range(offset, buf.len(), "write")?;
        trace!(
            target: "cfs::block",
            event = "write",
            offset,
            len = buf.len()
        );
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    /// Zero-fill `len` bytes starting at `offset`.
    pub fn write_zeros_at(&self, offset: u64, len: usize) -> Result<()> {
        let zeros = [0_u8; ZERO_CHUNK];
        let mut written = 0_usize;
        while written < len {
            let chunk = (len - written).min(ZERO_CHUNK);
            self.write_all_at(offset + written as u64, &zeros[..chunk])?;
            written += chunk;
        }
        Ok(())
    }

    /// Set the image length, extending with zeros or truncating.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        if !self.writable {
            return Err(CfsError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "image opened read-only",
            )));
        }
        self.file.set_len(len)?;
        self.len = len;
        debug!(target: "cfs::block", event = "image_resize", len_bytes = len);
        Ok(())
    }

    /// Flush data and metadata to stable storage.
    pub fn sync(&self) -> Result<()> {
        if self.writable {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for DiskImage {
    fn drop(&mut self) {
        // Final flush; the descriptor closes with the File.
        if self.writable {
            let _ = self.file.sync_all();
        }
        debug!(target: "cfs::block", event = "image_close");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image_in(dir: &TempDir) -> DiskImage {
        let mut img = DiskImage::open(dir.path().join("disk.img")).expect("open");
        img.set_len(1024).expect("set_len");
        img
    }

    #[test]
    fn positioned_write_then_read_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let img = image_in(&dir);

        img.write_all_at(100, b"hello").expect("write");
        let mut buf = [0_u8; 5];
        img.read_exact_at(100, &mut buf).expect("read");
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let img = image_in(&dir);

        let mut buf = [0_u8; 8];
        assert!(img.read_exact_at(1020, &mut buf).is_err());
        assert!(img.write_all_at(1020, &buf).is_err());
        // Boundary itself is fine.
        assert!(img.write_all_at(1016, &buf).is_ok());
    }

    #[test]
    fn write_zeros_clears_a_range() {
        let dir = TempDir::new().expect("tempdir");
        let img = image_in(&dir);

        img.write_all_at(0, &[0xAA_u8; 600]).expect("fill");
        img.write_zeros_at(10, 580).expect("zero");

        let mut buf = [0_u8; 600];
        img.read_exact_at(0, &mut buf).expect("read");
        assert!(buf[..10].iter().all(|&b| b == 0xAA));
        assert!(buf[10..590].iter().all(|&b| b == 0));
        assert!(buf[590..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn read_only_open_rejects_writes() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("disk.img");
        drop(image_in(&dir));

        let ro = DiskImage::open_read_only(&path).expect("open ro");
        assert_eq!(ro.len(), 1024);
        assert!(ro.write_all_at(0, b"x").is_err());
        let mut buf = [0_u8; 4];
        assert!(ro.read_exact_at(0, &mut buf).is_ok());
    }

    #[test]
    fn fresh_image_is_empty_until_sized() {
        let dir = TempDir::new().expect("tempdir");
        let img = DiskImage::open(dir.path().join("new.img")).expect("open");
        assert!(img.is_empty());
    }
}
