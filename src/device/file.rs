//! File-backed device
//!
//! Regular files are created and sized on open; block devices are used as is.
//! Discards punch holes on Linux and fall back to writing zeros elsewhere.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use super::{check_io, ZoneDevice};
use crate::config::PAGE_SIZE;
use crate::error::{Result, ZoneKvError};
use crate::iobuf::IoBuf;

/// Zeros written per call when hole punching is unavailable
const ZERO_CHUNK: usize = 256 * PAGE_SIZE;

/// Device on top of a file or block device path
pub struct FileDevice {
    file: File,
    path: PathBuf,
    capacity: u64,
    zone_capacity: u64,
}

impl FileDevice {
    /// Open `path`, creating and extending a regular file up to `capacity`
    pub fn open(path: impl AsRef<Path>, capacity: u64, zone_capacity: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let metadata = file.metadata()?;
        if metadata.is_file() && metadata.len() < capacity {
            file.set_len(capacity)?;
        }

        tracing::debug!(
            path = %path.display(),
            capacity,
            zone_capacity,
            "Opened device"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            capacity,
            zone_capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_context(&self, op: &str, offset: u64, err: io::Error) -> ZoneKvError {
        tracing::error!(
            path = %self.path.display(),
            offset,
            errno = err.raw_os_error().unwrap_or(0),
            "Device {} failed: {}",
            op,
            err
        );
        ZoneKvError::Io(io::Error::new(
            err.kind(),
            format!("{} at offset {} failed: {}", op, offset, err),
        ))
    }

    #[cfg(target_os = "linux")]
    fn punch_hole(&self, offset: u64, len: u64) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        let mode = libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE;
        // Safety: the fd stays open for the lifetime of `self.file`.
        let ret = unsafe {
            libc::fallocate(
                self.file.as_raw_fd(),
                mode,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn punch_hole(&self, _offset: u64, _len: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "hole punching unsupported"))
    }

    fn write_zeros(&self, offset: u64, len: u64) -> io::Result<()> {
        let zeros = vec![0u8; ZERO_CHUNK];
        let mut pos = offset;
        let end = offset + len;
        while pos < end {
            let n = ((end - pos) as usize).min(ZERO_CHUNK);
            self.file.write_all_at(&zeros[..n], pos)?;
            pos += n as u64;
        }
        Ok(())
    }
}

impl ZoneDevice for FileDevice {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn zone_capacity(&self) -> u64 {
        self.zone_capacity
    }

    fn write(&self, offset: u64, buf: &IoBuf) -> Result<()> {
        let bytes = buf.as_slice();
        check_io(offset, bytes.len() as u64, self.capacity)?;
        self.file
            .write_all_at(bytes, offset)
            .map_err(|e| self.io_context("write", offset, e))
    }

    fn read(&self, offset: u64, buf: &mut IoBuf) -> Result<()> {
        check_io(offset, buf.capacity() as u64, self.capacity)?;
        self.file
            .read_exact_at(buf.as_full_mut(), offset)
            .map_err(|e| self.io_context("read", offset, e))?;
        buf.fill_to_capacity();
        Ok(())
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        check_io(offset, len, self.capacity)?;
        if let Err(e) = self.punch_hole(offset, len) {
            tracing::debug!(offset, len, "Hole punch unavailable ({}), zero filling", e);
            self.write_zeros(offset, len)
                .map_err(|e| self.io_context("discard", offset, e))?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file
            .sync_data()
            .map_err(|e| self.io_context("sync", 0, e))
    }
}
