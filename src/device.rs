//! Raw access to kernel device nodes and sysfs attributes.
//!
//! [`RawDevice`] is the seam between the bus and line handles and the
//! kernel. [`DevNode`] implements it for an open file, and test code can
//! substitute a stub that plays the kernel's part.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use libc::{c_ulong, c_void};

use crate::ioctl::IoctlLong;

#[cfg(test)]
pub(crate) mod mock;

/// An open, bidirectional, unbuffered byte channel bound to a device node
/// or sysfs attribute.
pub trait RawDevice: Send {
    /// Reads up to `len` bytes.
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>>;

    /// Writes `data`, returning how many bytes the kernel accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Issues an ioctl() whose argument is a pointer to a payload.
    ///
    /// # Safety
    ///
    /// `arg` must point to a payload with the layout `request` expects, and
    /// every buffer the payload references must stay valid and in place
    /// until this call returns.
    unsafe fn control(&mut self, request: IoctlLong, arg: *mut c_void) -> io::Result<i32>;

    /// Issues an ioctl() whose argument is passed by value.
    ///
    /// # Safety
    ///
    /// `request` must be a request that interprets its argument as an
    /// integer rather than as a pointer.
    unsafe fn control_value(&mut self, request: IoctlLong, value: c_ulong) -> io::Result<i32>;

    /// Blocks until the kernel signals a change, or `timeout` elapses.
    ///
    /// Returns `true` if a change was signalled.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Resets the read/write position to the start of the file.
    fn rewind(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A [`RawDevice`] backed by an open device node or sysfs attribute.
pub struct DevNode {
    path: PathBuf,
    file: File,
}

impl DevNode {
    /// Opens `path` for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<DevNode> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(DevNode { path, file })
    }

    /// Returns the path this node was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawDevice for DevNode {
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let count = self.file.read(&mut buffer)?;
        buffer.truncate(count);

        Ok(buffer)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }

    unsafe fn control(&mut self, request: IoctlLong, arg: *mut c_void) -> io::Result<i32> {
        parse_retval!(libc::ioctl(self.file.as_raw_fd(), request, arg))
    }

    unsafe fn control_value(&mut self, request: IoctlLong, value: c_ulong) -> io::Result<i32> {
        parse_retval!(libc::ioctl(self.file.as_raw_fd(), request, value))
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        // sysfs attributes signal a change through POLLPRI and POLLERR. They
        // always report POLLIN, so it isn't requested.
        let mut fds = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLPRI | libc::POLLERR,
            revents: 0,
        };

        let timeout = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        loop {
            match parse_retval!(unsafe { libc::poll(&mut fds, 1, timeout) }) {
                Ok(count) => return Ok(count > 0),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;

        Ok(())
    }
}

impl fmt::Debug for DevNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevNode")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn open_missing_node_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = DevNode::open(dir.path().join("i2c-9")).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn rewind_allows_rereading_an_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, b"1\n").unwrap();

        let mut node = DevNode::open(&path).unwrap();
        assert_eq!(node.read(10).unwrap(), b"1\n");
        assert!(node.read(10).unwrap().is_empty());

        node.rewind().unwrap();
        assert_eq!(node.read(1).unwrap(), b"1");
    }

    #[test]
    fn write_then_rewind_overwrites_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, b"0").unwrap();

        let mut node = DevNode::open(&path).unwrap();
        assert_eq!(node.write(b"1").unwrap(), 1);
        node.rewind().unwrap();
        assert_eq!(node.write(b"0").unwrap(), 1);

        assert_eq!(fs::read(&path).unwrap(), b"0");
        assert_eq!(node.path(), path.as_path());
    }

    #[test]
    fn regular_files_never_signal_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, b"0").unwrap();

        let mut node = DevNode::open(&path).unwrap();
        assert!(!node.wait_readable(Duration::from_millis(10)).unwrap());
    }
}
