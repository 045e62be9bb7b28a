//! The sysfs GPIO attribute tree.
//!
//! Lines are claimed by writing their number to `export`, which creates a
//! `gpioN` directory holding the `direction`, `edge` and `value`
//! attributes. Writing the number to `unexport` removes it again.

use std::ffi::CString;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::Level;
use crate::device::{DevNode, RawDevice};

#[cfg(test)]
pub(crate) mod mock;

const DEFAULT_ROOT: &str = "/sys/class/gpio";
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(1);

/// Line direction, as written to the `direction` attribute.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Direction::In => b"in",
            Direction::Out => b"out",
        }
    }
}

/// Interrupt trigger conditions, as written to the `edge` attribute.
///
/// The edge event watcher classifies edges itself, so the kernel only
/// needs to signal both.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Trigger {
    Both,
}

impl Trigger {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Trigger::Both => b"both",
        }
    }
}

/// Access to the per-line attributes of a GPIO attribute tree.
///
/// [`Sysfs`] is the implementation used on real hardware.
pub trait Attributes: Send + Sync {
    /// Claims `pin`. Claiming a line that's already claimed succeeds.
    fn export(&self, pin: u32) -> io::Result<()>;

    /// Releases `pin`.
    fn unexport(&self, pin: u32) -> io::Result<()>;

    /// Fails with `io::ErrorKind::NotFound` if `pin` isn't claimed.
    fn set_direction(&self, pin: u32, direction: Direction) -> io::Result<()>;

    fn set_edge(&self, pin: u32, trigger: Trigger) -> io::Result<()>;

    /// Opens the `value` attribute of `pin`.
    fn open_value(&self, pin: u32) -> io::Result<Box<dyn RawDevice>>;
}

/// The attribute tree at `/sys/class/gpio`, or at a custom root.
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
    claim_timeout: Duration,
}

impl Sysfs {
    pub fn new() -> Sysfs {
        Sysfs::with_root(DEFAULT_ROOT)
    }

    /// Uses the attribute tree at `root`.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Sysfs {
        Sysfs {
            root: root.as_ref().to_path_buf(),
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sets how long [`export`](Attributes::export) waits for a newly
    /// exported line's attributes to become writable.
    ///
    /// The attributes are created by the kernel, but their permissions are
    /// usually changed by a udev rule shortly afterwards, so non-root users
    /// can't access them right away. Defaults to 1 s.
    pub fn set_claim_timeout(&mut self, claim_timeout: Duration) {
        self.claim_timeout = claim_timeout;
    }

    pub fn claim_timeout(&self) -> Duration {
        self.claim_timeout
    }

    fn line_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn is_exported(&self, pin: u32) -> bool {
        self.line_dir(pin).exists()
    }

    fn write_attribute(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        OpenOptions::new().write(true).open(path)?.write_all(contents)
    }

    // Waits until the direction attribute can be written by the current user.
    fn wait_writable(&self, pin: u32) -> io::Result<()> {
        let path = CString::new(self.line_dir(pin).join("direction").as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut remaining = self.claim_timeout;
        loop {
            if unsafe { libc::access(path.as_ptr(), libc::W_OK) } == 0 {
                return Ok(());
            }

            if remaining.is_zero() {
                debug!(pin, "direction attribute isn't writable yet");
                return Ok(());
            }

            let delay = remaining.min(CLAIM_POLL_INTERVAL);
            thread::sleep(delay);
            remaining -= delay;
        }
    }
}

impl Default for Sysfs {
    fn default() -> Sysfs {
        Sysfs::new()
    }
}

impl Attributes for Sysfs {
    fn export(&self, pin: u32) -> io::Result<()> {
        // Only export if the pin isn't already exported
        if self.is_exported(pin) {
            return Ok(());
        }

        debug!(pin, "exporting");

        match self.write_attribute(&self.root.join("export"), pin.to_string().as_bytes()) {
            Ok(()) => {}
            // Another process exported it in the meantime
            Err(ref e) if e.raw_os_error() == Some(libc::EBUSY) => {}
            Err(e) => return Err(e),
        }

        self.wait_writable(pin)
    }

    fn unexport(&self, pin: u32) -> io::Result<()> {
        // Only unexport if the pin is actually exported
        if !self.is_exported(pin) {
            return Ok(());
        }

        debug!(pin, "unexporting");

        self.write_attribute(&self.root.join("unexport"), pin.to_string().as_bytes())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> io::Result<()> {
        self.write_attribute(&self.line_dir(pin).join("direction"), direction.as_bytes())
    }

    fn set_edge(&self, pin: u32, trigger: Trigger) -> io::Result<()> {
        self.write_attribute(&self.line_dir(pin).join("edge"), trigger.as_bytes())
    }

    fn open_value(&self, pin: u32) -> io::Result<Box<dyn RawDevice>> {
        Ok(Box::new(DevNode::open(self.line_dir(pin).join("value"))?))
    }
}

/// Reads the level from the start of a `value` attribute.
pub(crate) fn read_level(value: &mut dyn RawDevice) -> io::Result<Level> {
    value.rewind()?;

    match value.read(10)?.first() {
        Some(b'0') => Ok(Level::Low),
        Some(b'1') => Ok(Level::High),
        Some(&byte) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected value attribute contents: {:#04x}", byte),
        )),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "empty value attribute",
        )),
    }
}

/// Writes `level` to the start of a `value` attribute.
pub(crate) fn write_level(value: &mut dyn RawDevice, level: Level) -> io::Result<()> {
    let contents: &[u8] = match level {
        Level::Low => b"0",
        Level::High => b"1",
    };

    value.rewind()?;
    if value.write(contents)? != contents.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            "value attribute rejected the level",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn tree() -> (tempfile::TempDir, Sysfs) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("export"), b"").unwrap();
        fs::write(dir.path().join("unexport"), b"").unwrap();

        let mut sysfs = Sysfs::with_root(dir.path());
        sysfs.set_claim_timeout(Duration::ZERO);

        (dir, sysfs)
    }

    fn add_line(dir: &Path, pin: u32) -> PathBuf {
        let line = dir.join(format!("gpio{}", pin));
        fs::create_dir(&line).unwrap();
        fs::write(line.join("direction"), b"in").unwrap();
        fs::write(line.join("edge"), b"none").unwrap();
        fs::write(line.join("value"), b"0\n").unwrap();

        line
    }

    #[test]
    fn export_writes_line_number() {
        let (dir, sysfs) = tree();

        sysfs.export(17).unwrap();

        assert_eq!(fs::read(dir.path().join("export")).unwrap(), b"17");
    }

    #[test]
    fn exported_lines_are_left_alone() {
        let (dir, sysfs) = tree();
        add_line(dir.path(), 17);

        sysfs.export(17).unwrap();
        assert!(fs::read(dir.path().join("export")).unwrap().is_empty());

        sysfs.unexport(17).unwrap();
        assert_eq!(fs::read(dir.path().join("unexport")).unwrap(), b"17");
    }

    #[test]
    fn unexporting_an_unclaimed_line_does_nothing() {
        let (dir, sysfs) = tree();

        sysfs.unexport(4).unwrap();

        assert!(fs::read(dir.path().join("unexport")).unwrap().is_empty());
    }

    #[test]
    fn direction_of_unclaimed_line_is_not_found() {
        let (_dir, sysfs) = tree();

        let err = sysfs.set_direction(4, Direction::Out).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn attributes_are_written() {
        let (dir, sysfs) = tree();
        let line = add_line(dir.path(), 22);

        sysfs.set_direction(22, Direction::Out).unwrap();
        sysfs.set_edge(22, Trigger::Both).unwrap();

        assert_eq!(fs::read(line.join("direction")).unwrap(), b"out");
        assert_eq!(fs::read(line.join("edge")).unwrap(), b"both");
    }

    #[test]
    fn levels_round_trip_through_value() {
        let (dir, sysfs) = tree();
        let line = add_line(dir.path(), 22);

        let mut value = sysfs.open_value(22).unwrap();
        assert_eq!(read_level(value.as_mut()).unwrap(), Level::Low);

        write_level(value.as_mut(), Level::High).unwrap();
        assert_eq!(read_level(value.as_mut()).unwrap(), Level::High);
        assert_eq!(fs::read(line.join("value")).unwrap(), b"1\n");
    }

    #[test]
    fn unexpected_value_is_invalid_data() {
        let (dir, sysfs) = tree();
        let line = add_line(dir.path(), 22);
        let mut value = sysfs.open_value(22).unwrap();

        for contents in [&b"\n"[..], b"x", b"2\n"] {
            fs::write(line.join("value"), contents).unwrap();

            let err = read_level(value.as_mut()).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        }
    }

    #[test]
    fn empty_value_is_an_error() {
        let (dir, sysfs) = tree();
        let line = add_line(dir.path(), 22);
        fs::write(line.join("value"), b"").unwrap();

        let mut value = sysfs.open_value(22).unwrap();
        let err = read_level(value.as_mut()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
