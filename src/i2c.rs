//! Interface for I2C buses exposed through `i2cdev`.
//!
//! [`I2c`] talks to slave devices through a `/dev/i2c-N` device node. Every
//! operation takes the slave address as an argument, so a single `I2c` can
//! be shared between drivers for different devices on the same bus.
//!
//! ## Transports
//!
//! By default, reads that are preceded by a write (typically a register
//! address) are issued as a single combined `I2C_RDWR` transaction. No STOP
//! condition is sent in between the write and the read, and the slave
//! address is embedded in each message, so there's no separate address
//! selection step.
//!
//! Some adapters don't implement `I2C_RDWR`. For those, select
//! [`Transport::Sequential`], which selects the slave address with
//! `I2C_SLAVE` and then performs a plain `write()` followed by a
//! plain `read()` on the device node.
//!
//! ## Troubleshooting
//!
//! ### Permission denied
//!
//! If [`new`] or [`with_path`] returns an [`Error::Open`] caused by an
//! `io::ErrorKind::PermissionDenied` error, make sure the file permissions
//! for the device node are correct, and the current user is a member of
//! the `i2c` group.
//!
//! [`new`]: I2c::new
//! [`with_path`]: I2c::with_path

use std::io;
use std::path::{Path, PathBuf};
use std::result;

use tracing::trace;

use crate::codec;
use crate::device::{DevNode, RawDevice};

#[cfg(feature = "hal")]
mod hal;
mod ioctl;

pub use self::ioctl::{encode_combined, I2cPayload, MSG_MAX_LEN};

const DEFAULT_PATH: &str = "/dev/i2c-1";

/// Errors that can occur when accessing an I2C bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device node couldn't be opened.
    #[error("Can't open I2C bus {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid slave address.
    ///
    /// Only 7-bit addresses are supported. Several 7-bit addresses
    /// are reserved, and can't be used as slave addresses. A list of
    /// those reserved addresses can be found [here].
    ///
    /// [here]: https://en.wikipedia.org/wiki/I%C2%B2C#Reserved_addresses_in_7-bit_address_space
    #[error("Invalid slave address: {0}")]
    InvalidSlaveAddress(u16),
    /// The kernel accepted fewer bytes than were submitted.
    ///
    /// Partial writes aren't retried. Resubmit the remainder if needed.
    #[error("Short write: {actual} of {expected} bytes written")]
    ShortWrite { expected: usize, actual: usize },
    /// The transaction couldn't be encoded, or the reply was incomplete.
    #[error(transparent)]
    Codec(#[from] codec::Error),
}

/// Result type returned from methods that can have `i2c::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Selects how a slave device is addressed.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Transport {
    /// Combined `I2C_RDWR` transactions, with the address in every message.
    #[default]
    Combined,
    /// `I2C_SLAVE` followed by plain `write()`/`read()` calls.
    Sequential,
}

/// Provides access to an I2C bus.
///
/// The `embedded-hal` [`i2c::I2c`] trait implementation for `I2c` can be
/// enabled by specifying the optional `hal` feature in the dependency
/// declaration for the `sbcio` crate.
///
/// [`i2c::I2c`]: https://docs.rs/embedded-hal/1/embedded_hal/i2c/trait.I2c.html
pub struct I2c {
    i2cdev: Box<dyn RawDevice>,
    transport: Transport,
    // Last address selected through I2C_SLAVE
    address: Option<u16>,
}

impl I2c {
    /// Constructs a new `I2c` bound to `/dev/i2c-1`, using
    /// [`Transport::Combined`].
    pub fn new() -> Result<I2c> {
        I2c::with_path(DEFAULT_PATH)
    }

    /// Constructs a new `I2c` bound to the device node at `path`, using
    /// [`Transport::Combined`].
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<I2c> {
        let path = path.as_ref();
        let i2cdev = DevNode::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(I2c::with_device(Box::new(i2cdev), Transport::default()))
    }

    /// Constructs a new `I2c` on top of an already opened device.
    pub fn with_device(i2cdev: Box<dyn RawDevice>, transport: Transport) -> I2c {
        I2c {
            i2cdev,
            transport,
            address: None,
        }
    }

    /// Returns the transport used to address slave devices.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Selects the transport used to address slave devices.
    pub fn set_transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    /// Returns the slave address most recently selected with
    /// `I2C_SLAVE`, if any.
    pub fn slave_address(&self) -> Option<u16> {
        self.address
    }

    /// Receives `read_len` bytes from the slave device at `address`.
    ///
    /// If `write_buffer` isn't empty, its contents are sent first. With
    /// [`Transport::Combined`], a repeated START is sent in between the
    /// write and the read instead of a STOP.
    ///
    /// Neither `write_buffer` nor `read_len` can exceed [`MSG_MAX_LEN`]
    /// bytes. A `read_len` of 0 returns an empty buffer without accessing
    /// the bus.
    ///
    /// Sequence: START → Address + Write Bit → Outgoing Bytes → Repeated START →
    /// Address + Read Bit → Incoming Bytes → STOP
    pub fn read(&mut self, address: u16, read_len: usize, write_buffer: &[u8]) -> Result<Vec<u8>> {
        if read_len == 0 {
            return Ok(Vec::new());
        }

        check_address(address)?;

        trace!(
            address,
            write_len = write_buffer.len(),
            read_len,
            transport = ?self.transport,
            "i2c read"
        );

        match self.transport {
            Transport::Combined => {
                let mut payload = encode_combined(address, write_buffer, read_len)?;
                codec::issue(self.i2cdev.as_mut(), &mut payload)?;

                Ok(codec::decode_reply(payload, read_len)?)
            }
            Transport::Sequential => {
                self.select(address)?;
                if !write_buffer.is_empty() {
                    self.write_all(write_buffer)?;
                }

                let reply = self.i2cdev.read(read_len)?;
                if reply.len() != read_len {
                    return Err(codec::Error::Decoding {
                        expected: read_len,
                        actual: reply.len(),
                    }
                    .into());
                }

                Ok(reply)
            }
        }
    }

    /// Sends `write_buffer` to the slave device at `address`.
    ///
    /// Returns how many bytes were written, which is always the length of
    /// `write_buffer`. A short write fails with [`Error::ShortWrite`].
    ///
    /// Sequence: START → Address + Write Bit → Outgoing Bytes → STOP
    pub fn write(&mut self, address: u16, write_buffer: &[u8]) -> Result<usize> {
        check_address(address)?;

        trace!(address, write_len = write_buffer.len(), "i2c write");

        self.select(address)?;
        self.write_all(write_buffer)
    }

    fn write_all(&mut self, buffer: &[u8]) -> Result<usize> {
        let count = self.i2cdev.write(buffer)?;
        if count != buffer.len() {
            return Err(Error::ShortWrite {
                expected: buffer.len(),
                actual: count,
            });
        }

        Ok(count)
    }

    fn select(&mut self, address: u16) -> Result<()> {
        if self.address == Some(address) {
            return Ok(());
        }

        ioctl::set_slave_address(self.i2cdev.as_mut(), address)?;
        self.address = Some(address);

        Ok(())
    }
}

// Filter out reserved, invalid and 10-bit addresses
fn check_address(address: u16) -> Result<()> {
    if address < 8 || (address >> 3) == 0b1111 || address > 0x7F {
        return Err(Error::InvalidSlaveAddress(address));
    }

    Ok(())
}
