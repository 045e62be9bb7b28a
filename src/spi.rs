//! Interface for SPI buses exposed through `spidev`.
//!
//! [`Spi`] talks to a single slave device through a `/dev/spidevB.C`
//! device node, where B points to an SPI bus, and C to a Chip Enable
//! (Slave Select) line on that bus. The slave device is selected by the
//! node, so unlike I2C, none of the operations take an address.
//!
//! ## Transfers
//!
//! [`read`] and [`write`] are plain half-duplex operations on the device
//! node. While reading, a zero value byte is shifted out for every byte
//! received.
//!
//! [`transfer`] performs a single full-duplex exchange. Every byte shifted
//! out has a corresponding byte shifted in, so the returned buffer starts
//! with whatever the slave sent while the outgoing data was being clocked
//! out, followed by any additional bytes requested. Most devices only
//! respond after receiving a command, in which case the start of the
//! returned buffer can be ignored.
//!
//! ## Buffer size limits
//!
//! By default, spidev can handle up to 4096 bytes in a single transfer.
//! The current limit can be checked with
//! `cat /sys/module/spidev/parameters/bufsiz`, and raised by adding
//! `spidev.bufsiz=65536` to the kernel command line.
//!
//! [`read`]: Spi::read
//! [`write`]: Spi::write
//! [`transfer`]: Spi::transfer

use std::io;
use std::path::{Path, PathBuf};
use std::result;

use tracing::trace;

use crate::codec;
use crate::device::{DevNode, RawDevice};

#[cfg(feature = "hal")]
mod hal;
mod ioctl;

pub use self::ioctl::{encode_transfer, SpiPayload};

const DEFAULT_PATH: &str = "/dev/spidev0.0";

/// Errors that can occur when accessing an SPI bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device node couldn't be opened.
    #[error("Can't open SPI device {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Invalid mode.
    ///
    /// Only the values 0 through 3 select a valid combination of clock
    /// polarity and phase.
    #[error("Invalid mode: {0}")]
    InvalidMode(u8),
    /// The kernel accepted fewer bytes than were submitted.
    #[error("Short write: {actual} of {expected} bytes written")]
    ShortWrite { expected: usize, actual: usize },
    /// The transfer couldn't be encoded, or the reply was incomplete.
    #[error(transparent)]
    Codec(#[from] codec::Error),
    /// The specified number of bits per word isn't supported by the driver.
    #[error("Bits per word value not supported: {0}")]
    BitsPerWordNotSupported(u8),
    /// The specified bit order isn't supported by the driver.
    #[error("Bit order value not supported: {0:?}")]
    BitOrderNotSupported(BitOrder),
    /// The specified clock speed isn't supported by the driver.
    #[error("Clock speed value not supported: {0}")]
    ClockSpeedNotSupported(u32),
    /// The specified mode isn't supported by the driver.
    #[error("Mode value not supported: {0:?}")]
    ModeNotSupported(Mode),
}

/// Result type returned from methods that can have `spi::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// SPI modes indicating the clock polarity and phase.
///
/// Select the appropriate SPI mode for your device. Each mode configures the
/// clock polarity (CPOL) and clock phase (CPHA) as shown below:
///
/// * Mode0: CPOL 0, CPHA 0
/// * Mode1: CPOL 0, CPHA 1
/// * Mode2: CPOL 1, CPHA 0
/// * Mode3: CPOL 1, CPHA 1
///
/// The [`Spi` overview] contains more information on clock polarity and phase.
///
/// [`Spi` overview]: https://en.wikipedia.org/wiki/Serial_Peripheral_Interface_Bus#Clock_polarity_and_phase
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum Mode {
    #[default]
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Mode::Mode0),
            1 => Ok(Mode::Mode1),
            2 => Ok(Mode::Mode2),
            3 => Ok(Mode::Mode3),
            _ => Err(Error::InvalidMode(value)),
        }
    }
}

/// Bit order.
///
/// The bit order determines in what order data is shifted out and shifted in.
/// `MsbFirst` transfers the most-significant bit first. `LsbFirst` transfers
/// the least-significant bit first.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst = 0,
    LsbFirst = 1,
}

/// Settings applied when an [`Spi`] is constructed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct SpiOptions {
    /// Maximum clock frequency in hertz (Hz). Defaults to 1 MHz.
    pub clock_speed: u32,
    /// Clock polarity and phase. Defaults to [`Mode::Mode0`].
    pub mode: Mode,
    /// Defaults to [`BitOrder::MsbFirst`].
    pub bit_order: BitOrder,
    /// Word size. `None` keeps the driver's setting, which is 8 bits
    /// unless another process changed it.
    pub bits_per_word: Option<u8>,
}

impl Default for SpiOptions {
    fn default() -> SpiOptions {
        SpiOptions {
            clock_speed: 1_000_000,
            mode: Mode::Mode0,
            bit_order: BitOrder::MsbFirst,
            bits_per_word: None,
        }
    }
}

/// Provides access to an SPI bus.
///
/// The `embedded-hal` [`spi::SpiBus`] trait implementation for `Spi` can be
/// enabled by specifying the optional `hal` feature in the dependency
/// declaration for the `sbcio` crate.
///
/// [`spi::SpiBus`]: https://docs.rs/embedded-hal/1/embedded_hal/spi/trait.SpiBus.html
pub struct Spi {
    spidev: Box<dyn RawDevice>,
}

impl Spi {
    /// Constructs a new `Spi` bound to `/dev/spidev0.0`, using the default
    /// [`SpiOptions`].
    pub fn new() -> Result<Spi> {
        Spi::with_options(DEFAULT_PATH, SpiOptions::default())
    }

    /// Constructs a new `Spi` bound to the device node at `path`, using the
    /// default [`SpiOptions`].
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Spi> {
        Spi::with_options(path, SpiOptions::default())
    }

    /// Constructs a new `Spi` bound to the device node at `path`, and
    /// applies `options`.
    pub fn with_options<P: AsRef<Path>>(path: P, options: SpiOptions) -> Result<Spi> {
        let path = path.as_ref();
        let spidev = DevNode::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Spi::with_device(Box::new(spidev), options)
    }

    /// Constructs a new `Spi` bound to chip select `unit` of the bus at
    /// `node`, and applies `options`.
    ///
    /// The device node path is `node` followed by `.` and `unit`, so
    /// `("/dev/spidev0", 1)` opens `/dev/spidev0.1`.
    pub fn with_unit<P: AsRef<Path>>(node: P, unit: u8, options: SpiOptions) -> Result<Spi> {
        let mut path = node.as_ref().as_os_str().to_os_string();
        path.push(format!(".{}", unit));

        Spi::with_options(path, options)
    }

    /// Constructs a new `Spi` on top of an already opened device, and
    /// applies `options`.
    pub fn with_device(spidev: Box<dyn RawDevice>, options: SpiOptions) -> Result<Spi> {
        let mut spi = Spi { spidev };

        spi.set_mode(options.mode)?;
        spi.set_clock_speed(options.clock_speed)?;
        if let Some(bits_per_word) = options.bits_per_word {
            spi.set_bits_per_word(bits_per_word)?;
        }
        spi.set_bit_order(options.bit_order)?;

        Ok(spi)
    }

    /// Changes any combination of clock speed, mode and bit order.
    ///
    /// Settings that are `None` are left unchanged. `mode` is validated
    /// before anything is changed, so an invalid mode fails with
    /// [`Error::InvalidMode`] without touching the device.
    pub fn configure(
        &mut self,
        clock_speed: Option<u32>,
        mode: Option<u8>,
        bit_order: Option<BitOrder>,
    ) -> Result<()> {
        let mode = mode.map(Mode::try_from).transpose()?;

        if let Some(clock_speed) = clock_speed {
            self.set_clock_speed(clock_speed)?;
        }

        if let Some(mode) = mode {
            self.set_mode(mode)?;
        }

        if let Some(bit_order) = bit_order {
            self.set_bit_order(bit_order)?;
        }

        Ok(())
    }

    /// Gets the bit order.
    pub fn bit_order(&mut self) -> Result<BitOrder> {
        Ok(match ioctl::lsb_first(self.spidev.as_mut())? {
            0 => BitOrder::MsbFirst,
            _ => BitOrder::LsbFirst,
        })
    }

    /// Sets the order in which bits are shifted out and in.
    ///
    /// Not every controller supports `LsbFirst`. If the driver rejects the
    /// bit order, `set_bit_order` returns
    /// `Err(`[`Error::BitOrderNotSupported`]`)`.
    pub fn set_bit_order(&mut self, bit_order: BitOrder) -> Result<()> {
        match ioctl::set_lsb_first(self.spidev.as_mut(), bit_order as u8) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::BitOrderNotSupported(bit_order))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Gets the bits per word.
    pub fn bits_per_word(&mut self) -> Result<u8> {
        Ok(ioctl::bits_per_word(self.spidev.as_mut())?)
    }

    /// Sets the number of bits per word.
    pub fn set_bits_per_word(&mut self, bits_per_word: u8) -> Result<()> {
        match ioctl::set_bits_per_word(self.spidev.as_mut(), bits_per_word) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::BitsPerWordNotSupported(bits_per_word))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Gets the maximum clock frequency in hertz (Hz).
    pub fn clock_speed(&mut self) -> Result<u32> {
        Ok(ioctl::clock_speed(self.spidev.as_mut())?)
    }

    /// Sets the maximum clock frequency in hertz (Hz).
    ///
    /// The SPI driver will automatically select the closest valid frequency.
    pub fn set_clock_speed(&mut self, clock_speed: u32) -> Result<()> {
        match ioctl::set_clock_speed(self.spidev.as_mut(), clock_speed) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::ClockSpeedNotSupported(clock_speed))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Gets the SPI mode.
    pub fn mode(&mut self) -> Result<Mode> {
        let mode = ioctl::mode(self.spidev.as_mut())?;

        Ok(match mode & (ioctl::MODE_CPOL | ioctl::MODE_CPHA) {
            0x01 => Mode::Mode1,
            0x02 => Mode::Mode2,
            0x03 => Mode::Mode3,
            _ => Mode::Mode0,
        })
    }

    /// Sets the SPI mode.
    ///
    /// Only the clock polarity and phase bits are replaced. Any other flags
    /// the driver has set are left as they are.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let current = ioctl::mode(self.spidev.as_mut())?;

        // Make sure we only replace the CPOL/CPHA bits
        let new_mode = (current & !(ioctl::MODE_CPOL | ioctl::MODE_CPHA)) | (mode as u8);

        match ioctl::set_mode(self.spidev.as_mut(), new_mode) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(Error::ModeNotSupported(mode))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Receives up to `len` bytes from the slave device.
    ///
    /// The SPI protocol doesn't indicate how much incoming data is waiting,
    /// so the caller decides how many bytes to clock in.
    ///
    /// Chip Enable is set to Low (active) at the start of the read, and High
    /// (inactive) when the read completes.
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        trace!(len, "spi read");

        Ok(self.spidev.read(len)?)
    }

    /// Sends `write_buffer` to the slave device, discarding any incoming data.
    ///
    /// Returns how many bytes were written, which is always the length of
    /// `write_buffer`. A short write fails with [`Error::ShortWrite`].
    pub fn write(&mut self, write_buffer: &[u8]) -> Result<usize> {
        trace!(write_len = write_buffer.len(), "spi write");

        let count = self.spidev.write(write_buffer)?;
        if count != write_buffer.len() {
            return Err(Error::ShortWrite {
                expected: write_buffer.len(),
                actual: count,
            });
        }

        Ok(count)
    }

    /// Sends `write_buffer` followed by `extra_read_len` zero bytes in a
    /// single full-duplex transfer.
    ///
    /// Returns every byte shifted in, `write_buffer.len() + extra_read_len`
    /// in total. The first `write_buffer.len()` bytes were received while
    /// `write_buffer` was shifted out.
    ///
    /// Chip Enable is kept Low (active) for the entire transfer.
    pub fn transfer(&mut self, write_buffer: &[u8], extra_read_len: usize) -> Result<Vec<u8>> {
        trace!(write_len = write_buffer.len(), extra_read_len, "spi transfer");

        let mut payload = encode_transfer(write_buffer, extra_read_len)?;
        if payload.is_empty() {
            return Ok(Vec::new());
        }

        let expected_len = payload.len();
        codec::issue(self.spidev.as_mut(), &mut payload)?;

        Ok(codec::decode_reply(payload, expected_len)?)
    }
}

#[cfg(test)]
mod tests {
    use super::ioctl::{
        TransferSegment, REQ_RD_MODE, REQ_WR_MAX_SPEED_HZ, REQ_WR_MESSAGE, REQ_WR_MODE,
    };
    use super::*;

    use std::ptr;
    use std::slice;
    use std::sync::{Arc, Mutex};

    use crate::device::mock::MockDevice;

    fn spi(device: &MockDevice) -> Spi {
        Spi::with_device(device.boxed(), SpiOptions::default()).unwrap()
    }

    #[test]
    fn transfer_returns_echo_and_tail() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_stub = Arc::clone(&seen);

        // Plays spidev: echoes the outgoing bytes, then clocks in 0x42.
        let device = MockDevice::with_handler(move |request, arg| {
            if request != REQ_WR_MESSAGE {
                return Ok(0);
            }

            let segment = unsafe { &*(arg as *const TransferSegment) };
            let tx = unsafe { slice::from_raw_parts(segment.tx_buf(), segment.len()) };
            *seen_by_stub.lock().unwrap() = tx.to_vec();

            let reply = [tx[0], tx[1], 0x42];
            unsafe { ptr::copy_nonoverlapping(reply.as_ptr(), segment.rx_buf(), reply.len()) };

            Ok(segment.len() as i32)
        });

        let mut spi = spi(&device);
        let reply = spi.transfer(&[0x80, 0x30], 1).unwrap();

        assert_eq!(reply.len(), 3);
        assert_eq!(reply[2], 0x42);
        assert_eq!(*seen.lock().unwrap(), [0x80, 0x30, 0x00]);
    }

    #[test]
    fn invalid_mode_touches_nothing() {
        let device = MockDevice::new();
        let mut spi = spi(&device);
        device.state().controls.clear();

        assert!(matches!(
            spi.configure(Some(500_000), Some(4), None),
            Err(Error::InvalidMode(4))
        ));
        assert!(device.state().controls.is_empty());
    }

    #[test]
    fn configure_skips_omitted_settings() {
        let device = MockDevice::new();
        let mut spi = spi(&device);
        device.state().controls.clear();

        spi.configure(Some(500_000), None, None).unwrap();

        assert_eq!(device.state().controls, [REQ_WR_MAX_SPEED_HZ]);
    }

    #[test]
    fn set_mode_keeps_other_flags() {
        let written = Arc::new(Mutex::new(None));
        let written_by_stub = Arc::clone(&written);

        let device = MockDevice::with_handler(move |request, arg| {
            let value = arg as *mut u8;
            if request == REQ_WR_MODE {
                *written_by_stub.lock().unwrap() = Some(unsafe { *value });
            } else if request == REQ_RD_MODE {
                // LSB_FIRST | CPHA
                unsafe { *value = 0x08 | 0x01 };
            }

            Ok(0)
        });

        let mut spi = Spi { spidev: device.boxed() };
        spi.set_mode(Mode::Mode2).unwrap();

        assert_eq!(*written.lock().unwrap(), Some(0x08 | 0x02));
    }

    #[test]
    fn short_write_fails() {
        let device = MockDevice::new();
        device.state().write_limit = Some(2);
        let mut spi = spi(&device);

        assert!(matches!(
            spi.write(&[1, 2, 3]),
            Err(Error::ShortWrite {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn half_duplex_read() {
        let device = MockDevice::with_reads([[0xde, 0xad, 0xbe, 0xefu8]]);
        let mut spi = spi(&device);

        assert_eq!(spi.read(4).unwrap(), [0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn mode_values_above_three_are_invalid() {
        assert_eq!(Mode::try_from(3u8).unwrap(), Mode::Mode3);
        assert!(matches!(Mode::try_from(4u8), Err(Error::InvalidMode(4))));
    }

    #[test]
    fn unit_is_appended_to_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("spidev9");

        match Spi::with_unit(&node, 1, SpiOptions::default()) {
            Err(Error::Open { path, source }) => {
                assert_eq!(path, dir.path().join("spidev9.1"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
