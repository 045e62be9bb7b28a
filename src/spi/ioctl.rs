use std::fmt;
use std::io;
use std::mem::size_of;

use libc::c_void;

use crate::codec::{self, Payload, PinnedBuffer};
use crate::device::RawDevice;
use crate::ioctl::{request, IoctlLong, DIR_READ, DIR_WRITE};

// Based on spidev.h

const TYPE_SPI: u8 = b'k';

const NR_MESSAGE: u8 = 0;
const NR_MODE: u8 = 1;
const NR_LSB_FIRST: u8 = 2;
const NR_BITS_PER_WORD: u8 = 3;
const NR_MAX_SPEED_HZ: u8 = 4;

pub(crate) const REQ_RD_MODE: IoctlLong = request(DIR_READ, TYPE_SPI, NR_MODE, size_of::<u8>());
const REQ_RD_LSB_FIRST: IoctlLong = request(DIR_READ, TYPE_SPI, NR_LSB_FIRST, size_of::<u8>());
const REQ_RD_BITS_PER_WORD: IoctlLong =
    request(DIR_READ, TYPE_SPI, NR_BITS_PER_WORD, size_of::<u8>());
const REQ_RD_MAX_SPEED_HZ: IoctlLong =
    request(DIR_READ, TYPE_SPI, NR_MAX_SPEED_HZ, size_of::<u32>());

pub(crate) const REQ_WR_MODE: IoctlLong = request(DIR_WRITE, TYPE_SPI, NR_MODE, size_of::<u8>());
const REQ_WR_LSB_FIRST: IoctlLong = request(DIR_WRITE, TYPE_SPI, NR_LSB_FIRST, size_of::<u8>());
const REQ_WR_BITS_PER_WORD: IoctlLong =
    request(DIR_WRITE, TYPE_SPI, NR_BITS_PER_WORD, size_of::<u8>());
pub(crate) const REQ_WR_MAX_SPEED_HZ: IoctlLong =
    request(DIR_WRITE, TYPE_SPI, NR_MAX_SPEED_HZ, size_of::<u32>());

// SPI_IOC_MESSAGE(1)
pub(crate) const REQ_WR_MESSAGE: IoctlLong =
    request(DIR_WRITE, TYPE_SPI, NR_MESSAGE, size_of::<TransferSegment>());

pub const MODE_CPHA: u8 = 0x01;
pub const MODE_CPOL: u8 = 0x02;

// struct spi_ioc_transfer
#[derive(Debug, Default, Copy, Clone)]
#[repr(C)]
pub(crate) struct TransferSegment {
    // Address of the write buffer, or 0
    tx_buf: u64,
    // Address of the read buffer, or 0
    rx_buf: u64,
    len: u32,
    // Per-transfer overrides. 0 uses the device settings.
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

#[cfg(test)]
impl TransferSegment {
    pub(crate) fn tx_buf(&self) -> *const u8 {
        self.tx_buf as usize as *const u8
    }

    pub(crate) fn rx_buf(&self) -> *mut u8 {
        self.rx_buf as usize as *mut u8
    }

    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }
}

/// A single full-duplex SPI transfer, ready to be issued with
/// `SPI_IOC_MESSAGE(1)`.
///
/// The transmit and receive buffers are pinned and owned by the payload,
/// and always have the same length.
pub struct SpiPayload {
    segment: TransferSegment,
    tx: PinnedBuffer,
    rx: PinnedBuffer,
    transferred: Option<usize>,
}

impl SpiPayload {
    /// Returns the number of bytes clocked in each direction.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if the transfer doesn't clock any bytes.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Returns the bytes that will be clocked out.
    pub fn tx(&self) -> &[u8] {
        self.tx.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn segment(&self) -> &TransferSegment {
        &self.segment
    }
}

impl Payload for SpiPayload {
    fn request(&self) -> IoctlLong {
        REQ_WR_MESSAGE
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        &mut self.segment as *mut TransferSegment as *mut c_void
    }

    fn complete(&mut self, retval: i32) {
        // SPI_IOC_MESSAGE returns the number of bytes transferred
        self.transferred = Some(retval.max(0) as usize);
    }

    fn into_reply(self) -> (PinnedBuffer, usize) {
        (self.rx, self.transferred.unwrap_or(0))
    }
}

impl fmt::Debug for SpiPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiPayload")
            .field("segment", &self.segment)
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .field("transferred", &self.transferred)
            .finish()
    }
}

/// Builds a `SPI_IOC_MESSAGE(1)` payload that clocks out `write_buffer`
/// followed by `extra_read_len` zero bytes.
///
/// The receive buffer has room for every byte clocked in, so its first
/// `write_buffer.len()` bytes hold whatever the slave sent while
/// `write_buffer` was clocked out.
pub fn encode_transfer(write_buffer: &[u8], extra_read_len: usize) -> codec::Result<SpiPayload> {
    let total = write_buffer
        .len()
        .checked_add(extra_read_len)
        .and_then(|total| u32::try_from(total).ok())
        .ok_or_else(|| {
            codec::Error::Encoding(format!(
                "transfer length {} + {} doesn't fit in 32 bits",
                write_buffer.len(),
                extra_read_len
            ))
        })?;

    let tx = PinnedBuffer::with_padding(write_buffer, extra_read_len);
    let mut rx = PinnedBuffer::zeroed(total as usize);

    let segment = TransferSegment {
        tx_buf: tx.as_ptr() as usize as u64,
        rx_buf: rx.as_mut_ptr() as usize as u64,
        len: total,
        ..TransferSegment::default()
    };

    Ok(SpiPayload {
        segment,
        tx,
        rx,
        transferred: None,
    })
}

// Reads a single configuration value through a pointer argument.
fn read_value<T: Default>(device: &mut dyn RawDevice, request: IoctlLong) -> io::Result<T> {
    let mut value = T::default();
    unsafe { device.control(request, &mut value as *mut T as *mut c_void)? };

    Ok(value)
}

fn write_value<T>(device: &mut dyn RawDevice, request: IoctlLong, mut value: T) -> io::Result<()> {
    unsafe { device.control(request, &mut value as *mut T as *mut c_void)? };

    Ok(())
}

pub fn mode(device: &mut dyn RawDevice) -> io::Result<u8> {
    read_value(device, REQ_RD_MODE)
}

pub fn set_mode(device: &mut dyn RawDevice, value: u8) -> io::Result<()> {
    write_value(device, REQ_WR_MODE, value)
}

pub fn lsb_first(device: &mut dyn RawDevice) -> io::Result<u8> {
    read_value(device, REQ_RD_LSB_FIRST)
}

pub fn set_lsb_first(device: &mut dyn RawDevice, value: u8) -> io::Result<()> {
    write_value(device, REQ_WR_LSB_FIRST, value)
}

pub fn bits_per_word(device: &mut dyn RawDevice) -> io::Result<u8> {
    read_value(device, REQ_RD_BITS_PER_WORD)
}

pub fn set_bits_per_word(device: &mut dyn RawDevice, value: u8) -> io::Result<()> {
    write_value(device, REQ_WR_BITS_PER_WORD, value)
}

pub fn clock_speed(device: &mut dyn RawDevice) -> io::Result<u32> {
    read_value(device, REQ_RD_MAX_SPEED_HZ)
}

pub fn set_clock_speed(device: &mut dyn RawDevice, value: u32) -> io::Result<()> {
    write_value(device, REQ_WR_MAX_SPEED_HZ, value)
}
