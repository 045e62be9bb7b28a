use std::fmt;
use std::io;
use std::marker::PhantomData;

use libc::{c_ulong, c_void};

use crate::codec::{self, Payload, PinnedBuffer};
use crate::device::RawDevice;
use crate::ioctl::IoctlLong;

// Based on i2c.h and i2c-dev.h

// ioctl() requests supported by i2cdev
pub(crate) const REQ_SLAVE: IoctlLong = 0x0703; // Set slave address, fails with EBUSY if a driver claimed it
pub(crate) const REQ_RDWR: IoctlLong = 0x0707; // Combined read/write transfer with a single STOP

// i2c_msg flags
pub(crate) const FLAG_RD: u16 = 0x0001; // Read data, from slave to master

// Maximum length of a single message accepted by i2cdev
pub const MSG_MAX_LEN: usize = 8192;

// struct i2c_msg. The explicit padding puts buf at offset 8 on both
// 32-bit and 64-bit targets, matching the kernel's natural alignment.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub(crate) struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    pad: u16,
    buf: *mut u8,
}

#[cfg(test)]
impl I2cMsg {
    pub(crate) fn addr(&self) -> u16 {
        self.addr
    }

    pub(crate) fn flags(&self) -> u16 {
        self.flags
    }

    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }

    pub(crate) fn buf(&self) -> *mut u8 {
        self.buf
    }
}

// struct i2c_rdwr_ioctl_data
#[derive(Debug)]
#[repr(C)]
pub(crate) struct RdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

#[cfg(test)]
impl RdwrIoctlData {
    pub(crate) fn msgs(&self) -> *mut I2cMsg {
        self.msgs
    }

    pub(crate) fn nmsgs(&self) -> usize {
        self.nmsgs as usize
    }
}

/// A combined write-then-read (or read-only) I2C transaction, ready to be
/// issued with `I2C_RDWR`.
///
/// The outgoing data is borrowed for `'a`. The receive buffer and the
/// message array are pinned and owned by the payload.
pub struct I2cPayload<'a> {
    data: RdwrIoctlData,
    msgs: Box<[I2cMsg]>,
    rx: PinnedBuffer,
    completed: Option<usize>,
    write_buffer_lifetime: PhantomData<&'a [u8]>,
}

impl<'a> I2cPayload<'a> {
    /// Returns the number of messages in this transaction.
    pub fn message_count(&self) -> usize {
        self.msgs.len()
    }

    #[cfg(test)]
    pub(crate) fn messages(&self) -> &[I2cMsg] {
        &self.msgs
    }

    #[cfg(test)]
    pub(crate) fn rdwr_data(&self) -> &RdwrIoctlData {
        &self.data
    }
}

impl Payload for I2cPayload<'_> {
    fn request(&self) -> IoctlLong {
        REQ_RDWR
    }

    fn as_mut_ptr(&mut self) -> *mut c_void {
        &mut self.data as *mut RdwrIoctlData as *mut c_void
    }

    fn complete(&mut self, retval: i32) {
        // I2C_RDWR returns the number of messages that were transferred
        self.completed = Some(retval.max(0) as usize);
    }

    fn into_reply(self) -> (PinnedBuffer, usize) {
        let filled = match self.completed {
            Some(count) if count >= self.msgs.len() => self.rx.len(),
            _ => 0,
        };

        (self.rx, filled)
    }
}

impl fmt::Debug for I2cPayload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I2cPayload")
            .field("data", &self.data)
            .field("msgs", &self.msgs)
            .field("rx", &self.rx)
            .field("completed", &self.completed)
            .finish()
    }
}

fn message_len(len: usize, what: &str) -> codec::Result<u16> {
    if len > MSG_MAX_LEN {
        return Err(codec::Error::Encoding(format!(
            "{} length {} exceeds the {} byte limit",
            what, len, MSG_MAX_LEN
        )));
    }

    Ok(len as u16)
}

/// Builds an `I2C_RDWR` payload for `address`.
///
/// A write message carrying `write_buffer` is only included when it isn't
/// empty, and is always followed by a read message for `read_len` bytes,
/// so the payload holds either one or two messages.
pub fn encode_combined(
    address: u16,
    write_buffer: &[u8],
    read_len: usize,
) -> codec::Result<I2cPayload<'_>> {
    let write_len = message_len(write_buffer.len(), "write")?;
    let read_len_u16 = message_len(read_len, "read")?;

    // Allocate the receive buffer before any message refers to it
    let mut rx = PinnedBuffer::zeroed(read_len);

    let mut msgs = Vec::with_capacity(2);
    if !write_buffer.is_empty() {
        msgs.push(I2cMsg {
            addr: address,
            flags: 0,
            len: write_len,
            pad: 0,
            // The kernel only reads from buffers of write messages
            buf: write_buffer.as_ptr() as *mut u8,
        });
    }

    msgs.push(I2cMsg {
        addr: address,
        flags: FLAG_RD,
        len: read_len_u16,
        pad: 0,
        buf: rx.as_mut_ptr(),
    });

    let mut msgs = msgs.into_boxed_slice();
    let data = RdwrIoctlData {
        msgs: msgs.as_mut_ptr(),
        nmsgs: msgs.len() as u32,
    };

    Ok(I2cPayload {
        data,
        msgs,
        rx,
        completed: None,
        write_buffer_lifetime: PhantomData,
    })
}

pub fn set_slave_address(device: &mut dyn RawDevice, address: u16) -> io::Result<i32> {
    unsafe { device.control_value(REQ_SLAVE, c_ulong::from(address)) }
}

// Copies `data` into the buffer of a read message. Used by kernel stubs in tests.
#[cfg(test)]
pub(crate) unsafe fn fill_read_message(msg: &I2cMsg, data: &[u8]) {
    let count = data.len().min(msg.len());
    std::ptr::copy_nonoverlapping(data.as_ptr(), msg.buf(), count);
}
