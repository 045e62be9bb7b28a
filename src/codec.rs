//! Kernel-facing transaction payloads.
//!
//! Combined I2C transactions and full-duplex SPI transfers are issued as a
//! single ioctl() whose argument is a `#[repr(C)]` record embedding the
//! addresses of the data buffers. The kernel dereferences those addresses
//! during the call, so every buffer must stay at a fixed location from the
//! moment its address is written into a record until the call returns.
//!
//! [`PinnedBuffer`] provides that storage. Payload types (built by the
//! `i2c` and `spi` modules) own their pinned buffers, and [`issue`] is the
//! only place where a payload's address is handed to a [`RawDevice`]. The
//! payload stays mutably borrowed for the duration of the call, and its
//! receive buffer can only be taken out afterwards, through
//! [`decode_reply`].

use std::fmt;
use std::io;
use std::result;

use libc::c_void;

use crate::device::RawDevice;
use crate::ioctl::IoctlLong;

/// Errors that can occur when encoding or decoding a payload.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The transaction can't be expressed in the kernel's record layout.
    #[error("Can't encode transaction: {0}")]
    Encoding(String),
    /// The reply buffer wasn't filled to the expected length.
    #[error("Incomplete reply: expected {expected} bytes, received {actual}")]
    Decoding { expected: usize, actual: usize },
}

/// Result type returned from methods that can have `codec::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// Heap storage whose address doesn't change while it's alive.
///
/// The contents can be read and written, but never resized, so the
/// address returned by [`as_mut_ptr`](Self::as_mut_ptr) stays valid even
/// when the `PinnedBuffer` itself is moved.
pub struct PinnedBuffer {
    data: Box<[u8]>,
}

impl PinnedBuffer {
    /// Allocates `len` zero bytes.
    pub fn zeroed(len: usize) -> PinnedBuffer {
        PinnedBuffer {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Copies `bytes`, followed by `padding` zero bytes.
    pub fn with_padding(bytes: &[u8], padding: usize) -> PinnedBuffer {
        let mut data = Vec::with_capacity(bytes.len() + padding);
        data.extend_from_slice(bytes);
        data.resize(bytes.len() + padding, 0);

        PinnedBuffer {
            data: data.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    /// Releases the storage as a `Vec` without copying.
    pub fn into_vec(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

impl fmt::Debug for PinnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedBuffer")
            .field("addr", &self.data.as_ptr())
            .field("len", &self.data.len())
            .finish()
    }
}

/// A fully built ioctl() argument.
pub trait Payload {
    /// Returns the request code the payload is laid out for.
    fn request(&self) -> IoctlLong;

    /// Returns the address of the top-level record.
    ///
    /// The record, and every buffer it references, is owned by the payload.
    fn as_mut_ptr(&mut self) -> *mut c_void;

    /// Records the value returned by a successful ioctl().
    fn complete(&mut self, retval: i32);

    /// Consumes the payload, returning the receive buffer and the number of
    /// bytes the kernel reported as filled.
    fn into_reply(self) -> (PinnedBuffer, usize);
}

/// Hands `payload` to the kernel through `device`.
pub fn issue<P: Payload>(device: &mut dyn RawDevice, payload: &mut P) -> io::Result<()> {
    let request = payload.request();

    // Safe because the payload owns the record and every pinned buffer it
    // points to, and stays mutably borrowed until control() returns.
    let retval = unsafe { device.control(request, payload.as_mut_ptr())? };
    payload.complete(retval);

    Ok(())
}

/// Extracts the receive buffer from a completed payload.
///
/// Fails with [`Error::Decoding`] unless the buffer holds exactly
/// `expected_len` bytes and the kernel reported all of them filled.
pub fn decode_reply<P: Payload>(payload: P, expected_len: usize) -> Result<Vec<u8>> {
    let (buffer, filled) = payload.into_reply();

    if buffer.len() != expected_len || filled < expected_len {
        return Err(Error::Decoding {
            expected: expected_len,
            actual: filled.min(buffer.len()),
        });
    }

    Ok(buffer.into_vec())
}
