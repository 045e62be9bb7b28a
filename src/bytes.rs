//! Construction of outgoing byte sequences.
//!
//! Devices are usually addressed with a register number followed by a few
//! data bytes, so transactions are often assembled from a mix of single
//! integers and byte strings. [`to_bytes`] flattens such a sequence into
//! one buffer, and rejects any element that doesn't fit in a byte instead
//! of silently truncating it.
//!
//! ```
//! use sbcio::bytes;
//!
//! let out = bytes![0x20, 0x90, b"\x01\x02", "AB"].unwrap();
//! assert_eq!(out, [0x20, 0x90, 0x01, 0x02, 0x41, 0x42]);
//!
//! assert!(bytes![0x20, 256].is_err());
//! ```

use std::borrow::Cow;
use std::result;

/// Errors that can occur when building a byte sequence.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An integer element doesn't fit in a single byte.
    #[error("Value out of byte range: {0}")]
    OutOfRange(i64),
}

/// Result type returned from methods that can have `bytes::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// A single element of an outgoing byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum<'a> {
    /// An integer that must fit in `0..=255`.
    Int(i64),
    /// Raw bytes, copied as-is.
    Bytes(Cow<'a, [u8]>),
}

impl Datum<'_> {
    fn append_to(&self, buffer: &mut Vec<u8>) -> Result<()> {
        match *self {
            Datum::Int(value) => {
                let byte = u8::try_from(value).map_err(|_| Error::OutOfRange(value))?;
                buffer.push(byte);
            }
            Datum::Bytes(ref bytes) => buffer.extend_from_slice(bytes),
        }

        Ok(())
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Datum<'_> {
                fn from(value: $t) -> Self {
                    Datum::Int(value as i64)
                }
            }
        )*
    };
}

impl_from_int!(u8, i8, u16, i16, u32, i32, i64);

impl From<usize> for Datum<'_> {
    fn from(value: usize) -> Self {
        Datum::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl<'a> From<&'a [u8]> for Datum<'a> {
    fn from(value: &'a [u8]) -> Self {
        Datum::Bytes(Cow::Borrowed(value))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Datum<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Datum::Bytes(Cow::Borrowed(&value[..]))
    }
}

impl<'a> From<&'a Vec<u8>> for Datum<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Datum::Bytes(Cow::Borrowed(value.as_slice()))
    }
}

impl From<Vec<u8>> for Datum<'_> {
    fn from(value: Vec<u8>) -> Self {
        Datum::Bytes(Cow::Owned(value))
    }
}

impl<'a> From<&'a str> for Datum<'a> {
    fn from(value: &'a str) -> Self {
        Datum::Bytes(Cow::Borrowed(value.as_bytes()))
    }
}

/// Flattens `items` into a single byte sequence.
///
/// Returns `Err(`[`Error::OutOfRange`]`)` for the first integer element
/// outside `0..=255`.
pub fn to_bytes<'a, I>(items: I) -> Result<Vec<u8>>
where
    I: IntoIterator,
    I::Item: Into<Datum<'a>>,
{
    let mut buffer = Vec::new();
    for item in items {
        item.into().append_to(&mut buffer)?;
    }

    Ok(buffer)
}

/// Builds a byte sequence from a list of mixed integer and byte-string
/// elements. See [`to_bytes`].
#[macro_export]
macro_rules! bytes {
    () => {
        $crate::bytes::to_bytes(::std::iter::empty::<$crate::bytes::Datum<'static>>())
    };
    ($($item:expr),+ $(,)?) => {
        $crate::bytes::to_bytes([$($crate::bytes::Datum::from($item)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_elements_are_concatenated_in_order() {
        let register = vec![0xa8u8];
        let out = to_bytes([
            Datum::from(&register),
            Datum::from(0x01),
            Datum::from("xy"),
            Datum::from(&[0xfeu8, 0xff]),
        ])
        .unwrap();

        assert_eq!(out, [0xa8, 0x01, b'x', b'y', 0xfe, 0xff]);
    }

    #[test]
    fn integers_outside_byte_range_fail_closed() {
        assert_eq!(to_bytes([0x20, 0x100]), Err(Error::OutOfRange(0x100)));
        assert_eq!(to_bytes([-1]), Err(Error::OutOfRange(-1)));
    }

    #[test]
    fn empty_sequence_is_allowed() {
        assert!(bytes![].unwrap().is_empty());
        assert!(to_bytes(Vec::<u8>::new()).unwrap().is_empty());
    }

    #[test]
    fn macro_accepts_mixed_types() {
        let tail: &[u8] = &[3, 4];
        let out = bytes![1u8, 2u16, tail, vec![5u8]].unwrap();

        assert_eq!(out, [1, 2, 3, 4, 5]);
    }
}
