use embedded_hal::i2c::{self, ErrorType, I2c as I2cHal, Operation as I2cOperation};

use super::{Error, I2c};
use crate::codec;

impl ErrorType for I2c {
    type Error = Error;
}

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Error::Io(e) => {
                use std::io::ErrorKind::*;

                match e.kind() {
                    InvalidData => i2c::ErrorKind::Bus,
                    WouldBlock => i2c::ErrorKind::ArbitrationLoss,
                    _ => i2c::ErrorKind::Other,
                }
            }
            Error::ShortWrite { .. } => {
                i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Data)
            }
            Error::Codec(codec::Error::Decoding { .. }) => {
                i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Unknown)
            }
            _ => i2c::ErrorKind::Other,
        }
    }
}

/// `I2c` trait implementation for `embedded-hal` v1.0.0.
impl I2cHal for I2c {
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let reply = I2c::read(self, u16::from(address), buffer.len(), &[])?;
        buffer.copy_from_slice(&reply);

        Ok(())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        I2c::write(self, u16::from(address), bytes)?;

        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        // A zero-length read never touches the bus
        if buffer.is_empty() {
            I2c::write(self, u16::from(address), bytes)?;
            return Ok(());
        }

        let reply = I2c::read(self, u16::from(address), buffer.len(), bytes)?;
        buffer.copy_from_slice(&reply);

        Ok(())
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [I2cOperation],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                I2cOperation::Read(buffer) => I2cHal::read(self, address, buffer)?,
                I2cOperation::Write(bytes) => I2cHal::write(self, address, bytes)?,
            }
        }

        Ok(())
    }
}
