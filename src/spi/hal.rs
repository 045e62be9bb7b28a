use embedded_hal::spi::{self, ErrorType, SpiBus};

use super::{Error, Spi};

impl ErrorType for Spi {
    type Error = Error;
}

impl spi::Error for Error {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// `SpiBus` trait implementation for `embedded-hal` v1.0.0.
impl SpiBus<u8> for Spi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        // A full-duplex transfer guarantees every byte is clocked in
        let reply = Spi::transfer(self, &[], words.len())?;
        words.copy_from_slice(&reply);

        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        Spi::write(self, words)?;

        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        // The longer of the two buffers determines the transfer length. Extra
        // outgoing words are zero, extra incoming words are discarded.
        let extra_read_len = read.len().saturating_sub(write.len());
        let reply = Spi::transfer(self, write, extra_read_len)?;
        read.copy_from_slice(&reply[..read.len()]);

        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        let reply = Spi::transfer(self, words, 0)?;
        words.copy_from_slice(&reply);

        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
