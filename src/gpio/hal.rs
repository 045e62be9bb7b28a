use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin, PinState, StatefulOutputPin};

use super::{Error, Level, Pin};

impl digital::Error for Error {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl From<PinState> for Level {
    fn from(state: PinState) -> Level {
        match state {
            PinState::Low => Level::Low,
            PinState::High => Level::High,
        }
    }
}

/// `ErrorType` trait implementation for `embedded-hal` v1.0.0.
impl ErrorType for Pin {
    type Error = Error;
}

/// `InputPin` trait implementation for `embedded-hal` v1.0.0.
impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Pin::is_high(self)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Pin::is_low(self)
    }
}

/// `OutputPin` trait implementation for `embedded-hal` v1.0.0.
impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Pin::set_low(self)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Pin::set_high(self)
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        Pin::set_level(self, state.into())
    }
}

/// `StatefulOutputPin` trait implementation for `embedded-hal` v1.0.0.
///
/// The state is read back from the line's `value` attribute.
impl StatefulOutputPin for Pin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Pin::is_high(self)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Pin::is_low(self)
    }
}
