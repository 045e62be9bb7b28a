//! Interface for GPIO lines exposed through the sysfs attribute tree.
//!
//! Lines are claimed, configured and released through the attributes
//! under `/sys/class/gpio`. A claimed line is represented by a [`Pin`],
//! which keeps the line's `value` attribute open for level reads and
//! writes.
//!
//! ## Edge events
//!
//! Input pins can notify callbacks when their level changes. The first
//! callback registered through [`Pin::on_edge`] configures the line to
//! signal both edges, and starts a background thread dedicated to that
//! line. After every change the thread waits for a fixed debounce
//! interval before sampling the level, and compares the result with the
//! previous sample. Rising edge callbacks are called when the level went
//! from low to high, falling edge callbacks when it went from high to low.
//!
//! A change that reverts within the debounce interval isn't reported.
//! Callbacks run on the watcher thread, in the order the edges were
//! observed, so a callback that blocks delays the detection of subsequent
//! edges on the same line.
//!
//! ## Unsupported features
//!
//! The sysfs interface has no way to configure the built-in pull-up and
//! pull-down resistors, tri-state or open-drain outputs. Modes that
//! include [`Mode::PULL_UP`], [`Mode::PULL_DOWN`], [`Mode::HIGH_Z`] or
//! [`Mode::OPEN_DRAIN`] are rejected with [`Error::UnsupportedMode`].
//!
//! ## Troubleshooting
//!
//! ### Permission denied
//!
//! Writing to the sysfs attributes requires root privileges, or
//! membership of a group the attributes are assigned to by a udev rule
//! (usually `gpio`). A claim that's rejected for that reason fails with
//! [`Error::Claim`].

use std::fmt;
use std::io;
use std::result;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::device::RawDevice;

#[cfg(feature = "hal")]
mod hal;
mod interrupt;
mod pin;
pub mod sysfs;

pub use self::pin::Pin;
pub use self::sysfs::{Attributes, Direction, Sysfs, Trigger};

/// Errors that can occur when accessing GPIO lines.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The line couldn't be claimed.
    ///
    /// Either exporting the line failed, or its attributes didn't become
    /// writable after it was exported.
    #[error("Can't claim GPIO {pin}: {source}")]
    Claim {
        pin: u32,
        #[source]
        source: io::Error,
    },
    /// Invalid level.
    ///
    /// Only 0 and 1 are valid level values.
    #[error("Invalid level: {0}")]
    InvalidLevel(u8),
    /// Invalid mode.
    ///
    /// The mode doesn't select exactly one direction, or it contains edge
    /// flags, which are managed through [`Pin::on_edge`].
    #[error("Invalid mode: {0:?}")]
    InvalidMode(Mode),
    /// The mode contains flags the sysfs interface can't configure.
    #[error("Unsupported mode: {0:?}")]
    UnsupportedMode(Mode),
    /// Edge callbacks can only be registered on input pins.
    #[error("GPIO {0} isn't configured as an input")]
    NotInput(u32),
    /// The line hasn't been claimed.
    #[error("GPIO {0} isn't claimed")]
    NotClaimed(u32),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type returned from methods that can have `gpio::Error`s.
pub type Result<T> = result::Result<T, Error>;

bitflags! {
    /// Pin mode flags.
    ///
    /// A valid mode passed to [`Pin::set_mode`] contains exactly one of
    /// [`IN`](Mode::IN) or [`OUT`](Mode::OUT), or is
    /// [`UNUSED`](Mode::UNUSED) to release the line.
    /// [`EDGE_RISE`](Mode::EDGE_RISE) and [`EDGE_FALL`](Mode::EDGE_FALL) are
    /// reported by [`Pin::mode`] for edges with registered callbacks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        const IN = 0x01;
        const OUT = 0x02;
        const HIGH_Z = 0x04;
        const PULL_UP = 0x08;
        const PULL_DOWN = 0x10;
        const OPEN_DRAIN = 0x20;
        const EDGE_RISE = 0x40;
        const EDGE_FALL = 0x80;
    }
}

impl Mode {
    /// Releases the line.
    pub const UNUSED: Mode = Mode::empty();

    const DIRECTION: Mode = Mode::IN.union(Mode::OUT);
    const UNSUPPORTED: Mode = Mode::HIGH_Z
        .union(Mode::PULL_UP)
        .union(Mode::PULL_DOWN)
        .union(Mode::OPEN_DRAIN);
    const EDGES: Mode = Mode::EDGE_RISE.union(Mode::EDGE_FALL);
}

/// Pin logic levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl TryFrom<u8> for Level {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            _ => Err(Error::InvalidLevel(value)),
        }
    }
}

impl From<bool> for Level {
    fn from(e: bool) -> Level {
        match e {
            true => Level::High,
            false => Level::Low,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Low => write!(f, "Low"),
            Level::High => write!(f, "High"),
        }
    }
}

/// Edges that can trigger a callback.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Edge {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
    /// Either transition.
    Both,
}

/// Timing used by the edge event watcher.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct EventOptions {
    /// Settle time between a detected change and sampling the new level.
    /// Defaults to 50 ms.
    pub debounce: Duration,
    /// Maximum time to wait for a change before sampling anyway, and
    /// checking whether the watcher should stop. Defaults to 1 s.
    pub poll_timeout: Duration,
}

impl Default for EventOptions {
    fn default() -> EventOptions {
        EventOptions {
            debounce: Duration::from_millis(50),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

/// Provides access to GPIO lines through a shared sysfs attribute tree.
#[derive(Clone)]
pub struct Gpio {
    attrs: Arc<dyn Attributes>,
}

impl Gpio {
    /// Constructs a new `Gpio` using the attribute tree at `/sys/class/gpio`.
    pub fn new() -> Gpio {
        Gpio::with_attributes(Arc::new(Sysfs::new()))
    }

    /// Constructs a new `Gpio` using a custom attribute tree.
    pub fn with_attributes(attrs: Arc<dyn Attributes>) -> Gpio {
        Gpio { attrs }
    }

    /// Returns a [`Pin`] for the line `pin`, configured with `mode`.
    ///
    /// `Mode::UNUSED` returns an unclaimed `Pin`, releasing the line if it
    /// was claimed.
    pub fn get(&self, pin: u32, mode: Mode) -> Result<Pin> {
        let mut pin = Pin::new(pin, Arc::clone(&self.attrs));
        pin.set_mode(mode)?;

        Ok(pin)
    }

    /// Configures the line `pin` without keeping a handle to it.
    ///
    /// The claim persists until the line is released with
    /// `Mode::UNUSED`.
    pub fn set_mode(&self, pin: u32, mode: Mode) -> Result<()> {
        self.get(pin, mode).map(|_| ())
    }

    /// Reads the current level of the claimed line `pin`.
    pub fn read_at(&self, pin: u32) -> Result<Level> {
        let mut value = self.open_value(pin)?;

        Ok(sysfs::read_level(value.as_mut())?)
    }

    /// Returns `true` if the claimed line `pin` reads [`Level::High`].
    pub fn is_high_at(&self, pin: u32) -> Result<bool> {
        Ok(self.read_at(pin)? == Level::High)
    }

    /// Returns `true` if the claimed line `pin` reads [`Level::Low`].
    pub fn is_low_at(&self, pin: u32) -> Result<bool> {
        Ok(self.read_at(pin)? == Level::Low)
    }

    /// Sets the level of the claimed output line `pin`.
    ///
    /// Only 0 and 1 are accepted. Any other value fails with
    /// [`Error::InvalidLevel`] without touching the line.
    pub fn write_at(&self, pin: u32, value: u8) -> Result<()> {
        let level = Level::try_from(value)?;
        let mut device = self.open_value(pin)?;

        Ok(sysfs::write_level(device.as_mut(), level)?)
    }

    fn open_value(&self, pin: u32) -> Result<Box<dyn RawDevice>> {
        match self.attrs.open_value(pin) {
            Ok(value) => Ok(value),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotClaimed(pin)),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Default for Gpio {
    fn default() -> Gpio {
        Gpio::new()
    }
}

impl fmt::Debug for Gpio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gpio")
            .field("attrs", &format_args!("{{ .. }}"))
            .finish()
    }
}
