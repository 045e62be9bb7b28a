use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::debug;

use super::interrupt::EdgeMonitor;
use super::sysfs::{self, Attributes, Direction, Trigger};
use super::{Edge, Error, EventOptions, Level, Mode, Result};
use crate::device::RawDevice;

/// A single GPIO line.
///
/// A `Pin` is created through [`Gpio::get`](super::Gpio::get). While the
/// line is claimed, the `Pin` keeps its `value` attribute open.
///
/// Dropping a `Pin` stops its edge event watcher, but leaves the line
/// claimed. Release it explicitly with `set_mode(Mode::UNUSED)`.
pub struct Pin {
    pin: u32,
    attrs: Arc<dyn Attributes>,
    direction: Option<Direction>,
    value: Option<Box<dyn RawDevice>>,
    options: EventOptions,
    monitor: Option<EdgeMonitor>,
}

impl Pin {
    pub(crate) fn new(pin: u32, attrs: Arc<dyn Attributes>) -> Pin {
        Pin {
            pin,
            attrs,
            direction: None,
            value: None,
            options: EventOptions::default(),
            monitor: None,
        }
    }

    /// Returns the GPIO line number.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Returns the current direction, combined with `EDGE_RISE` and/or
    /// `EDGE_FALL` if edge callbacks are registered.
    ///
    /// An unclaimed line returns `Mode::UNUSED`.
    pub fn mode(&self) -> Mode {
        let mut mode = match self.direction {
            Some(Direction::In) => Mode::IN,
            Some(Direction::Out) => Mode::OUT,
            None => Mode::UNUSED,
        };

        if let Some(ref monitor) = self.monitor {
            if monitor.has_rising() {
                mode |= Mode::EDGE_RISE;
            }

            if monitor.has_falling() {
                mode |= Mode::EDGE_FALL;
            }
        }

        mode
    }

    /// Claims the line as an input or output, or releases it.
    ///
    /// `Mode::IN` and `Mode::OUT` claim the line, exporting it first if
    /// needed. `Mode::UNUSED` stops the edge event watcher and releases
    /// the line. Releasing a line that isn't claimed succeeds.
    ///
    /// Pull-up, pull-down, tri-state and open-drain flags fail with
    /// [`Error::UnsupportedMode`], and modes that don't select exactly one
    /// direction fail with [`Error::InvalidMode`]. Neither touches the
    /// line. A line with edge callbacks can't be switched to an output.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if mode == Mode::UNUSED {
            self.release();
            return Ok(());
        }

        if mode.intersects(Mode::UNSUPPORTED) {
            return Err(Error::UnsupportedMode(mode));
        }

        if mode.intersects(Mode::EDGES) {
            return Err(Error::InvalidMode(mode));
        }

        let direction = mode & Mode::DIRECTION;
        let direction = if direction == Mode::IN {
            Direction::In
        } else if direction == Mode::OUT {
            Direction::Out
        } else {
            return Err(Error::InvalidMode(mode));
        };

        if direction == Direction::Out && self.monitor.is_some() {
            return Err(Error::InvalidMode(mode));
        }

        self.claim(direction)
    }

    fn claim(&mut self, direction: Direction) -> Result<()> {
        let pin = self.pin;
        let claim_error = |source| Error::Claim { pin, source };

        // The attributes of a line that isn't exported don't exist. Export
        // it and try again, but only once.
        match self.attrs.set_direction(pin, direction) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                self.attrs.export(pin).map_err(claim_error)?;
                self.attrs
                    .set_direction(pin, direction)
                    .map_err(claim_error)?;
            }
            Err(e) => return Err(claim_error(e)),
        }

        if self.value.is_none() {
            self.value = Some(self.attrs.open_value(pin).map_err(claim_error)?);
        }

        self.direction = Some(direction);

        debug!(pin, ?direction, "claimed");

        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }

        self.value = None;
        self.direction = None;

        // Already released lines fail to unexport
        if let Err(e) = self.attrs.unexport(self.pin) {
            debug!(pin = self.pin, error = %e, "unexport failed");
        }

        debug!(pin = self.pin, "released");
    }

    fn value(&mut self) -> Result<&mut dyn RawDevice> {
        match self.value {
            Some(ref mut value) => Ok(value.as_mut()),
            None => Err(Error::NotClaimed(self.pin)),
        }
    }

    /// Reads the pin's logic level.
    pub fn read(&mut self) -> Result<Level> {
        Ok(sysfs::read_level(self.value()?)?)
    }

    /// Reads the pin's logic level, and returns `true` if it's set to [`Level::Low`].
    #[inline]
    pub fn is_low(&mut self) -> Result<bool> {
        Ok(self.read()? == Level::Low)
    }

    /// Reads the pin's logic level, and returns `true` if it's set to [`Level::High`].
    #[inline]
    pub fn is_high(&mut self) -> Result<bool> {
        Ok(self.read()? == Level::High)
    }

    /// Sets the pin's logic level to 0 (low) or 1 (high).
    ///
    /// Any other value fails with [`Error::InvalidLevel`] without writing
    /// anything.
    pub fn write(&mut self, value: u8) -> Result<()> {
        let level = Level::try_from(value)?;

        self.set_level(level)
    }

    /// Sets the pin's logic level.
    pub fn set_level(&mut self, level: Level) -> Result<()> {
        Ok(sysfs::write_level(self.value()?, level)?)
    }

    /// Sets the pin's logic level to [`Level::Low`].
    #[inline]
    pub fn set_low(&mut self) -> Result<()> {
        self.set_level(Level::Low)
    }

    /// Sets the pin's logic level to [`Level::High`].
    #[inline]
    pub fn set_high(&mut self) -> Result<()> {
        self.set_level(Level::High)
    }

    /// Returns the timing used by the edge event watcher.
    pub fn event_options(&self) -> EventOptions {
        self.options
    }

    /// Changes the timing used by the edge event watcher.
    ///
    /// The watcher is started with the options that were set when the
    /// first callback was registered. Later changes only apply after the
    /// line has been released and reclaimed.
    pub fn set_event_options(&mut self, options: EventOptions) {
        self.options = options;
    }

    /// Registers `callback` to be called when `edge` occurs.
    ///
    /// The callback receives the new level. The first registration on a
    /// pin configures the line to signal both edges, samples the current
    /// level as the starting point, and starts the pin's watcher thread.
    /// Later registrations are appended to the existing callbacks.
    ///
    /// Only input pins support edge callbacks. Other pins fail with
    /// [`Error::NotInput`].
    pub fn on_edge<C>(&mut self, edge: Edge, callback: C) -> Result<()>
    where
        C: FnMut(Level) + Send + 'static,
    {
        if self.direction != Some(Direction::In) {
            return Err(Error::NotInput(self.pin));
        }

        if let Some(ref mut monitor) = self.monitor {
            monitor.register(edge, Box::new(callback));
            return Ok(());
        }

        self.attrs.set_edge(self.pin, Trigger::Both)?;
        let baseline = self.read()?;

        // The watcher polls its own handle
        let value = self.attrs.open_value(self.pin)?;

        let mut monitor = EdgeMonitor::new(self.pin, self.options);
        monitor.register(edge, Box::new(callback));
        monitor.start(value, baseline)?;

        self.monitor = Some(monitor);

        Ok(())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin")
            .field("pin", &self.pin)
            .field("direction", &self.direction)
            .field("claimed", &self.value.is_some())
            .field("options", &self.options)
            .field("monitor", &self.monitor)
            .finish()
    }
}
