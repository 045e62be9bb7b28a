//! sbcio provides access to the GPIO, I2C and SPI peripherals of Linux
//! single-board computers through the kernel's user-space interfaces:
//! the sysfs GPIO attribute tree (`/sys/class/gpio`), the `i2c-dev`
//! character devices (`/dev/i2c-N`) and the `spidev` character devices
//! (`/dev/spidevB.C`).
//!
//! Combined I2C write-then-read transactions and full-duplex SPI transfers
//! are issued as single `ioctl` calls. The binary records handed to the
//! kernel are built by the [`codec`] module, which keeps every buffer the
//! kernel dereferences at a fixed address until the call returns.
//!
//! GPIO input lines can notify registered callbacks about debounced
//! rising and falling edges through a per-line background watcher.
//!
//! The library can be used in conjunction with a variety of
//! platform-agnostic drivers through its `embedded-hal` v1.0 trait
//! implementations, enabled with the optional `hal` feature.

#[macro_use]
mod macros;

pub mod bytes;
pub mod codec;
pub mod device;
pub mod gpio;
pub mod i2c;
mod ioctl;
pub mod spi;

pub use crate::ioctl::IoctlLong;
