// i2c_lps25h.rs - Powers up an STMicroelectronics LPS25H barometer, and
// prints its pressure readings once per second until interrupted.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use simple_signal::{self, Signal};
use tracing::info;

use sbcio::bytes;
use sbcio::i2c::I2c;

// LPS25H I2C slave address (SA0 pulled high).
const ADDR_LPS25H: u16 = 0x5d;

// LPS25H register addresses. Setting bit 7 auto-increments the register
// address during multi-byte reads.
const REG_WHO_AM_I: u8 = 0x0f;
const REG_CTRL_REG1: u8 = 0x20;
const REG_PRESS_OUT_XL: u8 = 0x28;
const AUTO_INCREMENT: u8 = 0x80;

// Expected WHO_AM_I contents.
const LPS25H_ID: u8 = 0xbd;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let mut i2c = I2c::new()?;

    let id = i2c.read(ADDR_LPS25H, 1, &[REG_WHO_AM_I])?;
    if id[0] != LPS25H_ID {
        return Err(format!("unexpected device id: {:#04x}", id[0]).into());
    }

    // Power on, 1 Hz output data rate.
    i2c.write(ADDR_LPS25H, &bytes![REG_CTRL_REG1, 0x90]?)?;

    let running = Arc::new(AtomicBool::new(true));

    simple_signal::set_handler(&[Signal::Int, Signal::Term], {
        let running = running.clone();
        move |_| {
            running.store(false, Ordering::SeqCst);
        }
    });

    while running.load(Ordering::SeqCst) {
        let raw = i2c.read(ADDR_LPS25H, 3, &[REG_PRESS_OUT_XL | AUTO_INCREMENT])?;
        let counts = u32::from(raw[0]) | (u32::from(raw[1]) << 8) | (u32::from(raw[2]) << 16);

        info!(pressure_hpa = f64::from(counts) / 4096.0, "sample");

        thread::sleep(Duration::from_secs(1));
    }

    // Power down.
    i2c.write(ADDR_LPS25H, &bytes![REG_CTRL_REG1, 0x00]?)?;

    Ok(())
}
