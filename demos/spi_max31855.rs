// spi_max31855.rs - Reads the thermocouple and cold-junction temperatures
// from a Maxim Integrated MAX31855 converter using SPI.

use std::error::Error;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use sbcio::spi::{Mode, Spi, SpiOptions};

// MAX31855 fault bits.
const FAULT: u32 = 1 << 16;
const FAULT_OPEN: u32 = 1 << 0;
const FAULT_SHORT_GND: u32 = 1 << 1;
const FAULT_SHORT_VCC: u32 = 1 << 2;

// The thermocouple temperature is a signed 14-bit value in 0.25 °C steps.
fn thermocouple(frame: u32) -> f64 {
    f64::from((frame as i32) >> 18) * 0.25
}

// The internal temperature is a signed 12-bit value in 0.0625 °C steps.
fn internal(frame: u32) -> f64 {
    f64::from(((frame << 16) as i32) >> 20) * 0.0625
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    // The MAX31855 is read-only, so a half-duplex read is enough. It
    // supports clock speeds up to 5 MHz.
    let mut spi = Spi::with_options(
        "/dev/spidev0.0",
        SpiOptions {
            clock_speed: 5_000_000,
            mode: Mode::Mode0,
            ..SpiOptions::default()
        },
    )?;

    for _ in 0..10 {
        let reply = spi.read(4)?;
        if reply.len() < 4 {
            warn!(len = reply.len(), "short read");
            continue;
        }

        let frame = u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]);

        if frame & FAULT != 0 {
            warn!(
                open = frame & FAULT_OPEN != 0,
                short_gnd = frame & FAULT_SHORT_GND != 0,
                short_vcc = frame & FAULT_SHORT_VCC != 0,
                "thermocouple fault"
            );
        } else {
            info!(
                thermocouple_c = thermocouple(frame),
                internal_c = internal(frame),
                "sample"
            );
        }

        thread::sleep(Duration::from_millis(500));
    }

    Ok(())
}
