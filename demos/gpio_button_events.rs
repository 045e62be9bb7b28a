// gpio_button_events.rs - Toggles an LED every time a push button is
// pressed, until interrupted. The button connects the input line to ground
// and is pulled high by an external resistor, so a press is a falling edge.

use std::error::Error;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use simple_signal::{self, Signal};
use tracing::{info, warn};

use sbcio::gpio::{Edge, EventOptions, Gpio, Level, Mode};

const GPIO_BUTTON: u32 = 17;
const GPIO_LED: u32 = 23;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let gpio = Gpio::new();

    let mut led = gpio.get(GPIO_LED, Mode::OUT)?;
    led.set_low()?;

    let mut button = gpio.get(GPIO_BUTTON, Mode::IN)?;
    button.set_event_options(EventOptions {
        debounce: Duration::from_millis(20),
        ..EventOptions::default()
    });

    // The callback runs on the button's watcher thread, so it drives the
    // LED through the shared attribute tree instead of through `led`.
    let mut lit = false;
    button.on_edge(Edge::Falling, {
        let gpio = gpio.clone();
        move |_| {
            lit = !lit;
            info!(lit, "button pressed");

            if let Err(e) = gpio.write_at(GPIO_LED, Level::from(lit) as u8) {
                warn!(error = %e, "can't drive the LED");
            }
        }
    })?;

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    simple_signal::set_handler(&[Signal::Int, Signal::Term], move |_| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(());
        }
    });

    // Block until a signal arrives, then stop the watcher and release both
    // lines.
    rx.recv()?;
    button.set_mode(Mode::UNUSED)?;
    led.set_mode(Mode::UNUSED)?;

    Ok(())
}
