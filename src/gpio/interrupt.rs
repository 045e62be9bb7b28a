use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, error, warn};

use super::sysfs;
use super::{Edge, EventOptions, Level, Result};
use crate::device::RawDevice;

type Callback = Box<dyn FnMut(Level) + Send>;

#[derive(Default)]
struct Callbacks {
    rising: Vec<Callback>,
    falling: Vec<Callback>,
}

impl Callbacks {
    fn call(&mut self, level: Level) {
        let callbacks = match level {
            Level::High => &mut self.rising,
            Level::Low => &mut self.falling,
        };

        for callback in callbacks.iter_mut() {
            callback(level);
        }
    }
}

/// Watches a single input line for edges, and calls the registered
/// callbacks on a dedicated thread.
pub(crate) struct EdgeMonitor {
    pin: u32,
    options: EventOptions,
    callbacks: Arc<Mutex<Callbacks>>,
    has_rising: bool,
    has_falling: bool,
    stop: Arc<AtomicBool>,
    watcher: Option<thread::JoinHandle<()>>,
}

impl EdgeMonitor {
    pub(crate) fn new(pin: u32, options: EventOptions) -> EdgeMonitor {
        EdgeMonitor {
            pin,
            options,
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            has_rising: false,
            has_falling: false,
            stop: Arc::new(AtomicBool::new(false)),
            watcher: None,
        }
    }

    /// Appends `callback` to the callback lists selected by `edge`.
    ///
    /// A callback registered for `Edge::Both` is called for either edge.
    pub(crate) fn register(&mut self, edge: Edge, callback: Callback) {
        let mut callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.has_rising |= edge != Edge::Falling;
        self.has_falling |= edge != Edge::Rising;

        match edge {
            Edge::Rising => callbacks.rising.push(callback),
            Edge::Falling => callbacks.falling.push(callback),
            Edge::Both => {
                // Both lists call the same closure
                let shared = Arc::new(Mutex::new(callback));
                let rising = Arc::clone(&shared);

                callbacks.rising.push(Box::new(move |level| {
                    let mut callback = rising.lock().unwrap_or_else(PoisonError::into_inner);
                    (*callback)(level)
                }));
                callbacks.falling.push(Box::new(move |level| {
                    let mut callback = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    (*callback)(level)
                }));
            }
        }
    }

    pub(crate) fn has_rising(&self) -> bool {
        self.has_rising
    }

    pub(crate) fn has_falling(&self) -> bool {
        self.has_falling
    }

    pub(crate) fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    #[cfg(test)]
    pub(crate) fn watcher_id(&self) -> Option<thread::ThreadId> {
        self.watcher.as_ref().map(|watcher| watcher.thread().id())
    }

    /// Starts the watcher thread, comparing each sample of `value` against
    /// the previous one, starting with `baseline`.
    pub(crate) fn start(&mut self, mut value: Box<dyn RawDevice>, baseline: Level) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let pin = self.pin;
        let options = self.options;
        let callbacks = Arc::clone(&self.callbacks);
        let stop = Arc::clone(&self.stop);

        let watcher = thread::Builder::new()
            .name(format!("gpio{}-events", pin))
            .spawn(move || watch(pin, value.as_mut(), baseline, options, &callbacks, &stop))?;

        debug!(pin, ?options, "edge monitor started");

        self.watcher = Some(watcher);

        Ok(())
    }

    /// Signals the watcher thread to stop, and waits until it exits.
    ///
    /// Returns within one poll timeout plus one debounce interval, unless
    /// a callback is blocking.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);

        if let Some(watcher) = self.watcher.take() {
            if watcher.join().is_err() {
                error!(pin = self.pin, "edge monitor thread panicked");
            }

            debug!(pin = self.pin, "edge monitor stopped");
        }
    }
}

fn watch(
    pin: u32,
    value: &mut dyn RawDevice,
    baseline: Level,
    options: EventOptions,
    callbacks: &Mutex<Callbacks>,
    stop: &AtomicBool,
) {
    let mut last_level = baseline;

    while !stop.load(Ordering::Acquire) {
        // Times out regularly so the stop flag is checked even when the
        // line is quiet
        if let Err(e) = value.wait_readable(options.poll_timeout) {
            warn!(pin, error = %e, "waiting for an edge failed");
            thread::sleep(options.poll_timeout);
            continue;
        }

        if stop.load(Ordering::Acquire) {
            break;
        }

        if !options.debounce.is_zero() {
            thread::sleep(options.debounce);
        }

        let level = match sysfs::read_level(value) {
            Ok(level) => level,
            Err(e) => {
                // A line that was unexported elsewhere keeps failing, and
                // poll() on it returns immediately
                warn!(pin, error = %e, "reading the level failed");
                thread::sleep(options.poll_timeout);
                continue;
            }
        };

        if level != last_level {
            dispatch(callbacks, level);
        }

        last_level = level;
    }
}

// Calls the callbacks without holding the lock, so registrations made in
// the meantime (including from a callback) don't block. Only the watcher
// thread takes the lists out.
fn dispatch(callbacks: &Mutex<Callbacks>, level: Level) {
    let mut current = mem::take(&mut *callbacks.lock().unwrap_or_else(PoisonError::into_inner));

    current.call(level);

    let mut registered = callbacks.lock().unwrap_or_else(PoisonError::into_inner);
    current.rising.append(&mut registered.rising);
    current.falling.append(&mut registered.falling);
    *registered = current;
}

impl Drop for EdgeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EdgeMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeMonitor")
            .field("pin", &self.pin)
            .field("options", &self.options)
            .field("callbacks", &format_args!("{{ .. }}"))
            .field("watcher", &self.watcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use crate::device::mock::MockDevice;

    fn options() -> EventOptions {
        EventOptions {
            debounce: Duration::ZERO,
            poll_timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn scripted_levels_fire_one_rising_then_one_falling_edge() {
        let (tx, rx) = mpsc::channel();
        let rising_tx = tx.clone();

        let mut monitor = EdgeMonitor::new(17, options());
        monitor.register(
            Edge::Rising,
            Box::new(move |level| rising_tx.send((Edge::Rising, level)).unwrap()),
        );
        monitor.register(
            Edge::Falling,
            Box::new(move |level| tx.send((Edge::Falling, level)).unwrap()),
        );

        let value = MockDevice::with_reads(["0", "0", "1", "1", "0"]);
        monitor.start(value.boxed(), Level::Low).unwrap();

        let timeout = Duration::from_secs(5);
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            (Edge::Rising, Level::High)
        );
        assert_eq!(
            rx.recv_timeout(timeout).unwrap(),
            (Edge::Falling, Level::Low)
        );
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn both_registers_one_callback_on_each_list() {
        let (tx, rx) = mpsc::channel();

        let mut monitor = EdgeMonitor::new(4, options());
        monitor.register(Edge::Both, Box::new(move |level| tx.send(level).unwrap()));

        assert!(monitor.has_rising());
        assert!(monitor.has_falling());

        let value = MockDevice::with_reads(["1", "0", "1"]);
        monitor.start(value.boxed(), Level::Low).unwrap();

        let timeout = Duration::from_secs(5);
        let levels: Vec<Level> = (0..3).map(|_| rx.recv_timeout(timeout).unwrap()).collect();
        assert_eq!(levels, [Level::High, Level::Low, Level::High]);
    }

    #[test]
    fn read_errors_keep_the_watcher_alive() {
        let (tx, rx) = mpsc::channel();

        let mut monitor = EdgeMonitor::new(4, options());
        monitor.register(Edge::Rising, Box::new(move |level| tx.send(level).unwrap()));

        let value = MockDevice::new();
        value.state().read_error = Some(std::io::ErrorKind::Other);
        monitor.start(value.boxed(), Level::Low).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        {
            let mut state = value.state();
            state.read_error = None;
            state.reads.push_back(b"1".to_vec());
        }

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Level::High
        );
    }

    #[test]
    fn persistent_read_errors_back_off() {
        let mut monitor = EdgeMonitor::new(
            4,
            EventOptions {
                debounce: Duration::ZERO,
                poll_timeout: Duration::from_millis(50),
            },
        );

        // Queued reads make every wait return immediately, like poll() on
        // an attribute that was removed
        let value = MockDevice::with_reads(["1"]);
        value.state().read_error = Some(std::io::ErrorKind::NotFound);
        monitor.start(value.boxed(), Level::Low).unwrap();

        std::thread::sleep(Duration::from_millis(120));
        monitor.stop();

        let attempts = value.state().read_attempts;
        assert!(attempts >= 1 && attempts <= 4, "{} read attempts", attempts);
    }

    #[test]
    fn callbacks_run_without_blocking_registration() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();
        let first_tx = tx.clone();

        let mut monitor = EdgeMonitor::new(4, options());
        let mut blocked = false;
        monitor.register(
            Edge::Rising,
            Box::new(move |level| {
                if !blocked {
                    blocked = true;
                    entered_tx.send(()).unwrap();
                    let _ = release_rx.recv_timeout(Duration::from_secs(5));
                }
                first_tx.send((1, level)).unwrap();
            }),
        );

        let value = MockDevice::with_reads(["1"]);
        monitor.start(value.boxed(), Level::Low).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The first callback is still running
        let started = Instant::now();
        monitor.register(
            Edge::Rising,
            Box::new(move |level| tx.send((2, level)).unwrap()),
        );
        assert!(monitor.has_rising());
        assert!(!monitor.has_falling());
        assert!(started.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        let timeout = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (1, Level::High));

        value.state().reads.extend([b"0".to_vec(), b"1".to_vec()]);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (1, Level::High));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (2, Level::High));
    }

    #[test]
    fn drop_joins_the_watcher() {
        let value = MockDevice::with_reads(["0"]);
        let mut monitor = EdgeMonitor::new(4, options());
        monitor.start(value.boxed(), Level::Low).unwrap();
        assert!(monitor.is_running());

        let stop = Arc::clone(&monitor.stop);
        drop(monitor);

        assert!(stop.load(Ordering::Acquire));
    }
}
