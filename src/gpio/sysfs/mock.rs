use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Mutex, MutexGuard};

use super::{Attributes, Direction, Trigger};
use crate::device::mock::MockDevice;
use crate::device::RawDevice;

#[derive(Default)]
pub(crate) struct MockTree {
    pub exported: HashSet<u32>,
    // Remaining set_direction() calls that fail with NotFound, per line
    pub direction_failures: HashMap<u32, usize>,
    pub exports: Vec<u32>,
    pub unexports: Vec<u32>,
    pub directions: Vec<(u32, Direction)>,
    pub edges: Vec<(u32, Trigger)>,
    // Every open value attribute of a line shares one scripted device
    pub values: HashMap<u32, MockDevice>,
}

/// An in-memory attribute tree. Lines behave like real sysfs lines:
/// their attributes only exist once they're exported.
#[derive(Default)]
pub(crate) struct MockAttributes {
    tree: Mutex<MockTree>,
}

impl MockAttributes {
    pub fn new() -> MockAttributes {
        MockAttributes::default()
    }

    pub fn tree(&self) -> MutexGuard<'_, MockTree> {
        self.tree.lock().unwrap()
    }

    pub fn fail_direction(&self, pin: u32, count: usize) {
        self.tree().direction_failures.insert(pin, count);
    }

    /// Queues levels for the value attribute of `pin`.
    pub fn script_value<I>(&self, pin: u32, levels: I)
    where
        I: IntoIterator<Item = &'static str>,
    {
        let device = self.value(pin);
        device
            .state()
            .reads
            .extend(levels.into_iter().map(|l| l.as_bytes().to_vec()));
    }

    pub fn value(&self, pin: u32) -> MockDevice {
        self.tree().values.entry(pin).or_default().clone()
    }

    pub fn value_writes(&self, pin: u32) -> Vec<String> {
        self.value(pin)
            .state()
            .written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

fn not_found(pin: u32) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("gpio{} isn't exported", pin))
}

impl Attributes for MockAttributes {
    fn export(&self, pin: u32) -> io::Result<()> {
        let mut tree = self.tree();
        tree.exports.push(pin);
        tree.exported.insert(pin);

        Ok(())
    }

    fn unexport(&self, pin: u32) -> io::Result<()> {
        let mut tree = self.tree();
        tree.unexports.push(pin);

        if tree.exported.remove(&pin) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        }
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> io::Result<()> {
        let mut tree = self.tree();

        if let Some(remaining) = tree.direction_failures.get_mut(&pin) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(not_found(pin));
            }
        }

        if !tree.exported.contains(&pin) {
            return Err(not_found(pin));
        }

        tree.directions.push((pin, direction));

        Ok(())
    }

    fn set_edge(&self, pin: u32, trigger: Trigger) -> io::Result<()> {
        let mut tree = self.tree();
        if !tree.exported.contains(&pin) {
            return Err(not_found(pin));
        }

        tree.edges.push((pin, trigger));

        Ok(())
    }

    fn open_value(&self, pin: u32) -> io::Result<Box<dyn RawDevice>> {
        if !self.tree().exported.contains(&pin) {
            return Err(not_found(pin));
        }

        Ok(self.value(pin).boxed())
    }
}
