use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use libc::{c_ulong, c_void};

use super::RawDevice;
use crate::ioctl::IoctlLong;

pub(crate) type ControlHandler =
    Box<dyn FnMut(IoctlLong, *mut c_void) -> io::Result<i32> + Send>;

#[derive(Default)]
pub(crate) struct MockState {
    // Scripted replies for read(). Once drained, the last reply repeats.
    pub reads: VecDeque<Vec<u8>>,
    pub last_read: Vec<u8>,
    pub written: Vec<Vec<u8>>,
    // Accept at most this many bytes per write() call.
    pub write_limit: Option<usize>,
    pub controls: Vec<IoctlLong>,
    pub control_values: Vec<(IoctlLong, c_ulong)>,
    pub handler: Option<ControlHandler>,
    pub rewinds: usize,
    pub read_error: Option<io::ErrorKind>,
    // Every read() call, including failed ones
    pub read_attempts: usize,
}

/// A scripted stand-in for a device node. Clones share state, so a test
/// can keep one clone for inspection after handing the other away.
#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> MockDevice {
        MockDevice::default()
    }

    pub fn with_reads<I, B>(reads: I) -> MockDevice
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let device = MockDevice::new();
        device.state().reads = reads.into_iter().map(|r| r.as_ref().to_vec()).collect();
        device
    }

    pub fn with_handler<F>(handler: F) -> MockDevice
    where
        F: FnMut(IoctlLong, *mut c_void) -> io::Result<i32> + Send + 'static,
    {
        let device = MockDevice::new();
        device.state().handler = Some(Box::new(handler));
        device
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn boxed(&self) -> Box<dyn RawDevice> {
        Box::new(self.clone())
    }
}

impl RawDevice for MockDevice {
    fn read(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut state = self.state();
        state.read_attempts += 1;
        if let Some(kind) = state.read_error {
            return Err(io::Error::from(kind));
        }

        if let Some(reply) = state.reads.pop_front() {
            state.last_read = reply;
        }

        let mut reply = state.last_read.clone();
        reply.truncate(len);

        Ok(reply)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        let count = state.write_limit.map_or(data.len(), |l| l.min(data.len()));
        state.written.push(data[..count].to_vec());

        Ok(count)
    }

    unsafe fn control(&mut self, request: IoctlLong, arg: *mut c_void) -> io::Result<i32> {
        let mut state = self.state();
        state.controls.push(request);

        match state.handler {
            Some(ref mut handler) => handler(request, arg),
            None => Ok(0),
        }
    }

    unsafe fn control_value(&mut self, request: IoctlLong, value: c_ulong) -> io::Result<i32> {
        self.state().control_values.push((request, value));

        Ok(0)
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if !self.state().reads.is_empty() {
            return Ok(true);
        }

        thread::sleep(timeout);

        Ok(false)
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.state().rewinds += 1;

        Ok(())
    }
}
