//! Test doubles shared by the unit tests of this crate.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::Interrupted;
use crate::monitor::MonitorWait;
use crate::time::{Clock, ParkTimeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Wait(Duration),
    Sleep(Duration),
    Park(ParkTimeout),
}

/// A clock whose readings are set by the test and whose blocking operations
/// return immediately after being recorded.
#[derive(Debug)]
pub struct RecordingClock {
    wall: AtomicI64,
    mono: AtomicU64,
    start: AtomicI64,
    calls: Mutex<Vec<Call>>,
}

impl RecordingClock {
    pub fn new(wall: i64, mono: u64, start: i64) -> Self {
        Self {
            wall: AtomicI64::new(wall),
            mono: AtomicU64::new(mono),
            start: AtomicI64::new(start),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_wall(&self, wall: i64) {
        self.wall.store(wall, Ordering::SeqCst);
    }

    pub fn set_mono(&self, mono: u64) {
        self.mono.store(mono, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl fmt::Display for RecordingClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordingClock")
    }
}

impl Clock for RecordingClock {
    fn wall_millis(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.mono.load(Ordering::SeqCst)
    }

    fn process_start_millis(&self, _host_start: i64) -> i64 {
        self.start.load(Ordering::SeqCst)
    }

    fn wait(&self, _monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        self.calls.lock().push(Call::Wait(timeout));
        Ok(())
    }

    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.calls.lock().push(Call::Sleep(duration));
        Ok(())
    }

    fn park(&self, timeout: ParkTimeout) {
        self.calls.lock().push(Call::Park(timeout));
    }
}
