//! Passthrough to the host clock.

use std::fmt;
use std::time::Duration;

use crate::error::Interrupted;
use crate::host;
use crate::monitor::MonitorWait;
use crate::time::{Clock, ParkTimeout};

/// The real clock, as perceived by this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl fmt::Display for SystemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SystemClock")
    }
}

impl Clock for SystemClock {
    fn wall_millis(&self) -> i64 {
        host::wall_millis()
    }

    fn monotonic_nanos(&self) -> u64 {
        host::monotonic_nanos()
    }

    fn process_start_millis(&self, host_start: i64) -> i64 {
        host_start
    }

    fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        if timeout.is_zero() {
            monitor.wait_for(None)
        } else {
            monitor.wait_for(Some(timeout))
        }
    }

    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        host::sleep(duration)
    }

    fn park(&self, timeout: ParkTimeout) {
        host::park(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitor;
    use std::time::Instant;

    #[test]
    fn reads_match_host() {
        let clock = SystemClock;
        let before = host::wall_millis();
        let wall = clock.wall_millis();
        assert!(wall >= before && wall <= host::wall_millis());
        assert_eq!(clock.process_start_millis(1234), 1234);
        assert_eq!(clock.to_string(), "SystemClock");
    }

    #[test]
    fn wait_with_timeout_returns() {
        let monitor = Monitor::new(());
        let mut guard = monitor.lock();
        let start = Instant::now();
        SystemClock
            .wait(&mut guard, Duration::from_millis(10))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
