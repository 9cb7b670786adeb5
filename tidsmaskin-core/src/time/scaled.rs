//! ## tidsmaskin-core::time::scaled
//! **Time running faster or slower than a source clock**
//!
//! A scale above 1 makes this clock run faster than its source; below 1, slower.
//! Reads are scaled relative to the source's readings at construction time.
//! Blocking durations go the other way: a virtual duration `d` is `d / scale`
//! on the source.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ClockError, Interrupted};
use crate::monitor::MonitorWait;
use crate::time::{Clock, ManualClock, ParkTimeout};

#[derive(Debug)]
pub struct ScaledClock {
    source: Arc<dyn Clock>,
    scale: f64,
    ref_wall: i64,
    ref_mono: u64,
}

impl ScaledClock {
    pub fn new(source: Arc<dyn Clock>, scale: f64) -> Result<Self, ClockError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ClockError::invalid(format!(
                "Scale must be positive; was {scale}"
            )));
        }
        let ref_wall = source.wall_millis();
        let ref_mono = source.monotonic_nanos();
        Ok(Self {
            source,
            scale,
            ref_wall,
            ref_mono,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    fn scale_wall(&self, source_wall: i64) -> i64 {
        let elapsed = source_wall.saturating_sub(self.ref_wall) as f64;
        self.ref_wall.saturating_add((elapsed * self.scale) as i64)
    }

    /// Source-clock duration for a virtual duration. Zero stays zero; anything
    /// else stays at least one nanosecond so it never turns into "no timeout".
    fn to_source(&self, duration: Duration) -> Duration {
        if duration.is_zero() {
            return duration;
        }
        let nanos = (duration.as_nanos() as f64 / self.scale) as u64;
        Duration::from_nanos(nanos.max(1))
    }
}

impl fmt::Display for ScaledClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScaledClock{{source={} scale={}}}", self.source, self.scale)
    }
}

impl Clock for ScaledClock {
    fn wall_millis(&self) -> i64 {
        self.scale_wall(self.source.wall_millis())
    }

    fn monotonic_nanos(&self) -> u64 {
        let elapsed = self.source.monotonic_nanos().saturating_sub(self.ref_mono) as f64;
        self.ref_mono.saturating_add((elapsed * self.scale) as u64)
    }

    fn process_start_millis(&self, host_start: i64) -> i64 {
        self.scale_wall(self.source.process_start_millis(host_start))
    }

    fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        self.source.wait(monitor, self.to_source(timeout))
    }

    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.source.sleep(self.to_source(duration))
    }

    fn park(&self, timeout: ParkTimeout) {
        let converted = match timeout {
            ParkTimeout::Indefinite => timeout,
            ParkTimeout::Relative(duration) => ParkTimeout::Relative(self.to_source(duration)),
            ParkTimeout::Absolute(deadline) => {
                // A deadline already past on this clock maps to one already past on the source.
                let remaining = deadline.saturating_sub(self.wall_millis());
                let source_delta = (remaining as f64 / self.scale) as i64;
                ParkTimeout::Absolute(self.source.wall_millis().saturating_add(source_delta))
            }
        };
        self.source.park(converted);
    }

    fn after_install(&self) {
        self.source.after_install();
    }

    fn as_manual(&self) -> Option<&ManualClock> {
        self.source.as_manual()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitor;
    use crate::testing::{Call, RecordingClock};

    fn scaled(scale: f64) -> (Arc<RecordingClock>, ScaledClock) {
        let source = Arc::new(RecordingClock::new(1_000_000, 5_000, 900_000));
        let clock = ScaledClock::new(source.clone(), scale).unwrap();
        (source, clock)
    }

    #[test]
    fn rejects_non_positive_scale() {
        let source: Arc<dyn Clock> = Arc::new(RecordingClock::new(0, 0, 0));
        for scale in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ScaledClock::new(source.clone(), scale),
                Err(ClockError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn reads_scale_elapsed_time() {
        let (source, clock) = scaled(2.0);
        assert_eq!(clock.wall_millis(), 1_000_000);

        source.set_wall(1_000_500);
        source.set_mono(6_000);
        assert_eq!(clock.wall_millis(), 1_001_000);
        assert_eq!(clock.monotonic_nanos(), 7_000);
        // 100s before the reference point is 200s before it at double speed.
        assert_eq!(clock.process_start_millis(0), 800_000);
    }

    #[test]
    fn sleep_divides_by_scale() {
        let (source, clock) = scaled(2.0);
        clock.sleep(Duration::from_millis(1000)).unwrap();
        assert_eq!(source.calls(), vec![Call::Sleep(Duration::from_millis(500))]);
    }

    #[test]
    fn keeps_sub_millisecond_remainder() {
        let (source, clock) = scaled(4.0);
        clock.sleep(Duration::from_millis(1)).unwrap();
        clock.sleep(Duration::new(0, 1_000_003)).unwrap();
        assert_eq!(
            source.calls(),
            vec![
                Call::Sleep(Duration::from_micros(250)),
                Call::Sleep(Duration::from_nanos(250_000)),
            ]
        );
    }

    #[test]
    fn zero_timeouts_bypass_conversion() {
        let (source, clock) = scaled(0.5);
        let monitor = Monitor::new(());
        clock.wait(&mut monitor.lock(), Duration::ZERO).unwrap();
        clock.sleep(Duration::ZERO).unwrap();
        clock.park(ParkTimeout::Relative(Duration::ZERO));
        clock.park(ParkTimeout::Indefinite);
        assert_eq!(
            source.calls(),
            vec![
                Call::Wait(Duration::ZERO),
                Call::Sleep(Duration::ZERO),
                Call::Park(ParkTimeout::Relative(Duration::ZERO)),
                Call::Park(ParkTimeout::Indefinite),
            ]
        );
    }

    #[test]
    fn tiny_durations_never_become_unbounded() {
        let (source, clock) = scaled(1e12);
        let monitor = Monitor::new(());
        clock.wait(&mut monitor.lock(), Duration::from_millis(1)).unwrap();
        assert_eq!(source.calls(), vec![Call::Wait(Duration::from_nanos(1))]);
    }

    #[test]
    fn absolute_park_converts_remaining_time() {
        let (source, clock) = scaled(2.0);
        source.set_wall(1_000_500);
        // Virtual now is 1_001_000; 2000 virtual ms ahead is 1000 source ms ahead.
        clock.park(ParkTimeout::Absolute(1_003_000));
        clock.park(ParkTimeout::Relative(Duration::from_secs(3)));
        assert_eq!(
            source.calls(),
            vec![
                Call::Park(ParkTimeout::Absolute(1_001_500)),
                Call::Park(ParkTimeout::Relative(Duration::from_millis(1500))),
            ]
        );
    }

    #[test]
    fn absolute_park_in_the_past_stays_in_the_past() {
        let (source, clock) = scaled(10.0);
        source.set_wall(1_001_000);
        assert_eq!(clock.wall_millis(), 1_010_000);
        // 5000 virtual ms ago is 500 source ms ago, not 4000 source ms ahead.
        clock.park(ParkTimeout::Absolute(1_005_000));
        assert_eq!(source.calls(), vec![Call::Park(ParkTimeout::Absolute(1_000_500))]);
    }

    #[test]
    fn past_deadline_over_host_returns_promptly() {
        let clock = ScaledClock::new(Arc::new(crate::time::SystemClock), 1000.0).unwrap();
        let start = std::time::Instant::now();
        clock.park(ParkTimeout::Absolute(clock.wall_millis() - 1_000));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn describes_source() {
        let (_, clock) = scaled(2.5);
        assert_eq!(clock.to_string(), "ScaledClock{source=RecordingClock scale=2.5}");
    }
}
