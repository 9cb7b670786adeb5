//! ## tidsmaskin-core::time
//! **Virtual clocks & waiter scheduling**
//!
//! ### Expectations:
//! - Every clock is `Send + Sync` and callable from any number of threads
//! - Decorators only transform durations and deadlines; the block itself is always real
//! - `ManualClock` never wakes a waiter before virtual time reaches its deadline
//!
//! ### Key Submodules:
//! - `system`: passthrough to the host clock
//! - `offset`: fixed shift of wall time, optionally persisted
//! - `scaled`: faster or slower time relative to a source clock
//! - `manual`: externally advanced timeline with a waiter registry

use std::fmt;
use std::time::Duration;

use crate::error::Interrupted;
use crate::monitor::MonitorWait;

pub mod manual;
pub mod offset;
pub mod scaled;
pub mod system;
mod waiters;

pub use manual::ManualClock;
pub use offset::OffsetClock;
pub use scaled::ScaledClock;
pub use system::SystemClock;

pub const NANOS_PER_MILLI: u64 = 1_000_000;

/// How long a `park` may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkTimeout {
    /// Until unparked or interrupted.
    Indefinite,
    /// For a duration on the parking clock's timeline.
    Relative(Duration),
    /// Until a wall-clock instant, in milliseconds on the parking clock's timeline.
    Absolute(i64),
}

/// Behavior of every time-related operation a redirected call site can make.
pub trait Clock: fmt::Display + fmt::Debug + Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn wall_millis(&self) -> i64;

    /// Current monotonic time in nanoseconds. Never decreases.
    fn monotonic_nanos(&self) -> u64;

    /// Virtual counterpart of the host's process start time `host_start`.
    fn process_start_millis(&self, host_start: i64) -> i64;

    /// Waits on `monitor` until notified, interrupted or `timeout` passes on
    /// this clock. A zero timeout waits without a time limit.
    fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted>;

    /// Sleeps for `duration` on this clock's timeline.
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;

    /// Parks the calling thread until unparked, interrupted or `timeout` passes.
    fn park(&self, timeout: ParkTimeout);

    /// Called once, right after this clock became the active clock.
    fn after_install(&self) {}

    /// The manual clock behind this one, for drivers that need to advance it.
    fn as_manual(&self) -> Option<&ManualClock> {
        None
    }
}

pub(crate) fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
