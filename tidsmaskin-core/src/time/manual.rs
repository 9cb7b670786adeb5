//! ## tidsmaskin-core::time::manual
//! **A clock that only moves when told to**
//!
//! Virtual time is a nanosecond counter advanced by [`ManualClock::advance`].
//! There is no real clock to delegate timed blocks to, so a blocking call
//! registers a waiter with its virtual deadline and then blocks without a time
//! limit; `advance` wakes it once the deadline is reached.
//!
//! ### Invariants:
//! - The counter only changes inside `advance`, under the advance lock.
//! - A woken thread decides whether its wake was the clock's doing by comparing
//!   the counter with its deadline under the same lock.
//! - A waiter registered concurrently with an `advance` is never left behind:
//!   after registering, the thread re-reads the counter and resolves itself if
//!   it is already due.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ClockError, Interrupted};
use crate::host;
use crate::monitor::MonitorWait;
use crate::signal::ThreadHandle;
use crate::time::waiters::{Waiter, WaiterRegistry, WaiterState, WakeAction};
use crate::time::{duration_nanos, Clock, ParkTimeout, NANOS_PER_MILLI};

pub struct ManualClock {
    start_time: i64,
    nanos: AtomicU64,
    advance_lock: Mutex<()>,
    waiters: WaiterRegistry,
}

impl ManualClock {
    /// Creates a clock whose wall time starts at `start_time` milliseconds since the epoch.
    pub fn new(start_time: i64) -> Result<Self, ClockError> {
        if start_time < 0 {
            return Err(ClockError::invalid(format!(
                "startTime must be >= 0; was {start_time}"
            )));
        }
        Ok(Self {
            start_time,
            nanos: AtomicU64::new(0),
            advance_lock: Mutex::new(()),
            waiters: WaiterRegistry::default(),
        })
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Virtual nanoseconds elapsed since construction.
    pub fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }

    /// Moves virtual time forward by `duration` and wakes every waiter whose
    /// deadline has been reached. Returns the new virtual instant.
    pub fn advance(&self, duration: Duration) -> Result<u64, ClockError> {
        if duration.is_zero() {
            return Err(ClockError::invalid(format!(
                "Duration must be positive; was {duration:?}"
            )));
        }
        let step = duration_nanos(duration);

        let _advancing = self.advance_lock.lock();
        let now = self
            .now_nanos()
            .checked_add(step)
            .ok_or_else(|| ClockError::invalid("Advancing would overflow the virtual timeline"))?;
        self.nanos.store(now, Ordering::Release);

        let woken = self.waiters.wake_due(now);
        debug!(now, woken, "manual clock advanced");
        Ok(now)
    }

    /// Threads currently blocked on this clock and not yet woken.
    pub fn pending_waiters(&self) -> usize {
        self.waiters.pending()
    }

    /// The earliest virtual instant at which a blocked thread becomes due.
    pub fn next_deadline(&self) -> Option<u64> {
        self.waiters.next_deadline()
    }

    fn register(&self, duration: Duration, action: WakeAction) -> std::sync::Arc<Waiter> {
        let deadline = self.now_nanos().saturating_add(duration_nanos(duration));
        trace!(deadline, ?action, "registering manual clock waiter");
        self.waiters
            .register(deadline, action, ThreadHandle::current())
    }

    fn is_due(&self, waiter: &Waiter) -> bool {
        self.now_nanos() >= waiter.deadline()
    }

    /// Resolves a waiter whose deadline was reached by an `advance` that ran
    /// between registering and blocking.
    fn settle_if_due(&self, waiter: &Waiter) -> Option<Result<(), Interrupted>> {
        self.is_due(waiter).then(|| self.settle(waiter, Ok(())))
    }

    /// Decides how an interrupt-type block ended.
    ///
    /// If virtual time reached the deadline the wake counts as success and the
    /// interrupt this clock delivered is consumed. Otherwise the block ended for
    /// an unrelated reason and its own outcome is returned. Either way the
    /// waiter can no longer fire.
    fn settle(&self, waiter: &Waiter, outcome: Result<(), Interrupted>) -> Result<(), Interrupted> {
        let _advancing = self.advance_lock.lock();
        let previous = waiter.disable();
        if !self.is_due(waiter) {
            return outcome;
        }
        if previous == WaiterState::Fired
            && waiter.action() == WakeAction::Interrupt
            && outcome.is_ok()
        {
            // Fired after the block had already returned: the flag is still set.
            crate::signal::interrupted();
        }
        Ok(())
    }
}

impl fmt::Display for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ManualClock{{startTime={} nanos={}}}",
            self.start_time,
            self.now_nanos()
        )
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("start_time", &self.start_time)
            .field("nanos", &self.now_nanos())
            .field("pending_waiters", &self.pending_waiters())
            .finish()
    }
}

impl Clock for ManualClock {
    fn wall_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.now_nanos() / NANOS_PER_MILLI).unwrap_or(i64::MAX);
        self.start_time.saturating_add(elapsed)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.now_nanos()
    }

    fn process_start_millis(&self, _host_start: i64) -> i64 {
        self.start_time
    }

    fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        if timeout.is_zero() {
            return monitor.wait_for(None);
        }
        let waiter = self.register(timeout, WakeAction::Interrupt);
        if let Some(outcome) = self.settle_if_due(&waiter) {
            return outcome;
        }
        let outcome = monitor.wait_for(None);
        self.settle(&waiter, outcome)
    }

    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return host::sleep(Duration::ZERO);
        }
        let waiter = self.register(duration, WakeAction::Interrupt);
        if let Some(outcome) = self.settle_if_due(&waiter) {
            return outcome;
        }
        let outcome = host::sleep_indefinitely();
        self.settle(&waiter, outcome)
    }

    fn park(&self, timeout: ParkTimeout) {
        let duration = match timeout {
            ParkTimeout::Indefinite => return host::park(ParkTimeout::Indefinite),
            ParkTimeout::Relative(duration) => duration,
            ParkTimeout::Absolute(at_millis) => {
                let remaining = at_millis.saturating_sub(self.wall_millis());
                Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
            }
        };
        if duration.is_zero() {
            return host::park(ParkTimeout::Relative(Duration::ZERO));
        }
        let waiter = self.register(duration, WakeAction::Unpark);
        if !self.is_due(&waiter) {
            host::park(ParkTimeout::Indefinite);
        }
        waiter.disable();
    }

    fn as_manual(&self) -> Option<&ManualClock> {
        Some(self)
    }
}
