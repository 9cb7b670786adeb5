//! ## tidsmaskin-core::host
//! **Real time reads and blocking primitives**
//!
//! The host side of every clock operation. Blocking here is real: it ends on a
//! timeout, an interrupt, a notification or an unpark, never on virtual time.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

use crate::error::Interrupted;
use crate::signal::ThreadHandle;
use crate::time::ParkTimeout;

static MONOTONIC_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);
static PROCESS_START: Lazy<i64> = Lazy::new(wall_millis);

/// Milliseconds since the Unix epoch; negative before it.
pub fn wall_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_millis()).unwrap_or(i64::MAX),
        Err(err) => -i64::try_from(err.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

/// Nanoseconds from an arbitrary fixed origin.
pub fn monotonic_nanos() -> u64 {
    u64::try_from(MONOTONIC_ORIGIN.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Wall time at which this process first called into this module.
///
/// This approximates the OS process start and is later than it by however
/// long the process ran before its first clock call. Installing a clock pins
/// the value, so every redirected call site sees the same start time.
pub fn process_start_millis() -> i64 {
    *PROCESS_START
}

/// Sleeps for `duration` unless interrupted. A zero duration only checks for
/// a pending interrupt.
pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    let me = ThreadHandle::current();
    if !duration.is_zero() {
        let deadline = Instant::now().checked_add(duration);
        me.block_until(deadline, |state| state.interrupted);
    }
    if me.take_interrupt() {
        return Err(Interrupted);
    }
    Ok(())
}

/// Sleeps until interrupted. Always returns `Err(Interrupted)`.
pub fn sleep_indefinitely() -> Result<(), Interrupted> {
    let me = ThreadHandle::current();
    me.block_until(None, |state| state.interrupted);
    me.take_interrupt();
    Err(Interrupted)
}

/// Parks until the permit is available, the thread is interrupted or the
/// timeout passes. The permit is consumed; the interrupt flag is left set.
///
/// `Relative(Duration::ZERO)` and absolute deadlines already in the past return
/// immediately after consuming any available permit.
pub fn park(timeout: ParkTimeout) {
    let me = ThreadHandle::current();
    let deadline = match timeout {
        ParkTimeout::Indefinite => None,
        ParkTimeout::Relative(duration) if duration.is_zero() => Some(Instant::now()),
        ParkTimeout::Relative(duration) => Instant::now().checked_add(duration),
        ParkTimeout::Absolute(at_millis) => {
            let remaining = at_millis.saturating_sub(wall_millis()).max(0);
            Instant::now().checked_add(Duration::from_millis(remaining.unsigned_abs()))
        }
    };
    me.block_until(deadline, |state| {
        state.interrupted || std::mem::take(&mut state.permit)
    });
}
