//! ## tidsmaskin-core::monitor
//! **Mutex-protected value with wait/notify**
//!
//! A `Monitor` pairs a value with a wait set. Waiting releases the lock, blocks
//! on the waiting thread's own signal and reacquires the lock before returning,
//! so notifications and interrupts never need the monitor lock of the thread
//! they wake.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::error::Interrupted;
use crate::signal::ThreadHandle;

/// A monitor guard that can release its lock while the holder blocks.
///
/// This is what clocks receive for `wait`; it hides the guarded value's type.
pub trait MonitorWait {
    /// Blocks until notified, interrupted or, when given, `timeout` elapses.
    ///
    /// `None` waits without a time limit. Returns `Err(Interrupted)` and clears
    /// the interrupt flag if the thread was interrupted before or during the wait.
    fn wait_for(&mut self, timeout: Option<Duration>) -> Result<(), Interrupted>;
}

struct Inner<T> {
    value: T,
    wait_set: VecDeque<ThreadHandle>,
}

pub struct Monitor<T> {
    inner: Mutex<Inner<T>>,
}

pub struct MonitorGuard<'a, T> {
    guard: MutexGuard<'a, Inner<T>>,
}

impl<T> Monitor<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                wait_set: VecDeque::new(),
            }),
        }
    }

    pub fn lock(&self) -> MonitorGuard<'_, T> {
        MonitorGuard {
            guard: self.inner.lock(),
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().value
    }
}

impl<T: Default> Default for Monitor<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> MonitorGuard<'_, T> {
    /// Wakes the longest-waiting thread, if any.
    pub fn notify_one(&mut self) {
        if let Some(waiter) = self.guard.wait_set.pop_front() {
            waiter.notify();
        }
    }

    pub fn notify_all(&mut self) {
        for waiter in self.guard.wait_set.drain(..) {
            waiter.notify();
        }
    }

    /// Number of threads currently in the wait set.
    pub fn waiting(&self) -> usize {
        self.guard.wait_set.len()
    }
}

impl<T> MonitorWait for MonitorGuard<'_, T> {
    fn wait_for(&mut self, timeout: Option<Duration>) -> Result<(), Interrupted> {
        let me = ThreadHandle::current();
        if me.take_interrupt() {
            return Err(Interrupted);
        }
        me.with_state(|state| state.notified = false);
        self.guard.wait_set.push_back(me.clone());

        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        MutexGuard::unlocked(&mut self.guard, || {
            me.block_until(deadline, |state| state.notified || state.interrupted);
        });

        let (notified, interrupted) = me.with_state(|state| {
            (
                std::mem::take(&mut state.notified),
                std::mem::take(&mut state.interrupted),
            )
        });
        if !notified {
            self.guard.wait_set.retain(|waiter| !waiter.same_thread(&me));
        }
        if interrupted {
            // Hand a notification we will not act on to the next waiter.
            if notified {
                self.notify_one();
            }
            return Err(Interrupted);
        }
        Ok(())
    }
}

impl<T> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.value
    }
}

impl<T> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wait_times_out_and_leaves_wait_set() {
        let monitor = Monitor::new(0u32);
        let mut guard = monitor.lock();
        let start = Instant::now();
        assert_eq!(guard.wait_for(Some(Duration::from_millis(20))), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(guard.waiting(), 0);
    }

    #[test]
    fn notify_wakes_waiter_with_updated_value() {
        let monitor = Arc::new(Monitor::new(false));
        let waiter = {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || {
                let mut guard = monitor.lock();
                while !*guard {
                    guard.wait_for(None).unwrap();
                }
            })
        };

        loop {
            let mut guard = monitor.lock();
            if guard.waiting() == 1 {
                *guard = true;
                guard.notify_all();
                break;
            }
            drop(guard);
            std::thread::yield_now();
        }
        waiter.join().unwrap();
    }

    #[test]
    fn interrupt_aborts_wait() {
        let monitor = Arc::new(Monitor::new(()));
        let (tx, rx) = crossbeam::channel::bounded(1);
        let waiter = {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || {
                let mut guard = monitor.lock();
                tx.send(ThreadHandle::current()).unwrap();
                let result = guard.wait_for(None);
                (result, ThreadHandle::current().is_interrupted())
            })
        };
        let handle = rx.recv().unwrap();
        handle.interrupt();
        let (result, still_flagged) = waiter.join().unwrap();
        assert_eq!(result, Err(Interrupted));
        assert!(!still_flagged);
    }

    #[test]
    fn pending_interrupt_fails_fast() {
        let monitor = Monitor::new(());
        let mut guard = monitor.lock();
        ThreadHandle::current().interrupt();
        assert_eq!(guard.wait_for(None), Err(Interrupted));
        assert_eq!(guard.waiting(), 0);
    }
}
