//! ## tidsmaskin-core::signal
//! **Per-thread interrupt, permit and notification flags**
//!
//! Every blocking primitive in this crate parks the calling thread on its own
//! signal rather than on a shared condition variable. Waking a thread (interrupt,
//! unpark or monitor notification) only ever takes that thread's signal lock,
//! which is a leaf in the lock order: no other lock is acquired while it is held.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct SignalState {
    pub(crate) interrupted: bool,
    pub(crate) permit: bool,
    pub(crate) notified: bool,
}

struct Signal {
    state: Mutex<SignalState>,
    cond: Condvar,
    name: String,
}

/// Handle to a thread's signal. Cheap to clone and safe to send to other threads.
#[derive(Clone)]
pub struct ThreadHandle {
    signal: Arc<Signal>,
}

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::for_current_thread();
}

impl ThreadHandle {
    /// Returns the handle of the calling thread, creating it on first use.
    pub fn current() -> ThreadHandle {
        CURRENT.with(ThreadHandle::clone)
    }

    fn for_current_thread() -> Self {
        let thread = std::thread::current();
        let name = match thread.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", thread.id()),
        };
        Self {
            signal: Arc::new(Signal {
                state: Mutex::new(SignalState::default()),
                cond: Condvar::new(),
                name,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.signal.name
    }

    /// Sets the interrupt flag and wakes the thread out of any interruptible block.
    pub fn interrupt(&self) {
        self.update(|state| state.interrupted = true);
    }

    /// Makes the permit available, waking the thread if it is parked.
    pub fn unpark(&self) {
        self.update(|state| state.permit = true);
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal.state.lock().interrupted
    }

    pub fn same_thread(&self, other: &ThreadHandle) -> bool {
        Arc::ptr_eq(&self.signal, &other.signal)
    }

    pub(crate) fn notify(&self) {
        self.update(|state| state.notified = true);
    }

    pub(crate) fn take_interrupt(&self) -> bool {
        std::mem::take(&mut self.signal.state.lock().interrupted)
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SignalState) -> R) -> R {
        f(&mut self.signal.state.lock())
    }

    fn update(&self, f: impl FnOnce(&mut SignalState)) {
        let mut state = self.signal.state.lock();
        f(&mut state);
        self.signal.cond.notify_all();
    }

    /// Blocks the calling thread until `ready` holds or `deadline` passes.
    ///
    /// `ready` runs under the signal lock and may consume the flags it inspects.
    /// Returns whether `ready` held. Must only be called on the current thread's handle.
    pub(crate) fn block_until(
        &self,
        deadline: Option<Instant>,
        mut ready: impl FnMut(&mut SignalState) -> bool,
    ) -> bool {
        let mut state = self.signal.state.lock();
        loop {
            if ready(&mut state) {
                return true;
            }
            match deadline {
                None => self.signal.cond.wait(&mut state),
                Some(deadline) => {
                    if self.signal.cond.wait_until(&mut state, deadline).timed_out() {
                        return ready(&mut state);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.signal.name)
            .finish()
    }
}

/// Returns and clears the calling thread's interrupt flag.
pub fn interrupted() -> bool {
    ThreadHandle::current().take_interrupt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn current_handle_is_stable_per_thread() {
        let a = ThreadHandle::current();
        let b = ThreadHandle::current();
        assert!(a.same_thread(&b));

        let other = std::thread::spawn(ThreadHandle::current).join().unwrap();
        assert!(!a.same_thread(&other));
    }

    #[test]
    fn interrupted_clears_flag() {
        ThreadHandle::current().interrupt();
        assert!(ThreadHandle::current().is_interrupted());
        assert!(interrupted());
        assert!(!interrupted());
    }

    #[test]
    fn block_until_times_out_without_signal() {
        let me = ThreadHandle::current();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(!me.block_until(Some(deadline), |s| s.permit));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn unpark_from_other_thread_releases_block() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let worker = std::thread::spawn(move || {
            let me = ThreadHandle::current();
            tx.send(me.clone()).unwrap();
            me.block_until(None, |s| std::mem::take(&mut s.permit))
        });
        let handle = rx.recv().unwrap();
        handle.unpark();
        assert!(worker.join().unwrap());
    }
}
