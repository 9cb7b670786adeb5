//! Deadline-ordered registry of threads blocked on a manual clock.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::signal::ThreadHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeAction {
    Interrupt,
    Unpark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaiterState {
    Pending,
    Fired,
    Disabled,
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const DISABLED: u8 = 2;

fn decode(raw: u8) -> WaiterState {
    match raw {
        PENDING => WaiterState::Pending,
        FIRED => WaiterState::Fired,
        _ => WaiterState::Disabled,
    }
}

#[derive(Debug)]
pub(crate) struct Waiter {
    deadline: u64,
    action: WakeAction,
    thread: ThreadHandle,
    state: AtomicU8,
}

impl Waiter {
    pub(crate) fn deadline(&self) -> u64 {
        self.deadline
    }

    pub(crate) fn action(&self) -> WakeAction {
        self.action
    }

    /// Wakes the owning thread unless the waiter was already resolved.
    fn fire(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        match self.action {
            WakeAction::Interrupt => self.thread.interrupt(),
            WakeAction::Unpark => self.thread.unpark(),
        }
        true
    }

    /// Turns any later `fire` into a no-op. Returns the state before the call.
    pub(crate) fn disable(&self) -> WaiterState {
        match self
            .state
            .compare_exchange(PENDING, DISABLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => WaiterState::Pending,
            Err(previous) => decode(previous),
        }
    }

    fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

struct Entry {
    seq: u64,
    waiter: Arc<Waiter>,
}

impl Entry {
    fn key(&self) -> (u64, u64) {
        (self.waiter.deadline, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: `BinaryHeap` is a max-heap and the earliest deadline must come out first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.key().cmp(&self.key())
    }
}

/// Heap size below which resolved entries are only dropped from the top.
const MIN_COMPACT_LEN: usize = 64;

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    compact_at: usize,
}

impl Queue {
    /// Drops resolved waiters: always from the top, and from the whole heap
    /// once it has doubled since the last full pass.
    fn discard_resolved(&mut self) {
        while self
            .heap
            .peek()
            .is_some_and(|entry| !entry.waiter.is_pending())
        {
            self.heap.pop();
        }
        if self.heap.len() >= self.compact_at.max(MIN_COMPACT_LEN) {
            self.heap.retain(|entry| entry.waiter.is_pending());
            self.compact_at = self.heap.len() * 2;
        }
    }
}

#[derive(Default)]
pub(crate) struct WaiterRegistry {
    queue: Mutex<Queue>,
}

impl WaiterRegistry {
    pub(crate) fn register(
        &self,
        deadline: u64,
        action: WakeAction,
        thread: ThreadHandle,
    ) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter {
            deadline,
            action,
            thread,
            state: AtomicU8::new(PENDING),
        });
        let mut queue = self.queue.lock();
        queue.discard_resolved();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(Entry {
            seq,
            waiter: Arc::clone(&waiter),
        });
        waiter
    }

    /// Pops and fires every waiter with `deadline <= now`, earliest first,
    /// registration order among equal deadlines. Returns how many threads were woken.
    ///
    /// The caller must hold the owning clock's advance lock.
    pub(crate) fn wake_due(&self, now: u64) -> usize {
        let mut woken = 0;
        loop {
            let due = {
                let mut queue = self.queue.lock();
                match queue.heap.peek() {
                    Some(entry) if entry.waiter.deadline <= now => queue.heap.pop(),
                    _ => None,
                }
            };
            match due {
                Some(entry) => {
                    if entry.waiter.fire() {
                        woken += 1;
                    }
                }
                None => {
                    self.queue.lock().discard_resolved();
                    return woken;
                }
            }
        }
    }

    /// Waiters still eligible to be woken.
    pub(crate) fn pending(&self) -> usize {
        self.queue
            .lock()
            .heap
            .iter()
            .filter(|entry| entry.waiter.is_pending())
            .count()
    }

    /// Earliest deadline among waiters still eligible to be woken.
    pub(crate) fn next_deadline(&self) -> Option<u64> {
        self.queue
            .lock()
            .heap
            .iter()
            .filter(|entry| entry.waiter.is_pending())
            .map(|entry| entry.waiter.deadline)
            .min()
    }
}
