//! `SharedLock`: shared/exclusive lock with a FIFO-per-mode pending
//! queue and writer-starvation prevention (SPEC_FULL.md §4.2).
//!
//! Grounded on `concurrent/hashmap.rs`'s per-bucket `parking_lot`-based
//! spinlock/condvar idiom, generalized here to a full shared/exclusive
//! mode instead of a single spinlock bit.

use crate::error::{DbError, Result};
use crate::locking::timeout::{bounded_by_deadline, jittered};
use parking_lot::{Condvar, Mutex};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

pub type OwnerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Waiter {
    /// Lower value = higher priority (SPEC_FULL.md §4.2).
    priority: i64,
    /// Monotonic sequence number; breaks ties FIFO.
    seq: u64,
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want the *lowest* priority value
        // and, on ties, the *lowest* sequence number to sort first, so
        // invert both comparisons.
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

enum Holders {
    None,
    Shared(Vec<OwnerId>),
    Exclusive(OwnerId),
}

struct State {
    holders: Holders,
    /// Exclusive waiters queued; while non-empty, no further shared
    /// acquirers are admitted (writer-starvation prevention).
    pending_exclusive: BinaryHeap<Waiter>,
    pending_shared: BinaryHeap<Waiter>,
    removed: bool,
    next_seq: u64,
}

pub struct SharedLock {
    name: String,
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired,
    Timeout,
    Removed,
}

impl SharedLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                holders: Holders::None,
                pending_exclusive: BinaryHeap::new(),
                pending_shared: BinaryHeap::new(),
                removed: false,
                next_seq: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempt to acquire; `timeout` is the per-attempt wait bound (None
    /// = block indefinitely, matching the schedule's final entry).
    /// `deadline_remaining` further bounds it if the caller supplied a
    /// hard deadline.
    pub fn acquire(
        &self,
        owner: OwnerId,
        shared: bool,
        priority: i64,
        timeout: Option<f64>,
        deadline_remaining: Option<f64>,
    ) -> AcquireResult {
        let effective = bounded_by_deadline(jittered(timeout), deadline_remaining);
        let deadline = effective.map(|t| Instant::now() + Duration::from_secs_f64(t.max(0.0)));

        let mut guard = self.state.lock();
        let seq = {
            let s = guard.next_seq;
            guard.next_seq += 1;
            s
        };
        let waiter = Waiter { priority, seq };

        loop {
            if guard.removed {
                return AcquireResult::Removed;
            }
            if self.can_admit(&guard, shared, waiter) {
                match &mut guard.holders {
                    Holders::None => {
                        guard.holders = if shared { Holders::Shared(vec![owner]) } else { Holders::Exclusive(owner) };
                    }
                    Holders::Shared(v) => {
                        v.push(owner);
                    }
                    Holders::Exclusive(_) => unreachable!("can_admit guards this"),
                }
                return AcquireResult::Acquired;
            }

            if shared {
                guard.pending_shared.push(waiter);
            } else {
                guard.pending_exclusive.push(waiter);
            }

            let timed_out = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        true
                    } else {
                        let res = self.cond.wait_until(&mut guard, d);
                        res.timed_out()
                    }
                }
                None => {
                    self.cond.wait(&mut guard);
                    false
                }
            };

            if shared {
                guard.pending_shared.retain(|w| *w != waiter);
            } else {
                guard.pending_exclusive.retain(|w| *w != waiter);
            }

            if timed_out {
                return AcquireResult::Timeout;
            }
            // Spurious wake or a release happened; loop and re-check.
        }
    }

    /// A waiter may be admitted only if no queued waiter of the same
    /// mode outranks it: higher priority (lower value) wakes first,
    /// ties break FIFO by sequence number (SPEC_FULL.md §4.2). `waiter`
    /// is not itself in `guard`'s heaps yet, so "outranks" means
    /// "strictly greater than `waiter` under `Waiter`'s Ord".
    fn can_admit(&self, guard: &State, shared: bool, waiter: Waiter) -> bool {
        let is_head = |heap: &BinaryHeap<Waiter>| heap.peek().map_or(true, |top| *top <= waiter);
        match &guard.holders {
            Holders::Exclusive(_) => false,
            Holders::None => {
                if shared {
                    // Writer-starvation prevention: a pending exclusive
                    // waiter blocks further shared admission.
                    guard.pending_exclusive.is_empty() && is_head(&guard.pending_shared)
                } else {
                    is_head(&guard.pending_exclusive)
                }
            }
            Holders::Shared(_) => {
                shared && guard.pending_exclusive.is_empty() && is_head(&guard.pending_shared)
            }
        }
    }

    pub fn release(&self, owner: OwnerId) {
        let mut guard = self.state.lock();
        match &mut guard.holders {
            Holders::Exclusive(o) if *o == owner => guard.holders = Holders::None,
            Holders::Shared(v) => {
                v.retain(|o| *o != owner);
                if v.is_empty() {
                    guard.holders = Holders::None;
                }
            }
            _ => {}
        }
        drop(guard);
        self.cond.notify_all();
    }

    pub fn is_owned_by(&self, owner: OwnerId) -> bool {
        let guard = self.state.lock();
        match &guard.holders {
            Holders::Exclusive(o) => *o == owner,
            Holders::Shared(v) => v.contains(&owner),
            Holders::None => false,
        }
    }

    /// Mark removed: wakes all pending waiters, who observe `Removed`.
    pub fn mark_removed(&self) -> Result<()> {
        let mut guard = self.state.lock();
        if !matches!(guard.holders, Holders::None) {
            return Err(DbError::GanetiLockError(format!(
                "cannot remove lock {} while held",
                self.name
            )));
        }
        guard.removed = true;
        drop(guard);
        self.cond.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn exclusive_waiter_blocks_further_shared_admission() {
        let lock = Arc::new(SharedLock::new("t"));
        assert_eq!(lock.acquire(1, true, 0, Some(0.1), None), AcquireResult::Acquired);

        let lock2 = lock.clone();
        let handle = thread::spawn(move || lock2.acquire(2, false, 0, Some(1.0), None));
        thread::sleep(Duration::from_millis(50));

        // A third shared acquirer must NOT be admitted while the
        // exclusive waiter (owner 2) is pending.
        assert_eq!(lock.acquire(3, true, 0, Some(0.1), None), AcquireResult::Timeout);

        lock.release(1);
        assert_eq!(handle.join().unwrap(), AcquireResult::Acquired);
        lock.release(2);
    }

    #[test]
    fn timeout_returns_promptly() {
        let lock = SharedLock::new("t");
        assert_eq!(lock.acquire(1, false, 0, None, None), AcquireResult::Acquired);
        let start = Instant::now();
        assert_eq!(lock.acquire(2, false, 0, Some(0.2), None), AcquireResult::Timeout);
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[test]
    fn no_reentrancy_is_caller_responsibility_but_release_restores_exact_set() {
        let lock = SharedLock::new("t");
        assert_eq!(lock.acquire(1, true, 0, Some(0.1), None), AcquireResult::Acquired);
        assert_eq!(lock.acquire(2, true, 0, Some(0.1), None), AcquireResult::Acquired);
        lock.release(1);
        assert!(!lock.is_owned_by(1));
        assert!(lock.is_owned_by(2));
    }
}
