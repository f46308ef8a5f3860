//! Lock and condition-variable records with FIFO waiter queues.
//!
//! Both record kinds are created lazily on first reference to an unseen
//! identifier and persist for the lifetime of the runtime. They hold pure
//! bookkeeping state; the context switching around blocking and wakeup is
//! the runtime's job.

use crate::errors::{ThreadError, ThreadResult};
use crate::thread::{Tcb, ThreadId};
use alloc::boxed::Box;
use alloc::collections::VecDeque;

/// Caller-chosen identifier for a lock or condition variable.
pub type SyncId = u64;

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The lock was free; the caller is now the owner.
    Acquired,
    /// The caller already owns this lock; recursive acquisition is an error.
    Reentry,
    /// Another thread owns the lock; the caller must park and wait.
    Contended,
}

/// A mutual-exclusion lock.
///
/// The lock is held exactly when `owner` is set. The owner never appears in
/// the waiter queue, and a parked thread sits in at most this one queue.
pub struct Lock {
    id: SyncId,
    owner: Option<ThreadId>,
    waiters: VecDeque<Box<Tcb>>,
}

impl Lock {
    pub fn new(id: SyncId) -> Self {
        Self {
            id,
            owner: None,
            waiters: VecDeque::new(),
        }
    }

    /// Attempt to take the lock for `me` without blocking.
    pub fn try_acquire(&mut self, me: ThreadId) -> Acquire {
        match self.owner {
            None => {
                self.owner = Some(me);
                Acquire::Acquired
            }
            Some(owner) if owner == me => Acquire::Reentry,
            Some(_) => Acquire::Contended,
        }
    }

    /// Park a blocked thread at the tail of the waiter queue.
    pub fn park(&mut self, tcb: Box<Tcb>) {
        debug_assert!(self.owner.is_some(), "parking on an unheld lock");
        debug_assert_ne!(self.owner, Some(tcb.id()), "owner parking on own lock");
        self.waiters.push_back(tcb);
    }

    /// Release the lock held by `me`.
    ///
    /// With waiters queued, ownership transfers directly to the FIFO head
    /// (the lock is never transiently unheld) and the new owner's TCB is
    /// returned for the caller to ready. With no waiters the lock becomes
    /// free. Fails with `LockNotOwned` if `me` is not the owner, leaving all
    /// state unchanged.
    pub fn release(&mut self, me: ThreadId) -> ThreadResult<Option<Box<Tcb>>> {
        if self.owner != Some(me) {
            return Err(ThreadError::LockNotOwned(self.id));
        }
        match self.waiters.pop_front() {
            Some(next) => {
                self.owner = Some(next.id());
                Ok(Some(next))
            }
            None => {
                self.owner = None;
                Ok(None)
            }
        }
    }

    pub fn owned_by(&self, thread: ThreadId) -> bool {
        self.owner == Some(thread)
    }

    pub fn is_held(&self) -> bool {
        self.owner.is_some()
    }

    /// Number of threads parked on this lock.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

/// A Mesa-style condition variable.
///
/// Carries no lock association; the lock/CV pairing is a discipline enforced
/// at the `wait` call site. Waking never transfers lock ownership: a woken
/// thread re-contends for the lock once scheduled.
pub struct Condvar {
    #[allow(dead_code)]
    id: SyncId,
    waiters: VecDeque<Box<Tcb>>,
}

impl Condvar {
    pub fn new(id: SyncId) -> Self {
        Self {
            id,
            waiters: VecDeque::new(),
        }
    }

    /// Park a waiting thread at the tail of the queue.
    pub fn park(&mut self, tcb: Box<Tcb>) {
        self.waiters.push_back(tcb);
    }

    /// Dequeue the FIFO head, if any. Draining in a loop yields waiters in
    /// their original wait order.
    pub fn take_one(&mut self) -> Option<Box<Tcb>> {
        self.waiters.pop_front()
    }

    /// Number of threads parked on this condition variable.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadId;

    fn tid(raw: u64) -> ThreadId {
        ThreadId::new(raw).unwrap()
    }

    #[test]
    fn acquire_free_lock() {
        let mut lock = Lock::new(1);
        assert!(!lock.is_held());
        assert_eq!(lock.try_acquire(tid(1)), Acquire::Acquired);
        assert!(lock.is_held());
        assert!(lock.owned_by(tid(1)));
    }

    #[test]
    fn reacquire_is_reentry() {
        let mut lock = Lock::new(1);
        assert_eq!(lock.try_acquire(tid(1)), Acquire::Acquired);
        assert_eq!(lock.try_acquire(tid(1)), Acquire::Reentry);
        // Reentry leaves the lock state untouched.
        assert!(lock.owned_by(tid(1)));
        assert_eq!(lock.waiting(), 0);
    }

    #[test]
    fn contended_acquire_must_wait() {
        let mut lock = Lock::new(1);
        assert_eq!(lock.try_acquire(tid(1)), Acquire::Acquired);
        assert_eq!(lock.try_acquire(tid(2)), Acquire::Contended);
    }

    #[test]
    fn release_without_waiters_frees_the_lock() {
        let mut lock = Lock::new(1);
        lock.try_acquire(tid(1));
        let handoff = lock.release(tid(1)).unwrap();
        assert!(handoff.is_none());
        assert!(!lock.is_held());
    }

    #[test]
    fn release_hands_off_to_fifo_head() {
        let mut lock = Lock::new(9);
        lock.try_acquire(tid(1));
        lock.park(Tcb::for_test(2));
        lock.park(Tcb::for_test(3));

        let next = lock.release(tid(1)).unwrap().expect("no handoff");
        assert_eq!(next.id().get(), 2);
        // Ownership transferred directly; never transiently unheld.
        assert!(lock.is_held());
        assert!(lock.owned_by(tid(2)));
        assert_eq!(lock.waiting(), 1);

        let next = lock.release(tid(2)).unwrap().expect("no handoff");
        assert_eq!(next.id().get(), 3);
        assert!(lock.owned_by(tid(3)));
    }

    #[test]
    fn release_by_non_owner_fails_and_mutates_nothing() {
        let mut lock = Lock::new(4);
        lock.try_acquire(tid(1));
        lock.park(Tcb::for_test(2));

        assert_eq!(
            lock.release(tid(3)),
            Err(ThreadError::LockNotOwned(4))
        );
        assert!(lock.owned_by(tid(1)));
        assert_eq!(lock.waiting(), 1);
    }

    #[test]
    fn condvar_wakes_in_fifo_order() {
        let mut cv = Condvar::new(7);
        cv.park(Tcb::for_test(1));
        cv.park(Tcb::for_test(2));
        cv.park(Tcb::for_test(3));
        assert_eq!(cv.waiting(), 3);

        assert_eq!(cv.take_one().unwrap().id().get(), 1);
        assert_eq!(cv.take_one().unwrap().id().get(), 2);
        assert_eq!(cv.take_one().unwrap().id().get(), 3);
        assert!(cv.take_one().is_none());
    }
}
