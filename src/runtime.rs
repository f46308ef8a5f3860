//! Runtime core: consolidated scheduler state, the manager loop, and the
//! public operations.
//!
//! All shared state (active thread, ready queue, lock and condition-variable
//! registries, the manager context) lives in one [`SchedState`] behind a
//! single mutex. The public operations are thin atomic-bookkeeping wrappers
//! around it: each raises the preemption fence, takes the state lock, moves
//! TCBs between queues, then drops the lock *before* any context switch. The
//! fence stays up across the switch, so the asynchronous yield point can
//! never fire between bookkeeping and the switch that completes it.
//!
//! The manager loop in [`Runtime::start`] is the only code that switches
//! *into* threads and the only place a dispatched thread's stack and context
//! are freed. Everything that blocks or yields switches *out* to the manager
//! context and resumes when the loop later dispatches it again.

use crate::arch::{Arch, DefaultArch};
use crate::errors::{ThreadError, ThreadResult};
use crate::mem::Stack;
use crate::preempt::PreemptFence;
use crate::sched::ReadyQueue;
use crate::sync::{Acquire, Condvar, Lock, SyncId};
use crate::thread::{Tcb, ThreadId, ThreadState};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use log::{debug, trace, warn};
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

type Context = <DefaultArch as Arch>::SavedContext;

/// Stack size used by [`Runtime::spawn`].
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Global runtime reference for the free-function API surface.
static GLOBAL_RUNTIME: AtomicPtr<Runtime> = AtomicPtr::new(core::ptr::null_mut());

/// Everything the scheduler mutates, consolidated behind one lock.
struct SchedState {
    /// The thread currently executing, or `None` while the manager runs.
    active: Option<Box<Tcb>>,
    /// Runnable threads in dispatch order.
    ready: ReadyQueue,
    /// Lock registry, lazily populated, never pruned.
    locks: BTreeMap<SyncId, Lock>,
    /// Condition-variable registry, lazily populated, never pruned.
    condvars: BTreeMap<SyncId, Condvar>,
    /// The manager (scheduler loop) execution context.
    manager: Box<Context>,
}

impl SchedState {
    fn new() -> Self {
        Self {
            active: None,
            ready: ReadyQueue::new(),
            locks: BTreeMap::new(),
            condvars: BTreeMap::new(),
            manager: Box::new(Context::default()),
        }
    }

    fn manager_ptr(&mut self) -> *mut Context {
        &mut *self.manager
    }

    fn active_id(&self) -> Option<ThreadId> {
        self.active.as_ref().map(|tcb| tcb.id())
    }

    /// Threads parked in lock or CV waiter queues.
    fn parked(&self) -> usize {
        self.locks.values().map(Lock::waiting).sum::<usize>()
            + self.condvars.values().map(Condvar::waiting).sum::<usize>()
    }
}

/// Cooperative thread runtime.
///
/// Construct with [`Runtime::new`], hand closures an `Arc` clone so they can
/// reach the API, then call [`Runtime::start`] exactly once; it returns when
/// every thread has finished or parked forever.
pub struct Runtime {
    state: spin::Mutex<SchedState>,
    fence: PreemptFence,
    started: AtomicBool,
    next_id: AtomicU64,
}

impl Runtime {
    /// Create a new, un-started runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: spin::Mutex::new(SchedState::new()),
            fence: PreemptFence::new(),
            started: AtomicBool::new(false),
            // Start from 1, never use 0
            next_id: AtomicU64::new(1),
        })
    }

    /// Whether [`Runtime::start`] has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn next_thread_id(&self) -> ThreadId {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        // Safety: the counter starts at 1 and only increments.
        unsafe { ThreadId::new_unchecked(id) }
    }

    /// Register this runtime as the target of the free functions
    /// [`crate::yield_now`] and [`crate::preempt_point`].
    ///
    /// # Safety
    ///
    /// The runtime must outlive every use of the free-function surface; the
    /// stored pointer is not reference-counted.
    pub unsafe fn register_global(self: &Arc<Self>) {
        GLOBAL_RUNTIME.store(Arc::as_ptr(self) as *mut Runtime, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // init: bootstrap and manager loop
    // ------------------------------------------------------------------

    /// Start the runtime: create the first thread from `entry` and run the
    /// scheduler loop until no runnable thread remains.
    ///
    /// May be called exactly once; a second call fails with
    /// `AlreadyInitialized` and does not disturb scheduler state. Returns
    /// `Ok(())` once the ready queue drains; if threads are still parked in
    /// waiter queues at that point they are permanently unscheduled (a
    /// design-level deadlock in the client, reported via `log::warn!`).
    pub fn start<F>(&self, entry: F) -> ThreadResult<()>
    where
        F: FnOnce() + 'static,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ThreadError::AlreadyInitialized);
        }
        self.spawn(entry)?;
        self.run();
        Ok(())
    }

    /// The manager loop: pop the ready head, reclaim it if finished,
    /// otherwise dispatch it. Control returns here only through a switch
    /// back to the manager context.
    fn run(&self) {
        loop {
            self.fence.acquire();
            let mut st = self.state.lock();

            let Some(mut tcb) = st.ready.pop() else {
                let parked = st.parked();
                drop(st);
                self.fence.release();
                if parked > 0 {
                    warn!("scheduler drained with {parked} threads still parked");
                } else {
                    debug!("scheduler drained, all threads finished");
                }
                break;
            };

            if tcb.state() == ThreadState::Finished {
                trace!("reclaiming thread {}", tcb.id());
                drop(st);
                // The single place a dispatched thread's stack and context
                // are freed.
                drop(tcb);
                self.fence.release();
                continue;
            }

            tcb.set_state(ThreadState::Running);
            let next_ctx = tcb.context_ptr();
            let mgr = st.manager_ptr();
            st.active = Some(tcb);
            drop(st);

            // Safety: both contexts are heap-stable; next_ctx was seeded at
            // spawn or saved when the thread last switched out; the fence is
            // held across the switch.
            unsafe { DefaultArch::context_switch(mgr, next_ctx) };
            self.fence.release();
        }
    }

    // ------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------

    /// Create a thread with the default stack size and append it to the
    /// ready-queue tail. Never blocks; the caller keeps running.
    pub fn spawn<F>(&self, entry: F) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + 'static,
    {
        self.spawn_with_stack(entry, DEFAULT_STACK_SIZE)
    }

    /// Create a thread with an explicit stack size.
    pub fn spawn_with_stack<F>(&self, entry: F, stack_size: usize) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + 'static,
    {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        let stack = Stack::allocate(stack_size).ok_or(ThreadError::StackExhausted)?;
        let id = self.next_thread_id();
        let mut tcb = Box::new(Tcb::new(id, stack, Box::new(entry)));
        tcb.prepare_context(self as *const Self as *const ())?;

        self.fence.acquire();
        let mut st = self.state.lock();
        st.ready.push(tcb);
        drop(st);
        self.fence.release();

        trace!("created thread {id}");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // yield
    // ------------------------------------------------------------------

    /// Move the calling thread to the ready-queue tail and hand control to
    /// the manager. Resumes once every thread ahead of it has been
    /// dispatched.
    pub fn yield_now(&self) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let Some(mut tcb) = st.active.take() else {
            drop(st);
            self.fence.release();
            return Err(ThreadError::NotInitialized);
        };

        tcb.set_state(ThreadState::Ready);
        let prev = tcb.context_ptr();
        let mgr = st.manager_ptr();
        st.ready.push(tcb);
        drop(st);

        // Safety: prev/mgr are heap-stable; fence held across the switch.
        unsafe { DefaultArch::context_switch(prev, mgr) };
        self.fence.release();
        Ok(())
    }

    // ------------------------------------------------------------------
    // lock / unlock
    // ------------------------------------------------------------------

    /// Acquire the lock `id`, creating it on first reference.
    ///
    /// Returns immediately when the lock is free. Fails with `LockReentry`
    /// if the caller already holds it. Otherwise parks the caller FIFO on
    /// the lock; when `unlock` later hands over ownership the call returns
    /// successfully.
    pub fn lock(&self, id: SyncId) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let Some(me) = st.active_id() else {
            drop(st);
            self.fence.release();
            return Err(ThreadError::NotInitialized);
        };

        let decision = st.locks.entry(id).or_insert_with(|| Lock::new(id)).try_acquire(me);
        match decision {
            Acquire::Acquired => {
                drop(st);
                self.fence.release();
                trace!("thread {me} acquired lock {id}");
                Ok(())
            }
            Acquire::Reentry => {
                drop(st);
                self.fence.release();
                Err(ThreadError::LockReentry(id))
            }
            Acquire::Contended => {
                let mut tcb = st.active.take().expect("active thread vanished");
                tcb.set_state(ThreadState::Blocked);
                let prev = tcb.context_ptr();
                let mgr = st.manager_ptr();
                st.locks
                    .get_mut(&id)
                    .expect("lock record missing")
                    .park(tcb);
                drop(st);
                trace!("thread {me} blocked on lock {id}");

                // Safety: prev/mgr are heap-stable; fence held across the
                // switch.
                unsafe { DefaultArch::context_switch(prev, mgr) };
                self.fence.release();
                // unlock handed us ownership before readying us.
                Ok(())
            }
        }
    }

    /// Release the lock `id` held by the caller.
    ///
    /// With waiters parked, ownership transfers directly to the FIFO head,
    /// which is appended to the ready-queue tail. Never switches context.
    pub fn unlock(&self, id: SyncId) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let Some(me) = st.active_id() else {
            drop(st);
            self.fence.release();
            return Err(ThreadError::NotInitialized);
        };

        let released = match st.locks.get_mut(&id) {
            None => Err(ThreadError::LockNotFound(id)),
            Some(lock) => lock.release(me),
        };
        let out = match released {
            Ok(Some(mut next_owner)) => {
                next_owner.set_state(ThreadState::Ready);
                trace!("lock {id} handed to thread {}", next_owner.id());
                st.ready.push(next_owner);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        drop(st);
        self.fence.release();
        out
    }

    // ------------------------------------------------------------------
    // wait / signal / broadcast
    // ------------------------------------------------------------------

    /// Atomically release `lock_id`, park on `cv_id`, and block.
    ///
    /// Mesa semantics: a wakeup gives no ownership guarantee, so the caller
    /// re-contends for the lock through the full `lock` protocol before the
    /// call returns; any failure of that re-acquisition propagates. On
    /// success the caller holds `lock_id` again.
    pub fn wait(&self, lock_id: SyncId, cv_id: SyncId) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let Some(me) = st.active_id() else {
            drop(st);
            self.fence.release();
            return Err(ThreadError::NotInitialized);
        };

        // Unknown lock id means the caller cannot own it.
        let owns = st.locks.get(&lock_id).is_some_and(|l| l.owned_by(me));
        if !owns {
            drop(st);
            self.fence.release();
            return Err(ThreadError::LockNotOwned(lock_id));
        }

        // Release exactly as unlock does, handing off to any waiter.
        let handoff = st
            .locks
            .get_mut(&lock_id)
            .expect("lock record missing")
            .release(me)
            .expect("ownership verified above");
        if let Some(mut next_owner) = handoff {
            next_owner.set_state(ThreadState::Ready);
            st.ready.push(next_owner);
        }

        let mut tcb = st.active.take().expect("active thread vanished");
        tcb.set_state(ThreadState::Blocked);
        let prev = tcb.context_ptr();
        let mgr = st.manager_ptr();
        st.condvars
            .entry(cv_id)
            .or_insert_with(|| Condvar::new(cv_id))
            .park(tcb);
        drop(st);
        trace!("thread {me} waiting on cv {cv_id} (lock {lock_id})");

        // Safety: prev/mgr are heap-stable; fence held across the switch.
        unsafe { DefaultArch::context_switch(prev, mgr) };
        self.fence.release();

        self.lock(lock_id)
    }

    /// Wake the FIFO-head waiter of `cv_id`, if any.
    ///
    /// Does not require lock ownership and never transfers it: the woken
    /// thread re-acquires the lock itself once scheduled. A no-op on an
    /// unknown or empty condition variable. The lock id is part of the call
    /// signature for symmetry with `wait`; Mesa signal never touches it.
    pub fn signal(&self, _lock_id: SyncId, cv_id: SyncId) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let woken = st.condvars.get_mut(&cv_id).and_then(Condvar::take_one);
        if let Some(mut woken) = woken {
            woken.set_state(ThreadState::Ready);
            trace!("cv {cv_id} signalled thread {}", woken.id());
            st.ready.push(woken);
        }
        drop(st);
        self.fence.release();
        Ok(())
    }

    /// Wake every thread currently parked on `cv_id`, in FIFO order.
    ///
    /// Waiters that arrive afterwards are unaffected.
    pub fn broadcast(&self, _lock_id: SyncId, cv_id: SyncId) -> ThreadResult<()> {
        if !self.is_started() {
            return Err(ThreadError::NotInitialized);
        }
        self.fence.acquire();
        let mut st = self.state.lock();
        let state = &mut *st;
        if let Some(cv) = state.condvars.get_mut(&cv_id) {
            while let Some(mut woken) = cv.take_one() {
                woken.set_state(ThreadState::Ready);
                trace!("cv {cv_id} broadcast woke thread {}", woken.id());
                state.ready.push(woken);
            }
        }
        drop(st);
        self.fence.release();
        Ok(())
    }

    // ------------------------------------------------------------------
    // preemption entry
    // ------------------------------------------------------------------

    /// Asynchronous yield point for an external preemption facility.
    ///
    /// Yields the active thread unless the runtime is inside a
    /// non-preemptible bookkeeping section, in which case it does nothing.
    pub fn preempt_point(&self) {
        if self.is_started() && !self.fence.is_held() {
            let _ = self.yield_now();
        }
    }

    // ------------------------------------------------------------------
    // thread completion
    // ------------------------------------------------------------------

    /// Mark the calling thread finished and leave for the manager, which
    /// reclaims the TCB the next time it pops it. Never returns.
    fn finish_current(&self) -> ! {
        self.fence.acquire();
        let mut st = self.state.lock();
        let mut tcb = st.active.take().expect("active thread vanished");
        tcb.set_state(ThreadState::Finished);
        trace!("thread {} finished", tcb.id());
        let prev = tcb.context_ptr();
        let mgr = st.manager_ptr();
        st.ready.push(tcb);
        drop(st);

        // Safety: prev/mgr are heap-stable; fence held across the switch.
        unsafe { DefaultArch::context_switch(prev, mgr) };
        unreachable!("finished thread resumed by the scheduler")
    }
}

/// First Rust code on a fresh thread's stack; the arch trampolines call this
/// with the runtime pointer seeded at spawn.
///
/// Takes the entry closure out of the active TCB, lowers the fence raised by
/// the dispatching manager, runs the closure, then finishes the thread.
pub(crate) extern "C" fn thread_entry(runtime: *const ()) -> ! {
    // Safety: seeded from `&self` at spawn; threads only execute inside
    // `start`, during which the runtime is alive and pinned behind an Arc.
    let rt = unsafe { &*(runtime as *const Runtime) };
    let entry = {
        let mut st = rt.state.lock();
        st.active
            .as_mut()
            .expect("trampoline without active thread")
            .take_entry()
    };
    rt.fence.release();
    if let Some(entry) = entry {
        entry();
    }
    rt.finish_current()
}

// ============================================================================
// Global convenience surface
// ============================================================================

fn global() -> Option<&'static Runtime> {
    let ptr = GLOBAL_RUNTIME.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        // Safety: register_global's contract makes the pointee outlive us.
        Some(unsafe { &*ptr })
    }
}

/// Yield the current thread of the globally registered runtime.
pub(crate) fn yield_current() {
    if let Some(rt) = global() {
        let _ = rt.yield_now();
    }
}

/// Invoke the preemption yield point of the globally registered runtime.
pub(crate) fn preempt_current() {
    if let Some(rt) = global() {
        rt.preempt_point();
    }
}
