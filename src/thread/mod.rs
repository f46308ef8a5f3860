//! Thread control blocks and the thread lifecycle state machine.

use crate::arch::{Arch, DefaultArch};
use crate::errors::ThreadResult;
use crate::mem::Stack;
use core::fmt;
use core::num::NonZeroU64;

type Context = <DefaultArch as Arch>::SavedContext;

/// Entry closure run when a thread is first dispatched.
pub type ThreadEntry = alloc::boxed::Box<dyn FnOnce() + 'static>;

/// Uniquely identifies a thread for the lifetime of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    /// Create a thread ID, rejecting zero.
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Create a thread ID without checking for zero.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `id` is non-zero.
    pub unsafe fn new_unchecked(id: u64) -> Self {
        Self(unsafe { NonZeroU64::new_unchecked(id) })
    }

    /// Get the raw ID value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a thread.
///
/// Exactly one thread is `Running` at any instant, or none while the manager
/// context is active. A `Blocked` thread sits in exactly one waiter queue
/// and moves only through the operation that owns that queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Ready = 0,
    Running = 1,
    Blocked = 2,
    Finished = 3,
}

impl ThreadState {
    /// Whether the lifecycle state machine permits `self -> next`.
    ///
    /// Ready threads only start running when dispatched; a running thread
    /// yields back to Ready, parks as Blocked, or completes as Finished;
    /// blocked threads are only ever woken to Ready; Finished is terminal.
    pub fn can_advance_to(self, next: ThreadState) -> bool {
        matches!(
            (self, next),
            (ThreadState::Ready, ThreadState::Running)
                | (ThreadState::Running, ThreadState::Ready)
                | (ThreadState::Running, ThreadState::Blocked)
                | (ThreadState::Running, ThreadState::Finished)
                | (ThreadState::Blocked, ThreadState::Ready)
        )
    }
}

/// Thread control block.
///
/// Owns the thread's identity, saved execution context, stack buffer, and
/// entry closure. A TCB lives in a `Box` that is *moved* between the ready
/// queue, at most one waiter queue, and the scheduler's active slot, so a
/// thread can never be referenced by two queues at once. Dropping the box
/// releases the stack and context; the scheduler loop is the only place
/// that happens for a dispatched thread.
pub struct Tcb {
    id: ThreadId,
    state: ThreadState,
    context: Context,
    stack: Stack,
    entry: Option<ThreadEntry>,
}

impl fmt::Debug for Tcb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tcb")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// TCBs compare by identity: a `ThreadId` is unique for the lifetime of a
/// runtime, so two control blocks are equal exactly when they are the same
/// thread.
impl PartialEq for Tcb {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tcb {}

impl Tcb {
    /// Build a control block in the `Ready` state.
    pub fn new(id: ThreadId, stack: Stack, entry: ThreadEntry) -> Self {
        Self {
            id,
            state: ThreadState::Ready,
            context: Context::default(),
            stack,
            entry: Some(entry),
        }
    }

    /// The thread's unique identifier.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The thread's current lifecycle state.
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Advance the lifecycle state machine.
    pub fn set_state(&mut self, next: ThreadState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal thread state transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Seed the saved context so the first switch into this thread enters
    /// the runtime trampoline on this thread's own stack.
    pub fn prepare_context(&mut self, runtime: *const ()) -> ThreadResult<()> {
        let Tcb { context, stack, .. } = self;
        DefaultArch::prepare_context(context, stack, runtime)
    }

    /// Raw pointer to the saved context, for the context shim.
    ///
    /// The pointee is heap-stable for the lifetime of the boxed TCB, so the
    /// pointer stays valid while the box moves between queues.
    pub fn context_ptr(&mut self) -> *mut Context {
        &mut self.context
    }

    /// Take the entry closure; yields `Some` exactly once.
    pub fn take_entry(&mut self) -> Option<ThreadEntry> {
        self.entry.take()
    }
}

#[cfg(test)]
impl Tcb {
    /// A minimally-stacked TCB for queue and registry tests.
    pub(crate) fn for_test(raw_id: u64) -> alloc::boxed::Box<Tcb> {
        let stack = Stack::allocate(crate::mem::MIN_STACK_SIZE).expect("test stack");
        let id = ThreadId::new(raw_id).expect("non-zero test id");
        alloc::boxed::Box::new(Tcb::new(id, stack, alloc::boxed::Box::new(|| {})))
    }
}
