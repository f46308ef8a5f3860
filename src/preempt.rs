//! Preemption fence.
//!
//! All queue and registry mutation in the runtime must behave as a
//! non-preemptible section: an asynchronous preemption facility must not
//! fire between the start of bookkeeping (say, appending to a waiter queue)
//! and the completion of the matching context switch. The fence is a depth
//! counter that every operation raises before touching scheduler state; the
//! external yield point checks it and backs off while it is held.
//!
//! Across a context switch the count is exactly one: the side entering the
//! switch has acquired, and the side that resumes releases. The count is
//! zero only while client thread code runs.

use portable_atomic::{AtomicU32, Ordering};

/// Depth counter masking the asynchronous yield point.
pub struct PreemptFence {
    depth: AtomicU32,
}

impl PreemptFence {
    pub const fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
        }
    }

    /// Enter a non-preemptible section. Nests.
    pub fn acquire(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Leave a non-preemptible section.
    pub fn release(&self) {
        let prev = self.depth.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "preemption fence released while not held");
    }

    /// Whether any section is active.
    pub fn is_held(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }
}

impl Default for PreemptFence {
    fn default() -> Self {
        Self::new()
    }
}
