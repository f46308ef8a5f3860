#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Cooperative user-level threading inside a single OS execution stream.
//!
//! This library provides a non-preemptive thread runtime: many logical
//! threads multiplexed onto one OS thread, with control handed over only at
//! explicit switch points (`yield_now`, a contended `lock`, `wait`, or
//! thread completion). On top of the scheduler it exposes the classic
//! synchronization primitives, mutual-exclusion locks and Mesa-style
//! condition variables, keyed by caller-chosen integer identifiers.
//!
//! # Quick Start
//!
//! ```
//! extern crate std;
//! use coop_threads::Runtime;
//! use core::cell::Cell;
//! use std::rc::Rc;
//!
//! let rt = Runtime::new();
//! let counter = Rc::new(Cell::new(0));
//!
//! let rt2 = rt.clone();
//! let c = counter.clone();
//! rt.start(move || {
//!     for _ in 0..3 {
//!         let rt3 = rt2.clone();
//!         let c = c.clone();
//!         rt2.spawn(move || {
//!             c.set(c.get() + 1);
//!             rt3.yield_now().unwrap();
//!         })
//!         .unwrap();
//!     }
//! })
//! .unwrap();
//!
//! assert_eq!(counter.get(), 3);
//! ```
//!
//! # Architecture
//!
//! The library is organized around a few key abstractions:
//! - An execution-context shim ([`arch::Arch`]) that saves and restores
//!   callee-saved register state, treated as an opaque capability boundary
//! - A thread control block ([`thread::Tcb`]) that exclusively owns its
//!   stack and saved context until the scheduler reclaims it
//! - A strict-FIFO ready queue and FIFO waiter queues, between which a TCB
//!   moves by ownership transfer so it can never be in two places at once
//! - A manager context (the scheduler loop) that is the only code switching
//!   *into* threads; every blocking operation switches *out* to it
//!
//! Scheduling is strictly cooperative. An external preemption facility may
//! invoke [`Runtime::preempt_point`] at arbitrary times; the runtime masks
//! that entry during its own bookkeeping so queue state stays consistent.

// Core modules
pub mod arch;
pub mod errors;
pub mod mem;
pub mod preempt;
pub mod runtime;
pub mod sched;
pub mod sync;
pub mod thread;

#[cfg(test)]
extern crate std;

extern crate alloc;

#[cfg(test)]
mod tests;

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, DefaultArch};

// Runtime
pub use runtime::{Runtime, DEFAULT_STACK_SIZE};

// Threads
pub use thread::{ThreadId, ThreadState};

// Synchronization
pub use sync::SyncId;

// Memory management
pub use mem::Stack;

// Errors
pub use errors::{ThreadError, ThreadResult};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Yield the current thread back to the scheduler.
///
/// The thread goes to the ready-queue tail and resumes once every thread
/// ahead of it has run. Uses the globally registered runtime; does nothing
/// if none has been registered.
#[inline]
pub fn yield_now() {
    runtime::yield_current();
}

/// Asynchronous yield point for an external preemption facility.
///
/// Safe to invoke at arbitrary times: it is a no-op while the runtime is
/// inside its own bookkeeping, before the runtime starts, or when no global
/// runtime has been registered.
#[inline]
pub fn preempt_point() {
    runtime::preempt_current();
}
