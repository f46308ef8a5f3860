//! Execution-context shim: opaque capture/restore of a stack + register set.
//!
//! The scheduler depends on this capability boundary rather than embedding
//! platform-specific context manipulation: a switch atomically saves the
//! caller's callee-saved state and restores another context's, and a fresh
//! context is seeded so its first dispatch enters the runtime's thread
//! trampoline on the thread's own stack.

use crate::errors::ThreadResult;
use crate::mem::Stack;

/// Architecture abstraction for context switching.
///
/// # Safety
///
/// Implementations manipulate raw register state with inline assembly.
/// `context_switch` has preconditions the caller must uphold.
pub trait Arch {
    /// Saved register state sufficient to resume execution at the exact
    /// point it was captured.
    type SavedContext: Default;

    /// Switch from one execution context to another.
    ///
    /// Saves the current state into `prev` and restores `next`. Returns only
    /// when some later switch restores `prev`.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly aligned contexts
    ///   that stay allocated for the duration of the call
    /// - `next` must hold a valid execution state: either seeded by
    ///   [`Arch::prepare_context`] or saved by an earlier switch
    /// - The asynchronous yield point must be masked for the whole
    ///   bookkeeping-plus-switch pair
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Seed a fresh context so the first switch into it invokes the runtime
    /// trampoline on `stack`, carrying `runtime` as the trampoline argument.
    ///
    /// Fails with `ContextSwitchFailure` when the stack cannot host a
    /// context, the one point where the shim can detect that a context
    /// is not to be trusted.
    fn prepare_context(
        ctx: &mut Self::SavedContext,
        stack: &Stack,
        runtime: *const (),
    ) -> ThreadResult<()>;
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64Arch as DefaultArch;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::Aarch64Arch as DefaultArch;

// Inert fallback so the crate still builds on other targets; spawning
// threads there fails with ContextSwitchFailure.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub mod stub;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub use stub::StubArch as DefaultArch;
