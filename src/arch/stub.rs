//! Inert context shim for unsupported targets.
//!
//! Keeps the crate compiling everywhere; any attempt to actually spawn a
//! thread fails with `ContextSwitchFailure` at context preparation.

use super::Arch;
use crate::errors::{ThreadError, ThreadResult};
use crate::mem::Stack;

/// Placeholder saved context.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubContext;

/// No-op implementation of the context shim.
pub struct StubArch;

impl Arch for StubArch {
    type SavedContext = StubContext;

    unsafe fn context_switch(_prev: *mut StubContext, _next: *const StubContext) {}

    fn prepare_context(
        _ctx: &mut StubContext,
        _stack: &Stack,
        _runtime: *const (),
    ) -> ThreadResult<()> {
        Err(ThreadError::ContextSwitchFailure)
    }
}
