//! AArch64 context switching (AAPCS64).
//!
//! Saves and restores the callee-saved registers x19–x28, the frame pointer,
//! the link register, and the stack pointer. `ret` branches to the restored
//! x30, so a fresh context simply seeds x30 with the trampoline address.

use super::Arch;
use crate::errors::{ThreadError, ThreadResult};
use crate::mem::{Stack, MIN_STACK_SIZE};
use core::arch::naked_asm;

/// Callee-saved register state for AArch64.
///
/// Field order is fixed: the switch assembly addresses these by offset.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Aarch64Context {
    pub sp: u64,       // 0x00
    pub x: [u64; 10],  // 0x08  x19..x28
    pub fp: u64,       // 0x58  x29
    pub lr: u64,       // 0x60  x30
}

#[unsafe(naked)]
extern "C" fn context_switch_raw(_prev: *mut Aarch64Context, _next: *const Aarch64Context) {
    naked_asm!(
        // Save into prev (x0)
        "mov x9, sp",
        "str x9, [x0]",
        "stp x19, x20, [x0, #8]",
        "stp x21, x22, [x0, #24]",
        "stp x23, x24, [x0, #40]",
        "stp x25, x26, [x0, #56]",
        "stp x27, x28, [x0, #72]",
        "stp x29, x30, [x0, #88]",
        // Restore from next (x1)
        "ldr x9, [x1]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #8]",
        "ldp x21, x22, [x1, #24]",
        "ldp x23, x24, [x1, #40]",
        "ldp x25, x26, [x1, #56]",
        "ldp x27, x28, [x1, #72]",
        "ldp x29, x30, [x1, #88]",
        "ret",
    );
}

/// First code a fresh thread executes; x19 carries the runtime pointer.
#[unsafe(naked)]
extern "C" fn thread_trampoline() {
    naked_asm!(
        "mov x0, x19",
        "bl {entry}",
        "brk #0",
        entry = sym crate::runtime::thread_entry,
    );
}

/// AArch64 implementation of the context shim.
pub struct Aarch64Arch;

impl Arch for Aarch64Arch {
    type SavedContext = Aarch64Context;

    unsafe fn context_switch(prev: *mut Aarch64Context, next: *const Aarch64Context) {
        context_switch_raw(prev, next);
    }

    fn prepare_context(
        ctx: &mut Aarch64Context,
        stack: &Stack,
        runtime: *const (),
    ) -> ThreadResult<()> {
        if stack.size() < MIN_STACK_SIZE {
            return Err(ThreadError::ContextSwitchFailure);
        }
        *ctx = Aarch64Context::default();
        // SP must stay 16-aligned; Stack guarantees that for the bottom.
        ctx.sp = stack.stack_bottom() as u64;
        ctx.lr = thread_trampoline as usize as u64;
        ctx.x[0] = runtime as u64; // x19
        Ok(())
    }
}
