//! x86_64 context switching (System V ABI).
//!
//! A cooperative switch only needs the callee-saved registers: everything
//! else is dead across the `call` into the switch function. The saved `rsp`
//! points at the return address pushed by that call, so restoring a context
//! and executing `ret` resumes it exactly where it switched out.

use super::Arch;
use crate::errors::{ThreadError, ThreadResult};
use crate::mem::{Stack, MIN_STACK_SIZE};
use core::arch::naked_asm;

/// Callee-saved register state for x86_64.
///
/// Field order is fixed: the switch assembly addresses these by offset.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct X86_64Context {
    pub rsp: u64, // 0x00
    pub rbp: u64, // 0x08
    pub rbx: u64, // 0x10
    pub r12: u64, // 0x18
    pub r13: u64, // 0x20
    pub r14: u64, // 0x28
    pub r15: u64, // 0x30
}

#[unsafe(naked)]
extern "C" fn context_switch_raw(_prev: *mut X86_64Context, _next: *const X86_64Context) {
    naked_asm!(
        // Save callee-saved registers into prev (rdi)
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Restore from next (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // A seeded context has the trampoline address on its stack; a
        // switched-out context has its own return address there.
        "ret",
    );
}

/// First code a fresh thread executes.
///
/// `prepare_context` seeds `r12` with the runtime pointer; the trampoline
/// moves it into the argument register and enters the runtime. On entry
/// `rsp % 16 == 8`, so one slot of padding re-establishes ABI alignment for
/// the call. `thread_entry` diverges; the trap after it is unreachable.
#[unsafe(naked)]
extern "C" fn thread_trampoline() {
    naked_asm!(
        "sub rsp, 8",
        "mov rdi, r12",
        "call {entry}",
        "ud2",
        entry = sym crate::runtime::thread_entry,
    );
}

/// x86_64 implementation of the context shim.
pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type SavedContext = X86_64Context;

    unsafe fn context_switch(prev: *mut X86_64Context, next: *const X86_64Context) {
        context_switch_raw(prev, next);
    }

    fn prepare_context(
        ctx: &mut X86_64Context,
        stack: &Stack,
        runtime: *const (),
    ) -> ThreadResult<()> {
        if stack.size() < MIN_STACK_SIZE {
            return Err(ThreadError::ContextSwitchFailure);
        }
        let bottom = stack.stack_bottom() as usize;
        // Seed one 16-aligned slot holding the trampoline address; the
        // switch's `ret` pops it and jumps there.
        let slot = bottom - 16;
        // Safety: slot lies within the stack allocation (size checked above)
        // and is 8-aligned by construction.
        unsafe { *(slot as *mut u64) = thread_trampoline as usize as u64 };

        *ctx = X86_64Context::default();
        ctx.rsp = slot as u64;
        ctx.r12 = runtime as u64;
        Ok(())
    }
}
