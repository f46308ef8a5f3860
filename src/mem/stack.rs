//! Owned stack buffers for threads.
//!
//! Each thread gets one fixed-size stack, allocated at creation and released
//! exactly once when its control block is reclaimed. The buffer is
//! exclusively owned by the TCB; `Drop` is the single release point.

use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

/// Alignment for stack buffers and initial stack pointers.
pub const STACK_ALIGN: usize = 16;

/// Smallest stack the context shim will accept.
pub const MIN_STACK_SIZE: usize = 4096;

/// A heap-allocated thread stack.
pub struct Stack {
    /// Start of the stack memory (lowest address)
    memory: NonNull<u8>,
    layout: Layout,
}

impl Stack {
    /// Allocate a stack of `size` bytes.
    ///
    /// Returns `None` if the size is zero or the allocation fails.
    pub fn allocate(size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, STACK_ALIGN).ok()?;
        // Safety: layout has non-zero size.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).map(|memory| Self { memory, layout })
    }

    /// Usable stack size in bytes.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Pointer to the top of the stack memory (lowest address).
    pub fn stack_top(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    /// Pointer to the bottom of the stack (highest address), aligned down to
    /// [`STACK_ALIGN`]. Stacks grow downward, so this is the initial stack
    /// pointer for a fresh context.
    pub fn stack_bottom(&self) -> *mut u8 {
        let mut sp = self.memory.as_ptr() as usize + self.layout.size();
        sp &= !(STACK_ALIGN - 1);
        sp as *mut u8
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // Safety: memory was allocated with this exact layout and is
        // released exactly once.
        unsafe { dealloc(self.memory.as_ptr(), self.layout) };
    }
}
