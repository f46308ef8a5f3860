//! Ready queue with strict-FIFO dispatch order.

use crate::thread::Tcb;
use alloc::boxed::Box;
use alloc::collections::VecDeque;

/// FIFO queue of runnable threads.
///
/// The scheduler dispatches in exactly the order threads were enqueued: no
/// priorities, no timeouts, no reordering. Enqueueing takes ownership of the
/// boxed TCB, so a thread that is here cannot simultaneously sit in a waiter
/// queue or the active slot.
pub struct ReadyQueue {
    queue: VecDeque<Box<Tcb>>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append a runnable thread at the tail.
    pub fn push(&mut self, tcb: Box<Tcb>) {
        self.queue.push_back(tcb);
    }

    /// Pop the head, the next thread to dispatch.
    pub fn pop(&mut self) -> Option<Box<Tcb>> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
