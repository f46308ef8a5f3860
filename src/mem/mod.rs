//! Memory management for thread stacks.

mod stack;

pub use stack::{Stack, MIN_STACK_SIZE, STACK_ALIGN};
