//! Error handling for the cooperative thread runtime.
//!
//! Every public operation returns a [`ThreadResult`]. All non-fatal errors
//! are local: the failing operation leaves shared scheduler state untouched
//! and the caller decides whether to abort. [`ThreadError::ContextSwitchFailure`]
//! is the one unrecoverable kind: once a context cannot be prepared or
//! trusted there is no safe continuation.

use crate::sync::SyncId;
use core::fmt;

/// Result type for runtime operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all runtime operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// An operation was used before the runtime was started
    NotInitialized,
    /// The runtime was started a second time
    AlreadyInitialized,
    /// Unlock of a lock id that has never been locked
    LockNotFound(SyncId),
    /// Unlock or wait by a thread that does not own the lock
    LockNotOwned(SyncId),
    /// A thread tried to re-acquire a lock it already holds
    LockReentry(SyncId),
    /// Out of memory for a thread stack
    StackExhausted,
    /// The execution-context shim could not produce a usable context
    ContextSwitchFailure,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::NotInitialized => write!(f, "thread runtime not initialized"),
            ThreadError::AlreadyInitialized => write!(f, "thread runtime already initialized"),
            ThreadError::LockNotFound(id) => write!(f, "lock {} has never been locked", id),
            ThreadError::LockNotOwned(id) => write!(f, "lock {} not owned by caller", id),
            ThreadError::LockReentry(id) => write!(f, "lock {} already held by caller", id),
            ThreadError::StackExhausted => write!(f, "out of memory for thread stack"),
            ThreadError::ContextSwitchFailure => write!(f, "execution context unusable"),
        }
    }
}
