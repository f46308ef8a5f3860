//! End-to-end and property tests for the runtime.
//!
//! Each test builds its own `Runtime` and drives it to completion on the
//! test thread; exactly one test touches the process-wide registration.

mod integration;
