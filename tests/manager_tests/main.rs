//! Zone manager tests
//!
//! Managers here run without background workers unless a test starts them,
//! so flushes and GC happen exactly when a test asks for them.

mod common;

mod append_tests;
mod gc_tests;
mod recovery_tests;
