//! Key chain test suite
//!
//! Everything runs against the in-memory backends unless a test needs
//! state to outlive one key chain.

mod transfer_tests;

pub mod helpers;
