//! Test helper modules for ironjudge-engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestMeet: a registered competition, panel and athletes over a MemoryStore
//! - Event draining and attempt polling helpers
//! - FailingStore: a MemoryStore whose writes fail on demand

#![allow(dead_code)]

pub mod failing_store;
pub mod meet;

// Re-export commonly used types
pub use failing_store::{FailingStore, Op};
pub use meet::{athlete, drain_events, wait_for_state, TestMeet};
