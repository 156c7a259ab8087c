//! # IronJudge Adjudication Engine (ironjudge-engine)
//!
//! Live attempt adjudication for strength-sport competitions.
//!
//! **Purpose:** Turn concurrently submitted judge votes into an authoritative
//! decision for a timed lift, drive the per-competition countdown, detect
//! broken records and fold valid attempts into ranked totals.
//!
//! **Architecture:** The `AdjudicationEngine` owns one mutex-guarded slot per
//! attempt. Timers run as owned tokio tasks and signal expiry over an mpsc
//! channel; results leave the engine through the `Store` collaborator and the
//! `EventBus`.

pub mod config;
pub mod error;
pub mod judging;
pub mod leaderboard;
pub mod locks;
pub mod model;
pub mod records;
pub mod scoring;
pub mod store;
pub mod validation;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use judging::AdjudicationEngine;
pub use model::DeclareRequest;
pub use store::{MemoryStore, RegistrationStore, SqliteStore, Store, StoreError};
