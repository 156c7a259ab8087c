//! Attempt state machine
//!
//! **Module Structure:**
//! - `core.rs`: engine construction, lifecycle, attempt slots, snapshots
//! - `attempts.rs`: declare, change weight, open, void, finalize
//! - `voting.rs`: vote submission and timer expiry handling
//! - `timers.rs`: competition timer controls

mod attempts;
mod core;
mod timers;
mod voting;

pub use self::attempts::{DeclareOutcome, FinalizeOutcome};
pub use self::core::AdjudicationEngine;
pub use self::voting::VoteReceipt;
