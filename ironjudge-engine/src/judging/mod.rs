//! Live attempt judging
//!
//! **Module Structure:**
//! - `votes`: vote set, tally and decision rule
//! - `timer`: per-competition countdowns and expiry signalling
//! - `engine`: the attempt state machine tying votes, timers, scoring,
//!   records and the leaderboard together

mod engine;
pub mod timer;
pub mod votes;

pub use engine::{AdjudicationEngine, DeclareOutcome, FinalizeOutcome, VoteReceipt};
pub use timer::{TimerHandle, TimerRegistry, TimerSignal};
pub use votes::{VoteOutcome, VoteSet, VoteTally};
