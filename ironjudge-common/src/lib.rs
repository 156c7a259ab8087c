//! # IronJudge Common Library
//!
//! Shared code for the IronJudge adjudication engine and its collaborators:
//! - Identifier aliases (AttemptId, JudgeId, ...)
//! - Competition domain enums (Sport, Discipline, Decision, ...)
//! - Event types (CompetitionEvent enum) and the EventBus
//! - Configuration file resolution and TOML loading
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod time;

pub use error::{Error, Result};
pub use ids::{AthleteId, AttemptId, CompetitionId, JudgeId, RecordId, SessionId};
