//! Timer type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a competition countdown is measuring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Window in which the athlete lifts and judges vote
    Attempt,
    /// Rest between an athlete's consecutive attempts
    Rest,
    /// Warm-up / platform preparation
    Preparation,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Attempt => f.write_str("attempt"),
            TimerKind::Rest => f.write_str("rest"),
            TimerKind::Preparation => f.write_str("preparation"),
        }
    }
}
