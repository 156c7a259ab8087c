//! Attempt lifecycle type definitions
//!
//! Supporting types for attempt state, judge decisions and how a decision
//! was reached.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attempt lifecycle state
///
/// `Declared → InProgress → Judged → Finalized`, with `Void` reachable from
/// `Declared` or `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Declared,
    InProgress,
    Judged,
    Finalized,
    Void,
}

impl AttemptState {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Finalized | AttemptState::Void)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptState::Declared => "declared",
            AttemptState::InProgress => "in_progress",
            AttemptState::Judged => "judged",
            AttemptState::Finalized => "finalized",
            AttemptState::Void => "void",
        };
        f.write_str(s)
    }
}

impl FromStr for AttemptState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(AttemptState::Declared),
            "in_progress" => Ok(AttemptState::InProgress),
            "judged" => Ok(AttemptState::Judged),
            "finalized" => Ok(AttemptState::Finalized),
            "void" => Ok(AttemptState::Void),
            other => Err(format!("unknown attempt state: {}", other)),
        }
    }
}

/// A judge's call, and the aggregated call for an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Valid,
    Invalid,
}

impl Decision {
    pub fn is_valid(&self) -> bool {
        matches!(self, Decision::Valid)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Valid => f.write_str("valid"),
            Decision::Invalid => f.write_str("invalid"),
        }
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" | "good" => Ok(Decision::Valid),
            "invalid" | "no_lift" => Ok(Decision::Invalid),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// How a judged attempt reached its decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Every panel judge voted
    Quorum,
    /// The attempt timer ran out and the decision was forced from partial votes
    TimerExpired,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Quorum => f.write_str("quorum"),
            Resolution::TimerExpired => f.write_str("timer_expired"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quorum" => Ok(Resolution::Quorum),
            "timer_expired" => Ok(Resolution::TimerExpired),
            other => Err(format!("unknown resolution: {}", other)),
        }
    }
}
