//! Shared snapshot types carried inside events

use super::{Discipline, ScoringFormula};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One formula's score for an athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaScore {
    pub formula: ScoringFormula,
    pub score: f64,
}

/// Best valid lift in one discipline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisciplineBest {
    pub discipline: Discipline,
    pub weight: f64,
}

/// One leaderboard row as transmitted to display clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingInfo {
    /// 1-based rank; equal score and total share a rank
    pub rank: usize,
    pub athlete_id: Uuid,
    pub total: f64,
    pub score: f64,
    pub formula: ScoringFormula,
    pub bests: Vec<DisciplineBest>,
}
