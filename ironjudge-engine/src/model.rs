//! Engine data model
//!
//! Records exchanged with the Store collaborator. The engine mutates
//! `Attempt`, `Vote` and `RecordEntry`; athletes, competitions and panels
//! are read-only inputs owned by the registration layer.

use crate::scoring::strongman::StrongmanEventScoring;
use chrono::{DateTime, Utc};
use ironjudge_common::events::{
    AttemptState, Decision, Discipline, Equipment, RecordType, Resolution, ScoringFormula, Sex,
    Sport,
};
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, JudgeId, RecordId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One timed lift try
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub athlete_id: AthleteId,
    pub competition_id: CompetitionId,
    pub session_id: SessionId,
    pub discipline: Discipline,
    /// 1-based, strictly increasing per (athlete, discipline)
    pub attempt_number: u32,
    pub declared_weight: f64,
    /// Weight on the bar; differs from declared when changed before opening
    pub actual_weight: f64,
    pub state: AttemptState,
    pub decision: Option<Decision>,
    pub resolution: Option<Resolution>,
    pub declared_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Bumped on every mutation; stores drop saves that are not newer
    pub revision: u64,
}

impl Attempt {
    /// Finalized with a valid decision: counts toward totals and records
    pub fn is_good_lift(&self) -> bool {
        self.state == AttemptState::Finalized && self.decision == Some(Decision::Valid)
    }
}

/// A judge's current call on an attempt (unique per attempt and judge)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub attempt_id: AttemptId,
    pub judge_id: JudgeId,
    /// 1-based seat on the panel
    pub position: u8,
    pub decision: Decision,
    pub submitted_at: DateTime<Utc>,
    /// Audit sequence of the write that produced this call; stores keep the highest
    pub sequence: u64,
}

/// Append-only trail of every accepted vote write, corrections included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteAuditEntry {
    pub attempt_id: AttemptId,
    pub judge_id: JudgeId,
    /// Order of acceptance within the attempt, starting at 1
    pub sequence: u64,
    /// Judge's earlier call when this entry is a correction
    pub previous: Option<Decision>,
    pub decision: Decision,
    pub at: DateTime<Utc>,
}

/// Judges assigned to a session, fixed for the session's duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgePanel {
    pub session_id: SessionId,
    /// Seat order: index 0 is position 1
    pub judges: Vec<JudgeId>,
}

impl JudgePanel {
    pub fn new(session_id: SessionId, judges: Vec<JudgeId>) -> Self {
        Self { session_id, judges }
    }

    pub fn size(&self) -> usize {
        self.judges.len()
    }

    /// 1-based seat of a judge, `None` if not on the panel
    pub fn position_of(&self, judge_id: JudgeId) -> Option<u8> {
        self.judges
            .iter()
            .position(|j| *j == judge_id)
            .and_then(|idx| u8::try_from(idx + 1).ok())
    }

    /// Structural checks: at least `min_size` judges, odd unless allowed, no repeats
    pub fn check(&self, min_size: usize, allow_even: bool) -> Result<(), String> {
        if self.judges.len() < min_size {
            return Err(format!(
                "panel for session {} has {} judges, need at least {}",
                self.session_id,
                self.judges.len(),
                min_size
            ));
        }
        if !allow_even && self.judges.len() % 2 == 0 {
            return Err(format!(
                "panel for session {} has an even number of judges ({})",
                self.session_id,
                self.judges.len()
            ));
        }
        let unique: HashSet<_> = self.judges.iter().collect();
        if unique.len() != self.judges.len() {
            return Err(format!("panel for session {} repeats a judge", self.session_id));
        }
        Ok(())
    }
}

/// Registration data the engine needs for scoring and record keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    pub name: String,
    pub sex: Sex,
    /// Weigh-in bodyweight (kg)
    pub bodyweight: f64,
    /// Age at competition, when known
    pub age: Option<u32>,
    /// Age/status category, e.g. "open", "junior", "masters-1"
    pub category: String,
    /// Weight class label, e.g. "93", "84+"
    pub weight_class: String,
    #[serde(default)]
    pub equipment: Equipment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: CompetitionId,
    pub name: String,
    pub sport: Sport,
    /// Ranking formula; the sport's default when absent
    #[serde(default)]
    pub formula: Option<ScoringFormula>,
    /// Record scopes checked on every good lift
    #[serde(default)]
    pub record_types: Vec<RecordType>,
    /// Per-event scoring table (strongman only)
    #[serde(default)]
    pub strongman_events: Vec<StrongmanEventScoring>,
}

impl Competition {
    pub fn ranking_formula(&self) -> ScoringFormula {
        self.formula.unwrap_or_else(|| self.sport.default_formula())
    }
}

/// Identity of a record: one active entry per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub sport: Sport,
    pub discipline: Discipline,
    pub category: String,
    pub weight_class: String,
    pub record_type: RecordType,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.sport, self.discipline, self.category, self.weight_class, self.record_type
        )
    }
}

/// Record history row; superseded rows are deactivated, never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub id: RecordId,
    pub key: RecordKey,
    pub holder_athlete_id: AthleteId,
    pub value: f64,
    pub set_at: DateTime<Utc>,
    /// Ratification happens outside the engine
    pub is_ratified: bool,
    pub is_active: bool,
    /// Attempt that set the record (None for imported history)
    pub attempt_id: Option<AttemptId>,
}

/// Derived per-athlete totals and scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub athlete_id: AthleteId,
    pub competition_id: CompetitionId,
    /// Best good lift per discipline
    pub bests: BTreeMap<Discipline, f64>,
    /// Sum of the sport's disciplines; 0 until every discipline has a good lift
    pub total: f64,
    pub scores: BTreeMap<ScoringFormula, f64>,
    pub bodyweight: f64,
    pub sex: Sex,
    pub age: Option<u32>,
    pub computed_at: DateTime<Utc>,
}

/// Input to `AdjudicationEngine::declare`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareRequest {
    pub athlete_id: AthleteId,
    pub competition_id: CompetitionId,
    pub session_id: SessionId,
    pub discipline: Discipline,
    /// Explicit attempt number; next in sequence when absent
    #[serde(default)]
    pub attempt_number: Option<u32>,
    pub weight: f64,
}
