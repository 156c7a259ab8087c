//! Vote aggregation
//!
//! `VoteSet` holds the current call of every judge on one attempt plus the
//! append-only audit trail of accepted writes. The decision is pure counting
//! over the current calls, so the order votes arrive in never changes it.
//!
//! `VoteSet` does no locking of its own; the engine keeps one inside each
//! attempt slot and mutates it under the slot mutex.

use crate::config::TiePolicy;
use crate::model::{Vote, VoteAuditEntry};
use chrono::{DateTime, Utc};
use ironjudge_common::events::Decision;
use ironjudge_common::{AttemptId, JudgeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a submitted vote changed the set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    /// First call from this judge
    Recorded,
    /// Judge replaced an earlier, different call
    Corrected { previous: Decision },
    /// Identical resubmission (replay after reconnect); nothing written
    Unchanged,
}

impl VoteOutcome {
    pub fn is_write(&self) -> bool {
        !matches!(self, VoteOutcome::Unchanged)
    }
}

/// Result of `VoteSet::record`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedVote {
    pub outcome: VoteOutcome,
    /// Judge's current call after the write
    pub vote: Vote,
    /// Audit entry to persist; `None` for an unchanged resubmission
    pub audit: Option<VoteAuditEntry>,
}

/// Counting snapshot of a vote set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub panel_size: usize,
    pub quorum_reached: bool,
    /// Decision the current calls produce (tie policy applied)
    pub decision: Decision,
}

#[derive(Debug, Clone)]
pub struct VoteSet {
    attempt_id: AttemptId,
    panel_size: usize,
    min_votes_for_quorum: usize,
    tie_policy: TiePolicy,
    votes: BTreeMap<JudgeId, Vote>,
    audit: Vec<VoteAuditEntry>,
}

impl VoteSet {
    pub fn new(
        attempt_id: AttemptId,
        panel_size: usize,
        min_votes_for_quorum: usize,
        tie_policy: TiePolicy,
    ) -> Self {
        Self {
            attempt_id,
            panel_size,
            min_votes_for_quorum,
            tie_policy,
            votes: BTreeMap::new(),
            audit: Vec::new(),
        }
    }

    /// Rebuild from persisted votes and audit trail
    pub fn restore(mut self, votes: Vec<Vote>, audit: Vec<VoteAuditEntry>) -> Self {
        for vote in votes {
            self.votes.insert(vote.judge_id, vote);
        }
        self.audit = audit;
        self.audit.sort_by_key(|e| e.sequence);
        self
    }

    fn next_sequence(&self) -> u64 {
        let from_audit = self.audit.last().map_or(0, |e| e.sequence);
        let from_votes = self.votes.values().map(|v| v.sequence).max().unwrap_or(0);
        from_audit.max(from_votes) + 1
    }

    /// Apply one judge's call
    ///
    /// Overwrites the judge's earlier call (a correction) and appends to the
    /// audit trail; an identical resubmission changes nothing.
    pub fn record(
        &mut self,
        judge_id: JudgeId,
        position: u8,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> RecordedVote {
        let previous = self.votes.get(&judge_id).cloned();
        if let Some(existing) = &previous {
            if existing.decision == decision {
                return RecordedVote {
                    outcome: VoteOutcome::Unchanged,
                    vote: existing.clone(),
                    audit: None,
                };
            }
        }

        let sequence = self.next_sequence();
        let vote = Vote {
            attempt_id: self.attempt_id,
            judge_id,
            position,
            decision,
            submitted_at: at,
            sequence,
        };
        let entry = VoteAuditEntry {
            attempt_id: self.attempt_id,
            judge_id,
            sequence,
            previous: previous.as_ref().map(|v| v.decision),
            decision,
            at,
        };
        self.votes.insert(judge_id, vote.clone());
        self.audit.push(entry.clone());

        let outcome = match previous {
            Some(old) => VoteOutcome::Corrected {
                previous: old.decision,
            },
            None => VoteOutcome::Recorded,
        };
        RecordedVote {
            outcome,
            vote,
            audit: Some(entry),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.votes.values().filter(|v| v.decision.is_valid()).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.votes.len() - self.valid_count()
    }

    pub fn cast(&self) -> usize {
        self.votes.len()
    }

    pub fn panel_size(&self) -> usize {
        self.panel_size
    }

    /// Every seat has voted and the hard floor of votes is met
    pub fn quorum_reached(&self) -> bool {
        let cast = self.cast();
        cast >= self.panel_size && cast >= self.min_votes_for_quorum
    }

    /// Majority of current calls; ties (including no votes) follow the tie policy
    pub fn decision(&self) -> Decision {
        let valid = self.valid_count();
        let invalid = self.invalid_count();
        if valid > invalid {
            Decision::Valid
        } else if invalid > valid {
            Decision::Invalid
        } else {
            match self.tie_policy {
                TiePolicy::Invalid => Decision::Invalid,
                TiePolicy::Valid if valid > 0 => Decision::Valid,
                // No votes at all is never a good lift
                TiePolicy::Valid => Decision::Invalid,
            }
        }
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            valid_count: self.valid_count(),
            invalid_count: self.invalid_count(),
            panel_size: self.panel_size,
            quorum_reached: self.quorum_reached(),
            decision: self.decision(),
        }
    }

    /// Current calls in seat order
    pub fn votes(&self) -> Vec<Vote> {
        let mut votes: Vec<Vote> = self.votes.values().cloned().collect();
        votes.sort_by_key(|v| v.position);
        votes
    }

    pub fn audit(&self) -> &[VoteAuditEntry] {
        &self.audit
    }
}
