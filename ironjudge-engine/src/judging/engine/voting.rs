//! Vote submission and timer expiry
//!
//! **Responsibilities:**
//! - Accept judge calls for in-progress and judged attempts
//! - Move an attempt to judged once the panel has fully voted
//! - Force (or void) a decision when the attempt timer runs out
//!
//! Votes and expiry race on the same slot lock; whichever acquires it first
//! sees the other's effect.

use super::core::AdjudicationEngine;
use crate::config::ExpiryPolicy;
use crate::error::{Error, Result};
use crate::judging::timer::TimerSignal;
use crate::judging::votes::{VoteOutcome, VoteTally};
use crate::model::Attempt;
use ironjudge_common::events::{AttemptState, CompetitionEvent, Decision, Resolution};
use ironjudge_common::{AttemptId, CompetitionId, JudgeId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What a vote submission did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub tally: VoteTally,
    /// Attempt state after the vote
    pub state: AttemptState,
    /// Set once the attempt is judged
    pub decision: Option<Decision>,
    pub resolution: Option<Resolution>,
}

impl AdjudicationEngine {
    /// Record a judge's call
    ///
    /// A judge may change their call until the attempt is finalized; the
    /// latest call counts and every change is kept in the audit trail.
    pub async fn submit_vote(
        &self,
        attempt_id: AttemptId,
        judge_id: JudgeId,
        decision: Decision,
    ) -> Result<VoteReceipt> {
        let slot = self.slot(attempt_id).await?;

        let (receipt, writes, judged, competition_id) = {
            let mut guard = slot.lock().await;
            let state = guard.attempt.state;
            match state {
                AttemptState::Finalized => return Err(Error::AttemptClosed(attempt_id)),
                AttemptState::Declared | AttemptState::Void => {
                    return Err(Error::InvalidTransition {
                        attempt_id,
                        from: state,
                        action: "vote",
                    })
                }
                AttemptState::InProgress | AttemptState::Judged => {}
            }

            let Some(position) = guard.panel.position_of(judge_id) else {
                warn!(
                    "Rejected vote from judge {} on attempt {}: not on the panel",
                    judge_id, attempt_id
                );
                return Err(Error::UnauthorizedJudge {
                    judge_id,
                    session_id: guard.panel.session_id,
                });
            };

            let now = ironjudge_common::time::now();
            let recorded = guard.votes.record(judge_id, position, decision, now);
            let tally = guard.votes.tally();
            let competition_id = guard.attempt.competition_id;

            let retrying = !recorded.outcome.is_write();
            if !retrying {
                guard.stage_vote(&recorded.vote, recorded.audit.as_ref());
            } else if guard.has_pending_writes() {
                debug!(
                    "Judge {} resubmitted {} on attempt {}, retrying unsaved writes",
                    judge_id, decision, attempt_id
                );
            } else {
                debug!(
                    "Judge {} resubmitted {} on attempt {}",
                    judge_id, decision, attempt_id
                );
                let receipt = VoteReceipt {
                    outcome: recorded.outcome,
                    tally,
                    state,
                    decision: guard.attempt.decision,
                    resolution: guard.attempt.resolution,
                };
                return Ok(receipt);
            }

            let mut judged = false;
            let mut changed = false;
            match state {
                AttemptState::InProgress if tally.quorum_reached => {
                    guard.attempt.state = AttemptState::Judged;
                    guard.attempt.decision = Some(tally.decision);
                    guard.attempt.resolution = Some(Resolution::Quorum);
                    guard.attempt.resolved_at = Some(now);
                    self.timers.cancel_for_attempt(competition_id, attempt_id);
                    judged = true;
                    changed = true;
                }
                AttemptState::Judged => {
                    // Corrections after the decision still count until finalization
                    if guard.attempt.decision != Some(tally.decision) {
                        guard.attempt.decision = Some(tally.decision);
                        changed = true;
                    }
                    if tally.quorum_reached
                        && guard.attempt.resolution == Some(Resolution::TimerExpired)
                    {
                        guard.attempt.resolution = Some(Resolution::Quorum);
                        changed = true;
                    }
                }
                _ => {}
            }
            if changed {
                guard.commit();
            }

            let receipt = VoteReceipt {
                outcome: recorded.outcome,
                tally,
                state: guard.attempt.state,
                decision: guard.attempt.decision,
                resolution: guard.attempt.resolution,
            };
            // A retry re-announces the judgement its failed write never published
            let judged = judged || (retrying && guard.attempt.state == AttemptState::Judged);
            (receipt, guard.pending_writes(), judged, competition_id)
        };

        self.write_pending(&slot, &writes).await?;

        let tally = receipt.tally;
        debug!(
            "Vote {} from judge {} on attempt {} ({}/{} valid, {} invalid)",
            decision, judge_id, attempt_id, tally.valid_count, tally.panel_size, tally.invalid_count
        );
        self.bus.emit_lossy(CompetitionEvent::VoteTallyUpdated {
            attempt_id,
            competition_id,
            valid_count: tally.valid_count,
            invalid_count: tally.invalid_count,
            panel_size: tally.panel_size,
            quorum_reached: tally.quorum_reached,
            correction: matches!(receipt.outcome, VoteOutcome::Corrected { .. }),
            timestamp: ironjudge_common::time::now(),
        });

        if let (Some(attempt), Some(decision), Some(resolution)) =
            (&writes.attempt, receipt.decision, receipt.resolution)
        {
            if judged {
                info!(
                    "Attempt {} judged {} ({}, {}-{})",
                    attempt_id, decision, resolution, tally.valid_count, tally.invalid_count
                );
            } else {
                info!(
                    "Attempt {} decision now {} ({}) after vote change",
                    attempt_id, decision, resolution
                );
            }
            self.bus.emit_lossy(CompetitionEvent::AttemptJudged {
                attempt_id,
                competition_id: attempt.competition_id,
                decision,
                resolution,
                valid_count: tally.valid_count,
                invalid_count: tally.invalid_count,
                timestamp: ironjudge_common::time::now(),
            });
        }

        Ok(receipt)
    }

    /// Resolve an attempt whose timer ran out
    ///
    /// Returns the updated attempt, or `None` when the signal no longer
    /// applies (timer replaced, attempt already judged or voided).
    pub(super) async fn handle_timer_expiry(&self, signal: TimerSignal) -> Result<Option<Attempt>> {
        let Some(attempt_id) = signal.attempt_id else {
            return Ok(None);
        };
        if self.timers.is_superseded(&signal) {
            debug!(
                "Ignoring superseded expiry for attempt {} (generation {})",
                attempt_id, signal.generation
            );
            return Ok(None);
        }

        let slot = self.slot(attempt_id).await?;
        let (attempt, writes, tally) = {
            let mut guard = slot.lock().await;
            if guard.attempt.state != AttemptState::InProgress {
                debug!(
                    "Expiry for attempt {} ignored in state {}",
                    attempt_id, guard.attempt.state
                );
                return Ok(None);
            }

            let tally = guard.votes.tally();
            let now = ironjudge_common::time::now();
            match self.config.expiry_policy {
                ExpiryPolicy::ForceDecision => {
                    guard.attempt.state = AttemptState::Judged;
                    guard.attempt.decision = Some(tally.decision);
                    guard.attempt.resolution = Some(Resolution::TimerExpired);
                }
                ExpiryPolicy::Void => {
                    guard.attempt.state = AttemptState::Void;
                }
            }
            guard.attempt.resolved_at = Some(now);
            (guard.commit(), guard.pending_writes(), tally)
        };

        self.write_pending(&slot, &writes).await?;

        match (attempt.decision, attempt.resolution) {
            (Some(decision), Some(resolution)) => {
                info!(
                    "Attempt {} timed out, decided {} from {} of {} votes",
                    attempt_id,
                    decision,
                    tally.valid_count + tally.invalid_count,
                    tally.panel_size
                );
                self.bus.emit_lossy(CompetitionEvent::AttemptJudged {
                    attempt_id,
                    competition_id: attempt.competition_id,
                    decision,
                    resolution,
                    valid_count: tally.valid_count,
                    invalid_count: tally.invalid_count,
                    timestamp: ironjudge_common::time::now(),
                });
            }
            _ => {
                info!("Attempt {} timed out and was voided", attempt_id);
                self.bus.emit_lossy(CompetitionEvent::AttemptVoided {
                    attempt_id,
                    competition_id: attempt.competition_id,
                    reason: "attempt timer expired".to_string(),
                    timestamp: ironjudge_common::time::now(),
                });
            }
        }

        Ok(Some(attempt))
    }

    /// Check the competition's timer now and resolve its attempt if it expired
    ///
    /// For callers that drive time themselves; the background handler does
    /// the same thing on its own once [`AdjudicationEngine::start`] ran.
    pub async fn poll_timer(&self, competition_id: CompetitionId) -> Result<Option<Attempt>> {
        match self.timers.poll_expired(competition_id) {
            Some(signal) => self.handle_timer_expiry(signal).await,
            None => Ok(None),
        }
    }
}
