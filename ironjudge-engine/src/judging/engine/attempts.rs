//! Attempt lifecycle operations
//!
//! **Responsibilities:**
//! - declare (validator + attempt numbering), weight changes before opening
//! - open (starts the competition's attempt timer), void
//! - finalize: publish score, records and standings, then store the
//!   finalized attempt
//!
//! Store writes and event publication happen after the slot lock is
//! released.

use super::core::{AdjudicationEngine, AttemptSlot};
use crate::error::{Error, Result};
use crate::judging::timer::TimerHandle;
use crate::leaderboard::{self, Standing};
use crate::model::{Athlete, Attempt, Competition, DeclareRequest, RecordKey, ScoreRecord};
use crate::records::RecordCheck;
use crate::scoring::{self, strongman::PerformanceDirection};
use ironjudge_common::events::{
    AttemptState, CompetitionEvent, Discipline, FormulaScore, ScoringFormula, Sport, TimerKind,
};
use ironjudge_common::AttemptId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Accepted declaration (or weight change) and its non-fatal warnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareOutcome {
    pub attempt: Attempt,
    pub warnings: Vec<String>,
}

/// Everything `finalize` produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    pub attempt: Attempt,
    /// Athlete's recomputed score (valid attempts only)
    pub score: Option<ScoreRecord>,
    /// Record checks that set a new record
    pub records: Vec<RecordCheck>,
    pub standings: Vec<Standing>,
}

fn validation_error(message: impl Into<String>) -> Error {
    Error::Validation {
        errors: vec![message.into()],
    }
}

fn discipline_allowed(sport: Sport, discipline: &Discipline) -> bool {
    match sport {
        Sport::Strongman => discipline.is_strongman_event(),
        _ => sport.disciplines().contains(discipline),
    }
}

impl AdjudicationEngine {
    /// Validate and queue a new attempt
    ///
    /// Prior attempts of the athlete in the discipline must be finalized or
    /// void. The next attempt number is assigned when the request has none.
    pub async fn declare(&self, request: DeclareRequest) -> Result<DeclareOutcome> {
        let competition = self.store.load_competition(request.competition_id).await?;
        // Existence check; athlete data is read again when scoring
        self.store.load_athlete(request.athlete_id).await?;
        let panel = self.store.load_panel(request.session_id).await?;

        if !discipline_allowed(competition.sport, &request.discipline) {
            return Err(validation_error(format!(
                "{} is not contested in {}",
                request.discipline, competition.sport
            )));
        }
        panel
            .check(
                self.config.min_votes_for_quorum.max(3),
                self.config.allow_even_panel,
            )
            .map_err(validation_error)?;

        let _guard = self
            .declare_locks
            .acquire(&(request.athlete_id, request.discipline.clone()))
            .await;

        let previous: Vec<Attempt> = self
            .store
            .list_attempts(request.competition_id)
            .await?
            .into_iter()
            .filter(|a| a.athlete_id == request.athlete_id && a.discipline == request.discipline)
            .collect();

        if let Some(pending) = previous.iter().find(|a| !a.state.is_terminal()) {
            return Err(validation_error(format!(
                "attempt {} in {} is still {}",
                pending.attempt_number, pending.discipline, pending.state
            )));
        }

        let numbers: Vec<u32> = previous.iter().map(|a| a.attempt_number).collect();
        let attempt_number = self
            .validator
            .next_attempt_number(request.attempt_number, &numbers)
            .map_err(validation_error)?;

        let prior_valid: Vec<f64> = previous
            .iter()
            .filter(|a| a.is_good_lift())
            .map(|a| a.actual_weight)
            .collect();
        let report = self.validator.validate(
            request.weight,
            &prior_valid,
            competition.sport,
            &request.discipline,
        );
        if !report.ok {
            warn!(
                "Rejected declaration of {} kg {} for athlete {}: {}",
                request.weight,
                request.discipline,
                request.athlete_id,
                report.errors.join("; ")
            );
            return Err(Error::Validation {
                errors: report.errors,
            });
        }

        let now = ironjudge_common::time::now();
        let attempt = Attempt {
            id: ironjudge_common::ids::generate(),
            athlete_id: request.athlete_id,
            competition_id: request.competition_id,
            session_id: request.session_id,
            discipline: request.discipline,
            attempt_number,
            declared_weight: request.weight,
            actual_weight: request.weight,
            state: AttemptState::Declared,
            decision: None,
            resolution: None,
            declared_at: now,
            opened_at: None,
            resolved_at: None,
            finalized_at: None,
            revision: 1,
        };

        self.store.save_attempt(&attempt).await?;
        let votes = self.new_vote_set(attempt.id, &panel);
        self.insert_slot(AttemptSlot::new(attempt.clone(), panel, votes))
            .await;

        info!(
            "Declared attempt {} ({} #{}, {} kg) for athlete {}",
            attempt.id, attempt.discipline, attempt_number, attempt.declared_weight, attempt.athlete_id
        );
        self.bus.emit_lossy(CompetitionEvent::AttemptDeclared {
            attempt_id: attempt.id,
            competition_id: attempt.competition_id,
            athlete_id: attempt.athlete_id,
            discipline: attempt.discipline.clone(),
            attempt_number,
            weight: attempt.declared_weight,
            warnings: report.warnings.clone(),
            timestamp: now,
        });

        Ok(DeclareOutcome {
            attempt,
            warnings: report.warnings,
        })
    }

    /// Change the bar weight of a declared attempt (re-validated)
    pub async fn change_weight(&self, attempt_id: AttemptId, weight: f64) -> Result<DeclareOutcome> {
        let current = self.attempt(attempt_id).await?;
        if current.state != AttemptState::Declared {
            return Err(Error::InvalidTransition {
                attempt_id,
                from: current.state,
                action: "change weight",
            });
        }

        let competition = self.store.load_competition(current.competition_id).await?;
        let prior_valid: Vec<f64> = self
            .store
            .list_attempts(current.competition_id)
            .await?
            .into_iter()
            .filter(|a| {
                a.athlete_id == current.athlete_id
                    && a.discipline == current.discipline
                    && a.id != attempt_id
                    && a.is_good_lift()
            })
            .map(|a| a.actual_weight)
            .collect();
        let report =
            self.validator
                .validate(weight, &prior_valid, competition.sport, &current.discipline);
        if !report.ok {
            return Err(Error::Validation {
                errors: report.errors,
            });
        }

        let slot = self.slot(attempt_id).await?;
        let (attempt, writes, old_weight) = {
            let mut guard = slot.lock().await;
            // Re-check: the attempt may have been opened meanwhile
            if guard.attempt.state != AttemptState::Declared {
                return Err(Error::InvalidTransition {
                    attempt_id,
                    from: guard.attempt.state,
                    action: "change weight",
                });
            }
            let old_weight = guard.attempt.actual_weight;
            guard.attempt.actual_weight = weight;
            (guard.commit(), guard.pending_writes(), old_weight)
        };

        self.write_pending(&slot, &writes).await?;
        info!(
            "Attempt {} weight changed {} -> {} kg",
            attempt_id, old_weight, weight
        );
        self.bus.emit_lossy(CompetitionEvent::AttemptWeightChanged {
            attempt_id,
            competition_id: attempt.competition_id,
            old_weight,
            new_weight: weight,
            timestamp: ironjudge_common::time::now(),
        });

        Ok(DeclareOutcome {
            attempt,
            warnings: report.warnings,
        })
    }

    /// Put a declared attempt on the platform and start its timer
    ///
    /// Opening an attempt that is already in progress returns its running
    /// timer (re-armed if the competition's timer no longer belongs to it)
    /// and retries a save that failed earlier.
    pub async fn open(&self, attempt_id: AttemptId) -> Result<TimerHandle> {
        let slot = self.slot(attempt_id).await?;
        let duration = self.config.attempt_duration();

        let (attempt, writes, handle) = {
            let mut guard = slot.lock().await;
            let competition_id = guard.attempt.competition_id;
            match guard.attempt.state {
                AttemptState::Declared => {
                    guard.attempt.state = AttemptState::InProgress;
                    guard.attempt.opened_at = Some(ironjudge_common::time::now());
                    let handle =
                        self.timers
                            .start(competition_id, TimerKind::Attempt, duration, Some(attempt_id));
                    (guard.commit(), guard.pending_writes(), handle)
                }
                AttemptState::InProgress => {
                    let existing = self
                        .timers
                        .handle(competition_id)
                        .filter(|h| h.attempt_id == Some(attempt_id));
                    let handle = match existing {
                        Some(handle) => handle,
                        None => {
                            warn!("Attempt {} in progress without its timer, re-arming", attempt_id);
                            self.timers
                                .start(competition_id, TimerKind::Attempt, duration, Some(attempt_id))
                        }
                    };
                    if !guard.has_pending_writes() {
                        return Ok(handle);
                    }
                    debug!("Attempt {} already open, retrying unsaved writes", attempt_id);
                    (guard.attempt.clone(), guard.pending_writes(), handle)
                }
                from => {
                    return Err(Error::InvalidTransition {
                        attempt_id,
                        from,
                        action: "open",
                    })
                }
            }
        };

        self.write_pending(&slot, &writes).await?;
        info!(
            "Opened attempt {} ({} kg {})",
            attempt_id, attempt.actual_weight, attempt.discipline
        );
        self.bus.emit_lossy(CompetitionEvent::AttemptOpened {
            attempt_id,
            competition_id: attempt.competition_id,
            athlete_id: attempt.athlete_id,
            duration_ms: ironjudge_common::time::duration_to_millis(duration),
            timestamp: ironjudge_common::time::now(),
        });
        Ok(handle)
    }

    /// Withdraw a declared or in-progress attempt
    ///
    /// Voiding an already void attempt is only accepted while its save is
    /// still outstanding.
    pub async fn void(&self, attempt_id: AttemptId, reason: &str) -> Result<Attempt> {
        let slot = self.slot(attempt_id).await?;
        let (attempt, writes) = {
            let mut guard = slot.lock().await;
            match guard.attempt.state {
                AttemptState::Declared | AttemptState::InProgress => {
                    guard.attempt.state = AttemptState::Void;
                    guard.attempt.resolved_at = Some(ironjudge_common::time::now());
                    self.timers
                        .cancel_for_attempt(guard.attempt.competition_id, attempt_id);
                    (guard.commit(), guard.pending_writes())
                }
                AttemptState::Void if guard.has_pending_writes() => {
                    debug!("Attempt {} already void, retrying unsaved writes", attempt_id);
                    (guard.attempt.clone(), guard.pending_writes())
                }
                from => {
                    return Err(Error::InvalidTransition {
                        attempt_id,
                        from,
                        action: "void",
                    })
                }
            }
        };

        self.write_pending(&slot, &writes).await?;
        info!("Voided attempt {}: {}", attempt_id, reason);
        self.bus.emit_lossy(CompetitionEvent::AttemptVoided {
            attempt_id,
            competition_id: attempt.competition_id,
            reason: reason.to_string(),
            timestamp: ironjudge_common::time::now(),
        });
        Ok(attempt)
    }

    /// Lock a judged attempt's decision and publish its consequences
    ///
    /// Votes are refused from the moment the attempt is finalized in memory.
    /// Score, records and standings are written first and the finalized
    /// attempt last, so the store never holds a finalized attempt without
    /// its results. When a store write fails the error is returned and the
    /// attempt stays finalizable: calling `finalize` again re-runs the
    /// publication (record checks are idempotent per attempt) and the save.
    pub async fn finalize(&self, attempt_id: AttemptId) -> Result<FinalizeOutcome> {
        let slot = self.slot(attempt_id).await?;
        let attempt = {
            let mut guard = slot.lock().await;
            match guard.attempt.state {
                AttemptState::Judged => {
                    guard.attempt.state = AttemptState::Finalized;
                    guard.attempt.finalized_at = Some(ironjudge_common::time::now());
                    guard.commit()
                }
                AttemptState::Finalized if guard.has_pending_writes() => {
                    info!("Retrying publication of finalized attempt {}", attempt_id);
                    guard.attempt.clone()
                }
                from => {
                    return Err(Error::InvalidTransition {
                        attempt_id,
                        from,
                        action: "finalize",
                    })
                }
            }
        };

        // Held until the attempt is stored so the next publication sees it
        let _standings = self.standings_locks.acquire(&attempt.competition_id).await;
        if !slot.lock().await.has_pending_writes() {
            // A concurrent finalize completed while we waited
            return Err(Error::InvalidTransition {
                attempt_id,
                from: AttemptState::Finalized,
                action: "finalize",
            });
        }
        let (outcome, formula) = self.publish_results(attempt).await?;
        let writes = slot.lock().await.pending_writes();
        self.write_pending(&slot, &writes).await?;

        let attempt = &outcome.attempt;
        let decision = attempt.decision.unwrap_or(ironjudge_common::events::Decision::Invalid);
        info!(
            "Finalized attempt {}: {} ({} kg {})",
            attempt_id, decision, attempt.actual_weight, attempt.discipline
        );
        self.bus.emit_lossy(CompetitionEvent::AttemptFinalized {
            attempt_id,
            competition_id: attempt.competition_id,
            athlete_id: attempt.athlete_id,
            discipline: attempt.discipline.clone(),
            weight: attempt.actual_weight,
            decision,
            timestamp: ironjudge_common::time::now(),
        });
        self.announce_results(&outcome, formula);

        Ok(outcome)
    }

    /// Score, records and standings for a finalized attempt
    ///
    /// The caller holds the competition's standings lock. `attempt` may be
    /// newer than the stored row and replaces it in the fold.
    async fn publish_results(&self, attempt: Attempt) -> Result<(FinalizeOutcome, ScoringFormula)> {
        let competition = self.store.load_competition(attempt.competition_id).await?;
        let mut attempts = self.store.list_attempts(attempt.competition_id).await?;
        match attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(stored) => *stored = attempt.clone(),
            None => attempts.push(attempt.clone()),
        }
        let athletes = self.load_athletes(&attempts).await?;
        let standings = leaderboard::build_leaderboard(&competition, &athletes, &attempts);

        let mut score = None;
        let mut records = Vec::new();
        let athlete = athletes.get(&attempt.athlete_id);
        let standing = standings.iter().find(|s| s.athlete_id == attempt.athlete_id);

        if let (true, Some(athlete), Some(standing)) = (attempt.is_good_lift(), athlete, standing) {
            records = self.check_records(&competition, athlete, &attempt, standing).await?;

            let record = standing.to_score_record(
                competition.id,
                athlete,
                ironjudge_common::time::now(),
            );
            self.store.save_score(&record).await?;
            debug!(
                "Score for athlete {}: total {} ({} {:.2})",
                athlete.id,
                record.total,
                competition.ranking_formula(),
                standing.score
            );
            score = Some(record);
        }

        let outcome = FinalizeOutcome {
            attempt,
            score,
            records,
            standings,
        };
        Ok((outcome, competition.ranking_formula()))
    }

    /// Publish score, record and standings events once everything is stored
    fn announce_results(&self, outcome: &FinalizeOutcome, formula: ScoringFormula) {
        let competition_id = outcome.attempt.competition_id;
        if let Some(record) = &outcome.score {
            self.bus.emit_lossy(CompetitionEvent::ScoreUpdated {
                competition_id,
                athlete_id: record.athlete_id,
                total: record.total,
                scores: record
                    .scores
                    .iter()
                    .map(|(formula, value)| FormulaScore {
                        formula: *formula,
                        score: *value,
                    })
                    .collect(),
                timestamp: ironjudge_common::time::now(),
            });
        }

        for check in &outcome.records {
            let (Some(entry), true) = (&check.entry, check.is_new_record) else {
                continue;
            };
            self.bus.emit_lossy(CompetitionEvent::RecordBroken {
                record_id: entry.id,
                sport: entry.key.sport,
                discipline: entry.key.discipline.clone(),
                category: entry.key.category.clone(),
                weight_class: entry.key.weight_class.clone(),
                record_type: entry.key.record_type,
                athlete_id: entry.holder_athlete_id,
                value: entry.value,
                previous_value: check.previous.as_ref().map(|r| r.value),
                improvement: check.improvement,
                timestamp: ironjudge_common::time::now(),
            });
        }

        self.bus.emit_lossy(CompetitionEvent::LeaderboardUpdated {
            competition_id,
            standings: outcome.standings.iter().map(|s| s.to_info(formula)).collect(),
            timestamp: ironjudge_common::time::now(),
        });
    }

    /// Check every tracked record type for the lift and, once complete, the total
    async fn check_records(
        &self,
        competition: &Competition,
        athlete: &Athlete,
        attempt: &Attempt,
        standing: &Standing,
    ) -> Result<Vec<RecordCheck>> {
        // Timed strongman events are lower-is-better; "strictly greater" does not apply
        let lower_is_better = competition
            .strongman_events
            .iter()
            .any(|e| e.discipline == attempt.discipline && e.direction == PerformanceDirection::LowerIsBetter);

        let mut candidates: Vec<(Discipline, f64)> = Vec::new();
        if !lower_is_better {
            candidates.push((attempt.discipline.clone(), attempt.actual_weight));
        }
        let bests: &BTreeMap<Discipline, f64> = &standing.bests;
        let total = scoring::sport_total(competition.sport, bests);
        let disciplines = competition.sport.disciplines();
        if total > 0.0 && disciplines.len() > 1 && disciplines.contains(&attempt.discipline) {
            candidates.push((Discipline::Total, total));
        }

        let mut broken = Vec::new();
        for record_type in &competition.record_types {
            for (discipline, value) in &candidates {
                let key = RecordKey {
                    sport: competition.sport,
                    discipline: discipline.clone(),
                    category: athlete.category.clone(),
                    weight_class: athlete.weight_class.clone(),
                    record_type: *record_type,
                };
                let check = self
                    .records
                    .check_and_register(&key, *value, athlete.id, Some(attempt.id))
                    .await?;
                if check.is_new_record {
                    broken.push(check);
                }
            }
        }
        Ok(broken)
    }
}
