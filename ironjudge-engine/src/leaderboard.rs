//! Leaderboard builder
//!
//! A pure fold over a competition's attempts. Only finalized valid attempts
//! contribute, so rebuilding from the same attempts in any order yields the
//! same standings.
//!
//! Bodyweight sports take each athlete's best lift per discipline, sum the
//! sport's disciplines into a total (0 until every discipline has a good
//! lift) and score it with the competition's formula. Strongman sums event
//! points instead.
//!
//! Ranking: score desc, total desc, bodyweight asc, athlete id. Athletes with
//! equal score and total share a rank.

use crate::model::{Athlete, Attempt, Competition, ScoreRecord};
use crate::scoring::strongman::{
    overall_points, EventScoringMethod, PerformanceDirection, StrongmanEventScoring,
};
use crate::scoring::{self, ScoreInput};
use chrono::{DateTime, Utc};
use ironjudge_common::events::{
    Discipline, DisciplineBest, ScoringFormula, StandingInfo, Sport,
};
use ironjudge_common::{AthleteId, CompetitionId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One ranked athlete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub rank: usize,
    pub athlete_id: AthleteId,
    /// Best good lift (or best strongman performance) per discipline
    pub bests: BTreeMap<Discipline, f64>,
    /// Lift total, or summed event points for strongman
    pub total: f64,
    /// Score under the ranking formula
    pub score: f64,
    /// Every reported formula, ranking formula included
    pub scores: BTreeMap<ScoringFormula, f64>,
    pub bodyweight: f64,
}

impl Standing {
    pub fn to_info(&self, formula: ScoringFormula) -> StandingInfo {
        StandingInfo {
            rank: self.rank,
            athlete_id: self.athlete_id,
            total: self.total,
            score: self.score,
            formula,
            bests: self
                .bests
                .iter()
                .map(|(discipline, weight)| DisciplineBest {
                    discipline: discipline.clone(),
                    weight: *weight,
                })
                .collect(),
        }
    }

    pub fn to_score_record(
        &self,
        competition_id: CompetitionId,
        athlete: &Athlete,
        computed_at: DateTime<Utc>,
    ) -> ScoreRecord {
        ScoreRecord {
            athlete_id: self.athlete_id,
            competition_id,
            bests: self.bests.clone(),
            total: self.total,
            scores: self.scores.clone(),
            bodyweight: athlete.bodyweight,
            sex: athlete.sex,
            age: athlete.age,
            computed_at,
        }
    }
}

/// Rank every athlete that has an attempt in the competition
///
/// Athletes absent from `athletes` are left out (no bodyweight to score
/// with). Attempts of other competitions are ignored.
pub fn build_leaderboard(
    competition: &Competition,
    athletes: &HashMap<AthleteId, Athlete>,
    attempts: &[Attempt],
) -> Vec<Standing> {
    let field: BTreeSet<AthleteId> = attempts
        .iter()
        .filter(|a| a.competition_id == competition.id)
        .map(|a| a.athlete_id)
        .filter(|id| athletes.contains_key(id))
        .collect();

    let bests = best_lifts(competition, attempts, &field);

    let mut standings: Vec<Standing> = match competition.sport {
        Sport::Strongman => strongman_standings(competition, athletes, &field, bests),
        sport => lifting_standings(competition, sport, athletes, &field, bests),
    };

    standings.sort_by(compare_standings);
    assign_ranks(&mut standings);
    standings
}

/// Best good lift per (athlete, discipline)
fn best_lifts(
    competition: &Competition,
    attempts: &[Attempt],
    field: &BTreeSet<AthleteId>,
) -> BTreeMap<AthleteId, BTreeMap<Discipline, f64>> {
    let directions: HashMap<&Discipline, PerformanceDirection> = competition
        .strongman_events
        .iter()
        .map(|e| (&e.discipline, e.direction))
        .collect();

    let mut bests: BTreeMap<AthleteId, BTreeMap<Discipline, f64>> =
        field.iter().map(|id| (*id, BTreeMap::new())).collect();

    for attempt in attempts {
        if attempt.competition_id != competition.id || !attempt.is_good_lift() {
            continue;
        }
        let Some(athlete_bests) = bests.get_mut(&attempt.athlete_id) else {
            continue;
        };
        let direction = directions
            .get(&attempt.discipline)
            .copied()
            .unwrap_or_default();
        athlete_bests
            .entry(attempt.discipline.clone())
            .and_modify(|best| *best = direction.best_of(*best, attempt.actual_weight))
            .or_insert(attempt.actual_weight);
    }
    bests
}

fn lifting_standings(
    competition: &Competition,
    sport: Sport,
    athletes: &HashMap<AthleteId, Athlete>,
    field: &BTreeSet<AthleteId>,
    mut bests: BTreeMap<AthleteId, BTreeMap<Discipline, f64>>,
) -> Vec<Standing> {
    let formula = competition.ranking_formula();
    let event = scoring::lift_event_for(sport);

    field
        .iter()
        .filter_map(|id| athletes.get(id).map(|athlete| (id, athlete)))
        .map(|(id, athlete)| {
            let athlete_bests = bests.remove(id).unwrap_or_default();
            let total = scoring::sport_total(sport, &athlete_bests);
            let input = ScoreInput {
                total,
                bodyweight: athlete.bodyweight,
                sex: athlete.sex,
                age: athlete.age,
                equipment: athlete.equipment,
                event,
            };
            let scores = scoring::formula_scores(sport, formula, &input);
            Standing {
                rank: 0,
                athlete_id: *id,
                score: scores.get(&formula).copied().unwrap_or(0.0),
                bests: athlete_bests,
                total,
                scores,
                bodyweight: athlete.bodyweight,
            }
        })
        .collect()
}

fn strongman_standings(
    competition: &Competition,
    athletes: &HashMap<AthleteId, Athlete>,
    field: &BTreeSet<AthleteId>,
    mut bests: BTreeMap<AthleteId, BTreeMap<Discipline, f64>>,
) -> Vec<Standing> {
    // Configured events plus any event that saw attempts without a table entry
    let mut events: BTreeMap<Discipline, StrongmanEventScoring> = competition
        .strongman_events
        .iter()
        .map(|e| (e.discipline.clone(), e.clone()))
        .collect();
    for discipline in bests.values().flat_map(|b| b.keys()) {
        events
            .entry(discipline.clone())
            .or_insert_with(|| StrongmanEventScoring {
                discipline: discipline.clone(),
                method: EventScoringMethod::default(),
                direction: PerformanceDirection::default(),
            });
    }

    let results: Vec<(StrongmanEventScoring, Vec<(AthleteId, f64)>)> = events
        .into_values()
        .map(|scoring| {
            let performances = field
                .iter()
                .map(|id| {
                    let perf = bests
                        .get(id)
                        .and_then(|b| b.get(&scoring.discipline))
                        .copied()
                        .unwrap_or(0.0);
                    (*id, perf)
                })
                .collect();
            (scoring, performances)
        })
        .collect();
    let points = overall_points(&results);

    field
        .iter()
        .filter_map(|id| athletes.get(id).map(|athlete| (id, athlete)))
        .map(|(id, athlete)| {
            let total = points.get(id).copied().unwrap_or(0.0);
            let mut scores = BTreeMap::new();
            scores.insert(ScoringFormula::StrongmanPoints, total);
            Standing {
                rank: 0,
                athlete_id: *id,
                bests: bests.remove(id).unwrap_or_default(),
                total,
                score: total,
                scores,
                bodyweight: athlete.bodyweight,
            }
        })
        .collect()
}

fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.total.total_cmp(&a.total))
        .then_with(|| a.bodyweight.total_cmp(&b.bodyweight))
        .then_with(|| a.athlete_id.cmp(&b.athlete_id))
}

fn assign_ranks(standings: &mut [Standing]) {
    let mut previous: Option<(f64, f64, usize)> = None;
    for (index, standing) in standings.iter_mut().enumerate() {
        let rank = match previous {
            Some((score, total, rank)) if score == standing.score && total == standing.total => rank,
            _ => index + 1,
        };
        standing.rank = rank;
        previous = Some((standing.score, standing.total, rank));
    }
}
