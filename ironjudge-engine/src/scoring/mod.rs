//! Scoring calculator
//!
//! Pure functions mapping a total and an athlete's attributes to a score
//! under a named formula. No I/O and no shared state; safe to call from any
//! task.
//!
//! **Responsibilities:**
//! - Bodyweight formulas (Wilks, DOTS, IPF, GL, Sinclair, SMF) in `formulas`
//! - Strongman per-event points in `strongman`
//! - Sport-level totals and the set of formulas reported for a sport

pub mod formulas;
pub mod strongman;

pub use formulas::LiftEvent;

use ironjudge_common::events::{Discipline, Equipment, ScoringFormula, Sex, Sport};
use std::collections::BTreeMap;

/// Everything a formula may need about one athlete's result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    /// Competition total, or summed event points for strongman
    pub total: f64,
    pub bodyweight: f64,
    pub sex: Sex,
    pub age: Option<u32>,
    pub equipment: Equipment,
    pub event: LiftEvent,
}

/// Score `input` under `formula`
pub fn calculate(formula: ScoringFormula, input: &ScoreInput) -> f64 {
    let ScoreInput {
        total,
        bodyweight,
        sex,
        age,
        equipment,
        event,
    } = *input;

    match formula {
        ScoringFormula::RawTotal | ScoringFormula::StrongmanPoints => {
            if total.is_finite() && total > 0.0 {
                total
            } else {
                0.0
            }
        }
        ScoringFormula::Wilks => formulas::calculate_wilks(total, bodyweight, sex),
        ScoringFormula::Dots => formulas::calculate_dots(total, bodyweight, sex),
        ScoringFormula::Ipf => formulas::calculate_ipf(total, bodyweight, sex, equipment, event),
        ScoringFormula::IpfGl => formulas::calculate_gl(total, bodyweight, sex, equipment, event),
        ScoringFormula::Sinclair => formulas::calculate_sinclair(total, bodyweight, sex),
        ScoringFormula::Smf => formulas::calculate_smf(total, bodyweight, sex, age),
    }
}

/// IPF/GL parameter set for a sport; bench-only meets use the bench tables
pub fn lift_event_for(sport: Sport) -> LiftEvent {
    match sport {
        Sport::BenchPress => LiftEvent::BenchOnly,
        _ => LiftEvent::FullPower,
    }
}

/// Sum of the sport's disciplines
///
/// Returns 0 unless every discipline has a good lift ("bombed out" athletes
/// have no total). Strongman has no lift total; its standing is event points.
pub fn sport_total(sport: Sport, bests: &BTreeMap<Discipline, f64>) -> f64 {
    let disciplines = sport.disciplines();
    if disciplines.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for discipline in &disciplines {
        match bests.get(discipline) {
            Some(weight) if *weight > 0.0 => total += weight,
            _ => return 0.0,
        }
    }
    total
}

/// Scores reported for an athlete: the sport's standard set plus the ranking formula
pub fn formula_scores(
    sport: Sport,
    ranking: ScoringFormula,
    input: &ScoreInput,
) -> BTreeMap<ScoringFormula, f64> {
    let mut scores: BTreeMap<ScoringFormula, f64> = ScoringFormula::reported_for(sport)
        .iter()
        .map(|formula| (*formula, calculate(*formula, input)))
        .collect();
    scores.insert(ranking, calculate(ranking, input));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(total: f64) -> ScoreInput {
        ScoreInput {
            total,
            bodyweight: 100.0,
            sex: Sex::Male,
            age: None,
            equipment: Equipment::Raw,
            event: LiftEvent::FullPower,
        }
    }

    #[test]
    fn test_calculate_dispatches_to_formula() {
        let i = input(700.0);
        assert_eq!(
            calculate(ScoringFormula::Wilks, &i),
            formulas::calculate_wilks(700.0, 100.0, Sex::Male)
        );
        assert_eq!(calculate(ScoringFormula::RawTotal, &i), 700.0);
        assert_eq!(calculate(ScoringFormula::StrongmanPoints, &i), 700.0);
    }

    #[test]
    fn test_every_formula_is_zero_without_total() {
        for formula in [
            ScoringFormula::RawTotal,
            ScoringFormula::Wilks,
            ScoringFormula::Dots,
            ScoringFormula::Ipf,
            ScoringFormula::IpfGl,
            ScoringFormula::Sinclair,
            ScoringFormula::Smf,
            ScoringFormula::StrongmanPoints,
        ] {
            assert_eq!(calculate(formula, &input(0.0)), 0.0, "{}", formula);
            assert_eq!(calculate(formula, &input(-10.0)), 0.0, "{}", formula);
        }
    }

    #[test]
    fn test_sport_total_requires_every_discipline() {
        let mut bests = BTreeMap::new();
        bests.insert(Discipline::Squat, 185.0);
        bests.insert(Discipline::BenchPress, 125.0);
        assert_eq!(sport_total(Sport::Powerlifting, &bests), 0.0);
        assert_eq!(sport_total(Sport::BenchPress, &bests), 125.0);

        bests.insert(Discipline::Deadlift, 210.0);
        assert_eq!(sport_total(Sport::Powerlifting, &bests), 520.0);
        assert_eq!(sport_total(Sport::Strongman, &bests), 0.0);
    }

    #[test]
    fn test_formula_scores_include_ranking_formula() {
        let scores = formula_scores(Sport::Weightlifting, ScoringFormula::RawTotal, &input(300.0));
        assert!(scores.contains_key(&ScoringFormula::Sinclair));
        assert!(scores.contains_key(&ScoringFormula::Smf));
        assert_eq!(scores[&ScoringFormula::RawTotal], 300.0);
    }

    #[test]
    fn test_bench_meets_use_bench_parameters() {
        assert_eq!(lift_event_for(Sport::BenchPress), LiftEvent::BenchOnly);
        assert_eq!(lift_event_for(Sport::Streetlifting), LiftEvent::FullPower);
    }
}
