//! Strongman event points
//!
//! Strongman ranks by points instead of a bodyweight formula. Each event is
//! scored independently, either by finishing position or by a ratio against
//! the field's best performance, and the overall standing is the sum of
//! event points. Events with different scoring methods can be mixed in one
//! competition.

use ironjudge_common::events::Discipline;
use ironjudge_common::AthleteId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How an event converts performances to points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScoringMethod {
    /// First of N gets N points, last gets 1; ties share the averaged points
    #[default]
    Placing,
    /// Points = N × performance relative to the best performance
    Ratio,
}

/// Whether a bigger number is a better performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceDirection {
    /// Weight, reps, distance
    #[default]
    HigherIsBetter,
    /// Time
    LowerIsBetter,
}

impl PerformanceDirection {
    /// Better of two recorded performances
    pub fn best_of(&self, a: f64, b: f64) -> f64 {
        match self {
            PerformanceDirection::HigherIsBetter => a.max(b),
            PerformanceDirection::LowerIsBetter => a.min(b),
        }
    }

    fn compare(&self, a: f64, b: f64) -> Ordering {
        // Best first
        match self {
            PerformanceDirection::HigherIsBetter => b.total_cmp(&a),
            PerformanceDirection::LowerIsBetter => a.total_cmp(&b),
        }
    }
}

/// Scoring rule for one strongman event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongmanEventScoring {
    pub discipline: Discipline,
    #[serde(default)]
    pub method: EventScoringMethod,
    #[serde(default)]
    pub direction: PerformanceDirection,
}

/// Points for every athlete in one event
///
/// `results` lists every competitor in the event; a performance ≤ 0 means no
/// result (zero reps, did not finish) and earns 0 points. The field size N
/// counts all competitors.
pub fn event_points(
    scoring: &StrongmanEventScoring,
    results: &[(AthleteId, f64)],
) -> BTreeMap<AthleteId, f64> {
    match scoring.method {
        EventScoringMethod::Placing => placing_points(results, scoring.direction),
        EventScoringMethod::Ratio => ratio_points(results, scoring.direction),
    }
}

pub fn placing_points(
    results: &[(AthleteId, f64)],
    direction: PerformanceDirection,
) -> BTreeMap<AthleteId, f64> {
    let field = results.len() as f64;
    let mut points: BTreeMap<AthleteId, f64> = results.iter().map(|(id, _)| (*id, 0.0)).collect();

    let mut ranked: Vec<(AthleteId, f64)> = results
        .iter()
        .copied()
        .filter(|(_, perf)| *perf > 0.0)
        .collect();
    ranked.sort_by(|a, b| direction.compare(a.1, b.1).then(a.0.cmp(&b.0)));

    let mut place = 0usize;
    while place < ranked.len() {
        // Group of equal performances occupying places place+1 ..= end
        let mut end = place + 1;
        while end < ranked.len() && ranked[end].1 == ranked[place].1 {
            end += 1;
        }
        let sum: f64 = (place..end).map(|p| field - p as f64).sum();
        let shared = sum / (end - place) as f64;
        for (athlete_id, _) in &ranked[place..end] {
            points.insert(*athlete_id, shared);
        }
        place = end;
    }
    points
}

pub fn ratio_points(
    results: &[(AthleteId, f64)],
    direction: PerformanceDirection,
) -> BTreeMap<AthleteId, f64> {
    let field = results.len() as f64;
    let best = results
        .iter()
        .map(|(_, perf)| *perf)
        .filter(|perf| *perf > 0.0)
        .reduce(|a, b| direction.best_of(a, b));

    results
        .iter()
        .map(|(athlete_id, perf)| {
            let pts = match best {
                Some(best) if *perf > 0.0 => match direction {
                    PerformanceDirection::HigherIsBetter => field * perf / best,
                    PerformanceDirection::LowerIsBetter => field * best / perf,
                },
                _ => 0.0,
            };
            (*athlete_id, pts)
        })
        .collect()
}

/// Sum of event points across all events
pub fn overall_points(
    events: &[(StrongmanEventScoring, Vec<(AthleteId, f64)>)],
) -> BTreeMap<AthleteId, f64> {
    let mut totals: BTreeMap<AthleteId, f64> = BTreeMap::new();
    for (scoring, results) in events {
        for (athlete_id, pts) in event_points(scoring, results) {
            *totals.entry(athlete_id).or_insert(0.0) += pts;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids(n: usize) -> Vec<AthleteId> {
        let mut v: Vec<AthleteId> = (0..n).map(|_| Uuid::new_v4()).collect();
        v.sort();
        v
    }

    fn event(method: EventScoringMethod, direction: PerformanceDirection) -> StrongmanEventScoring {
        StrongmanEventScoring {
            discipline: Discipline::Event("test".into()),
            method,
            direction,
        }
    }

    #[test]
    fn test_placing_points_higher_is_better() {
        let a = ids(3);
        let results = vec![(a[0], 180.0), (a[1], 200.0), (a[2], 190.0)];
        let pts = placing_points(&results, PerformanceDirection::HigherIsBetter);
        assert_eq!(pts[&a[1]], 3.0);
        assert_eq!(pts[&a[2]], 2.0);
        assert_eq!(pts[&a[0]], 1.0);
    }

    #[test]
    fn test_placing_points_time_event_with_dnf() {
        let a = ids(3);
        // Lower time is better; 0.0 = did not finish
        let results = vec![(a[0], 42.5), (a[1], 0.0), (a[2], 39.1)];
        let pts = placing_points(&results, PerformanceDirection::LowerIsBetter);
        assert_eq!(pts[&a[2]], 3.0);
        assert_eq!(pts[&a[0]], 2.0);
        assert_eq!(pts[&a[1]], 0.0);
    }

    #[test]
    fn test_placing_ties_share_average() {
        let a = ids(4);
        let results = vec![(a[0], 10.0), (a[1], 12.0), (a[2], 12.0), (a[3], 8.0)];
        let pts = placing_points(&results, PerformanceDirection::HigherIsBetter);
        // Places 1 and 2 share (4 + 3) / 2
        assert_eq!(pts[&a[1]], 3.5);
        assert_eq!(pts[&a[2]], 3.5);
        assert_eq!(pts[&a[0]], 2.0);
        assert_eq!(pts[&a[3]], 1.0);
    }

    #[test]
    fn test_ratio_points() {
        let a = ids(2);
        let higher = ratio_points(&[(a[0], 100.0), (a[1], 50.0)], PerformanceDirection::HigherIsBetter);
        assert_eq!(higher[&a[0]], 2.0);
        assert_eq!(higher[&a[1]], 1.0);

        let lower = ratio_points(&[(a[0], 20.0), (a[1], 40.0)], PerformanceDirection::LowerIsBetter);
        assert_eq!(lower[&a[0]], 2.0);
        assert_eq!(lower[&a[1]], 1.0);
    }

    #[test]
    fn test_overall_points_mixes_methods() {
        let a = ids(2);
        let events = vec![
            (
                event(EventScoringMethod::Placing, PerformanceDirection::HigherIsBetter),
                vec![(a[0], 5.0), (a[1], 7.0)],
            ),
            (
                event(EventScoringMethod::Ratio, PerformanceDirection::LowerIsBetter),
                vec![(a[0], 30.0), (a[1], 60.0)],
            ),
        ];
        let totals = overall_points(&events);
        assert_eq!(totals[&a[0]], 1.0 + 2.0);
        assert_eq!(totals[&a[1]], 2.0 + 1.0);
    }

    #[test]
    fn test_no_results_means_no_points() {
        let a = ids(2);
        let pts = ratio_points(&[(a[0], 0.0), (a[1], 0.0)], PerformanceDirection::HigherIsBetter);
        assert!(pts.values().all(|p| *p == 0.0));
    }
}
