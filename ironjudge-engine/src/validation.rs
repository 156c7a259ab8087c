//! Attempt validator
//!
//! Pure checks on a declared weight before an attempt enters the queue.
//! Errors reject the declaration; warnings travel back to the caller and
//! into the `AttemptDeclared` event but never block it.
//!
//! **Rules, in order:**
//! 1. Weight is positive
//! 2. Weight is a multiple of the sport's minimum increment
//! 3. Weight strictly exceeds the best prior valid weight in the discipline
//! 4. Increment below the soft minimum → warning
//! 5. Weight above the discipline's safety ceiling → warning
//!
//! Strongman performances are not progressive loads, so rules 2 to 4 are
//! skipped for them.

use crate::config::{EngineConfig, IncrementConfig, SafetyCeilings};
use ironjudge_common::events::{Discipline, Sport};
use serde::{Deserialize, Serialize};

const INCREMENT_EPSILON: f64 = 1e-6;

/// Outcome of validating one declared weight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(mut self) -> Self {
        self.ok = self.errors.is_empty();
        self
    }
}

/// Validator configured from `EngineConfig`
#[derive(Debug, Clone)]
pub struct AttemptValidator {
    increments: IncrementConfig,
    ceilings: SafetyCeilings,
    soft_min_increment: f64,
    attempts_per_discipline: u32,
}

impl AttemptValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            increments: config.min_increments.clone(),
            ceilings: config.safety_ceilings.clone(),
            soft_min_increment: config.soft_min_increment,
            attempts_per_discipline: config.attempts_per_discipline,
        }
    }

    /// Check a declared weight against the athlete's prior valid attempts
    ///
    /// `prior_valid_weights` holds the weights of finalized valid attempts in
    /// the same discipline; order does not matter.
    pub fn validate(
        &self,
        weight: f64,
        prior_valid_weights: &[f64],
        sport: Sport,
        discipline: &Discipline,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !weight.is_finite() || weight <= 0.0 {
            report
                .errors
                .push(format!("weight must be positive (got {})", weight));
            return report.finish();
        }

        let progressive = sport.is_progressive() && !discipline.is_strongman_event();
        if progressive {
            let increment = self.increments.for_sport(sport);
            if !is_multiple_of(weight, increment) {
                report.errors.push(format!(
                    "{} kg is not a multiple of the {} increment ({} kg)",
                    weight, sport, increment
                ));
            }

            let best_prior = prior_valid_weights
                .iter()
                .copied()
                .filter(|w| w.is_finite())
                .reduce(f64::max);
            if let Some(best) = best_prior {
                if weight <= best {
                    report.errors.push(format!(
                        "{} kg must exceed best prior valid {} of {} kg",
                        weight, discipline, best
                    ));
                } else if weight - best < self.soft_min_increment - INCREMENT_EPSILON {
                    report.warnings.push(format!(
                        "increment of {} kg over {} kg is below the usual {} kg",
                        round_display(weight - best),
                        best,
                        self.soft_min_increment
                    ));
                }
            }
        }

        if let Some(ceiling) = self.ceilings.for_discipline(discipline) {
            if weight > ceiling {
                report.warnings.push(format!(
                    "{} kg is above the {} safety ceiling of {} kg",
                    weight, discipline, ceiling
                ));
            }
        }

        report.finish()
    }

    /// Resolve the attempt number for a declaration
    ///
    /// `previous` lists attempt numbers already declared for this athlete and
    /// discipline, voided ones included (a passed attempt is spent). The next
    /// number is one past the highest; an explicit request must match it and
    /// stay within the per-discipline limit.
    pub fn next_attempt_number(
        &self,
        requested: Option<u32>,
        previous: &[u32],
    ) -> std::result::Result<u32, String> {
        let expected = previous.iter().copied().max().unwrap_or(0) + 1;
        let number = requested.unwrap_or(expected);

        if number == 0 {
            return Err("attempt numbers start at 1".to_string());
        }
        if number > self.attempts_per_discipline {
            return Err(format!(
                "attempt {} exceeds the limit of {} attempts per discipline",
                number, self.attempts_per_discipline
            ));
        }
        if number != expected {
            return Err(format!(
                "attempt {} is out of sequence, next attempt is {}",
                number, expected
            ));
        }
        Ok(number)
    }
}

fn is_multiple_of(weight: f64, increment: f64) -> bool {
    if increment <= 0.0 {
        return true;
    }
    let ratio = weight / increment;
    (ratio - ratio.round()).abs() < INCREMENT_EPSILON
}

fn round_display(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
