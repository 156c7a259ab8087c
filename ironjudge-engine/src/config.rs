//! ironjudge-engine specific configuration
//!
//! Every field has a compiled default so an absent or partial TOML file
//! still yields a working engine.

use crate::error::{Error, Result};
use ironjudge_common::config::load_toml_or_default;
use ironjudge_common::events::{Discipline, Sport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How an even-panel tie is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Conservative default: a tie is a failed lift
    #[default]
    Invalid,
    Valid,
}

/// What happens to an in-progress attempt when its timer runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Decide from whatever votes exist and move to judged
    #[default]
    ForceDecision,
    /// Void the attempt instead
    Void,
}

/// Minimum plate increment per sport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementConfig {
    pub powerlifting: f64,
    pub bench_press: f64,
    pub weightlifting: f64,
    pub streetlifting: f64,
    pub strongman: f64,
}

impl Default for IncrementConfig {
    fn default() -> Self {
        Self {
            powerlifting: 0.5,
            bench_press: 0.5,
            weightlifting: 1.0,
            streetlifting: 0.25,
            strongman: 0.5,
        }
    }
}

impl IncrementConfig {
    pub fn for_sport(&self, sport: Sport) -> f64 {
        match sport {
            Sport::Powerlifting => self.powerlifting,
            Sport::BenchPress => self.bench_press,
            Sport::Weightlifting => self.weightlifting,
            Sport::Streetlifting => self.streetlifting,
            Sport::Strongman => self.strongman,
        }
    }
}

/// Declared weights above these values draw a warning (never a rejection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyCeilings {
    pub squat: f64,
    pub bench_press: f64,
    pub deadlift: f64,
    pub snatch: f64,
    pub clean_and_jerk: f64,
    pub muscle_up: f64,
    pub pull_up: f64,
    pub dip: f64,
}

impl Default for SafetyCeilings {
    fn default() -> Self {
        Self {
            squat: 500.0,
            bench_press: 360.0,
            deadlift: 505.0,
            snatch: 225.0,
            clean_and_jerk: 270.0,
            muscle_up: 60.0,
            pull_up: 120.0,
            dip: 160.0,
        }
    }
}

impl SafetyCeilings {
    /// Ceiling for a discipline; strongman events and totals have none
    pub fn for_discipline(&self, discipline: &Discipline) -> Option<f64> {
        match discipline {
            Discipline::Squat => Some(self.squat),
            Discipline::BenchPress => Some(self.bench_press),
            Discipline::Deadlift => Some(self.deadlift),
            Discipline::Snatch => Some(self.snatch),
            Discipline::CleanAndJerk => Some(self.clean_and_jerk),
            Discipline::MuscleUp => Some(self.muscle_up),
            Discipline::PullUp => Some(self.pull_up),
            Discipline::Dip => Some(self.dip),
            Discipline::Total | Discipline::Event(_) => None,
        }
    }
}

/// Adjudication engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts allowed per athlete per discipline
    pub attempts_per_discipline: u32,
    /// Attempt window (seconds)
    pub attempt_timer_secs: u64,
    pub rest_timer_secs: u64,
    pub preparation_timer_secs: u64,
    /// TimerTick emission interval (milliseconds)
    pub tick_interval_ms: u64,
    /// Increments below this draw a warning
    pub soft_min_increment: f64,
    pub min_increments: IncrementConfig,
    pub safety_ceilings: SafetyCeilings,
    /// Hard floor of votes for a quorum resolution
    pub min_votes_for_quorum: usize,
    /// Accept even-sized judge panels (ties then follow `tie_policy`)
    pub allow_even_panel: bool,
    pub tie_policy: TiePolicy,
    pub expiry_policy: ExpiryPolicy,
    pub event_bus_capacity: usize,
    /// SQLite database file; in-memory store when absent
    pub database_path: Option<PathBuf>,
    /// tracing EnvFilter directive, overridden by RUST_LOG
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attempts_per_discipline: 3,
            attempt_timer_secs: 60,
            rest_timer_secs: 60,
            preparation_timer_secs: 60,
            tick_interval_ms: 1000,
            soft_min_increment: 2.5,
            min_increments: IncrementConfig::default(),
            safety_ceilings: SafetyCeilings::default(),
            min_votes_for_quorum: 3,
            allow_even_panel: false,
            tie_policy: TiePolicy::default(),
            expiry_policy: ExpiryPolicy::default(),
            event_bus_capacity: 1000,
            database_path: None,
            log_level: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file (missing file → defaults) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: EngineConfig = load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make adjudication meaningless
    pub fn validate(&self) -> Result<()> {
        if self.attempts_per_discipline == 0 {
            return Err(Error::Config("attempts_per_discipline must be at least 1".into()));
        }
        if self.attempt_timer_secs == 0 {
            return Err(Error::Config("attempt_timer_secs must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".into()));
        }
        if self.min_votes_for_quorum == 0 {
            return Err(Error::Config("min_votes_for_quorum must be positive".into()));
        }
        if !(self.soft_min_increment >= 0.0) {
            return Err(Error::Config("soft_min_increment must be non-negative".into()));
        }
        let increments = &self.min_increments;
        for (name, value) in [
            ("powerlifting", increments.powerlifting),
            ("bench_press", increments.bench_press),
            ("weightlifting", increments.weightlifting),
            ("streetlifting", increments.streetlifting),
            ("strongman", increments.strongman),
        ] {
            if !(value > 0.0) {
                return Err(Error::Config(format!(
                    "min_increments.{} must be positive (got {})",
                    name, value
                )));
            }
        }
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn attempt_duration(&self) -> Duration {
        Duration::from_secs(self.attempt_timer_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
