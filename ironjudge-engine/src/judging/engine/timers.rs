//! Competition timer controls
//!
//! Each competition has at most one running countdown. Starting a timer
//! replaces the previous one; only attempt timers opened through
//! [`AdjudicationEngine::open`] are bound to an attempt and force a decision
//! on expiry.

use super::core::AdjudicationEngine;
use crate::error::Result;
use crate::judging::timer::TimerHandle;
use crate::model::Attempt;
use ironjudge_common::events::TimerKind;
use ironjudge_common::CompetitionId;
use std::time::Duration;

impl AdjudicationEngine {
    /// Start a countdown of the configured length for `kind`
    pub fn start_timer(&self, competition_id: CompetitionId, kind: TimerKind) -> TimerHandle {
        let duration = match kind {
            TimerKind::Attempt => self.config.attempt_duration(),
            TimerKind::Rest => Duration::from_secs(self.config.rest_timer_secs),
            TimerKind::Preparation => Duration::from_secs(self.config.preparation_timer_secs),
        };
        self.start_timer_with(competition_id, kind, duration)
    }

    /// Start a countdown of an explicit length, not bound to any attempt
    pub fn start_timer_with(
        &self,
        competition_id: CompetitionId,
        kind: TimerKind,
        duration: Duration,
    ) -> TimerHandle {
        self.timers.start(competition_id, kind, duration, None)
    }

    /// Freeze the countdown; returns the time left
    pub fn pause_timer(&self, competition_id: CompetitionId) -> Result<Duration> {
        self.timers.pause(competition_id)
    }

    pub fn resume_timer(&self, competition_id: CompetitionId) -> Result<Duration> {
        self.timers.resume(competition_id)
    }

    /// Restart from the full duration; an attempt binding is kept
    pub fn reset_timer(&self, competition_id: CompetitionId) -> Result<TimerHandle> {
        self.timers.reset(competition_id)
    }

    /// Stop the countdown without an expiry; returns whether one was running
    pub fn cancel_timer(&self, competition_id: CompetitionId) -> bool {
        self.timers.cancel(competition_id)
    }

    pub fn timer_remaining(&self, competition_id: CompetitionId) -> Option<Duration> {
        self.timers.remaining(competition_id)
    }

    pub fn timer_handle(&self, competition_id: CompetitionId) -> Option<TimerHandle> {
        self.timers.handle(competition_id)
    }

    pub fn timer_paused(&self, competition_id: CompetitionId) -> bool {
        self.timers.is_paused(competition_id)
    }

    /// Call time on the competition's countdown and resolve its attempt
    ///
    /// Returns the attempt the expiry policy was applied to, if any.
    pub async fn expire_timer(&self, competition_id: CompetitionId) -> Result<Option<Attempt>> {
        match self.timers.expire_now(competition_id) {
            Some(signal) => self.handle_timer_expiry(signal).await,
            None => Ok(None),
        }
    }
}
