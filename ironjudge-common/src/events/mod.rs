//! Event types for the IronJudge event system
//!
//! Provides shared event definitions and the EventBus used by the engine to
//! publish vote tallies, timer ticks, finalized attempts and broken records.

// Sub-modules (supporting types)
mod attempt_types;
mod competition_types;
mod shared_types;
mod timer_types;

pub use attempt_types::{AttemptState, Decision, Resolution};
pub use competition_types::{Discipline, Equipment, RecordType, ScoringFormula, Sex, Sport};
pub use shared_types::{DisciplineBest, FormulaScore, StandingInfo};
pub use timer_types::TimerKind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// IronJudge event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so a
/// presentation layer can forward them to scoreboards and judge consoles
/// unchanged. Delivery is fire-and-forget; engine correctness never depends
/// on a subscriber receiving an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompetitionEvent {
    /// Attempt accepted into the queue
    AttemptDeclared {
        attempt_id: Uuid,
        competition_id: Uuid,
        athlete_id: Uuid,
        discipline: Discipline,
        attempt_number: u32,
        weight: f64,
        /// Non-fatal validator findings (small increment, above safety ceiling)
        warnings: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Declared weight changed before the attempt was opened
    AttemptWeightChanged {
        attempt_id: Uuid,
        competition_id: Uuid,
        old_weight: f64,
        new_weight: f64,
        timestamp: DateTime<Utc>,
    },

    /// Attempt moved to the platform; judges may vote
    AttemptOpened {
        attempt_id: Uuid,
        competition_id: Uuid,
        athlete_id: Uuid,
        /// Attempt window in milliseconds
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Attempt withdrawn or skipped
    AttemptVoided {
        attempt_id: Uuid,
        competition_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Vote tally snapshot after an accepted vote
    ///
    /// Carries counts only; individual judge calls stay hidden until the
    /// attempt is judged.
    VoteTallyUpdated {
        attempt_id: Uuid,
        competition_id: Uuid,
        valid_count: usize,
        invalid_count: usize,
        panel_size: usize,
        quorum_reached: bool,
        /// True when this vote replaced the judge's earlier call
        correction: bool,
        timestamp: DateTime<Utc>,
    },

    /// Decision reached (quorum or timer expiry)
    AttemptJudged {
        attempt_id: Uuid,
        competition_id: Uuid,
        decision: Decision,
        resolution: Resolution,
        valid_count: usize,
        invalid_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Decision locked; attempt is immutable from here on
    AttemptFinalized {
        attempt_id: Uuid,
        competition_id: Uuid,
        athlete_id: Uuid,
        discipline: Discipline,
        weight: f64,
        decision: Decision,
        timestamp: DateTime<Utc>,
    },

    /// Athlete totals and formula scores recomputed
    ScoreUpdated {
        competition_id: Uuid,
        athlete_id: Uuid,
        total: f64,
        scores: Vec<FormulaScore>,
        timestamp: DateTime<Utc>,
    },

    /// A finalized valid attempt beat the active record for its key
    RecordBroken {
        record_id: Uuid,
        sport: Sport,
        discipline: Discipline,
        category: String,
        weight_class: String,
        record_type: RecordType,
        athlete_id: Uuid,
        value: f64,
        previous_value: Option<f64>,
        improvement: f64,
        timestamp: DateTime<Utc>,
    },

    /// Leaderboard recomputed for a competition
    LeaderboardUpdated {
        competition_id: Uuid,
        standings: Vec<StandingInfo>,
        timestamp: DateTime<Utc>,
    },

    /// Countdown started (replaces any previous timer of the competition)
    TimerStarted {
        competition_id: Uuid,
        kind: TimerKind,
        duration_ms: u64,
        attempt_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// Periodic countdown update
    TimerTick {
        competition_id: Uuid,
        kind: TimerKind,
        remaining_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TimerPaused {
        competition_id: Uuid,
        kind: TimerKind,
        remaining_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TimerResumed {
        competition_id: Uuid,
        kind: TimerKind,
        remaining_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TimerReset {
        competition_id: Uuid,
        kind: TimerKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TimerCancelled {
        competition_id: Uuid,
        kind: TimerKind,
        timestamp: DateTime<Utc>,
    },

    /// Countdown reached zero (emitted once per timer)
    TimerExpired {
        competition_id: Uuid,
        kind: TimerKind,
        attempt_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// A collaborator call failed inside a background task
    StoreError {
        operation: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl CompetitionEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CompetitionEvent::AttemptDeclared { .. } => "AttemptDeclared",
            CompetitionEvent::AttemptWeightChanged { .. } => "AttemptWeightChanged",
            CompetitionEvent::AttemptOpened { .. } => "AttemptOpened",
            CompetitionEvent::AttemptVoided { .. } => "AttemptVoided",
            CompetitionEvent::VoteTallyUpdated { .. } => "VoteTallyUpdated",
            CompetitionEvent::AttemptJudged { .. } => "AttemptJudged",
            CompetitionEvent::AttemptFinalized { .. } => "AttemptFinalized",
            CompetitionEvent::ScoreUpdated { .. } => "ScoreUpdated",
            CompetitionEvent::RecordBroken { .. } => "RecordBroken",
            CompetitionEvent::LeaderboardUpdated { .. } => "LeaderboardUpdated",
            CompetitionEvent::TimerStarted { .. } => "TimerStarted",
            CompetitionEvent::TimerTick { .. } => "TimerTick",
            CompetitionEvent::TimerPaused { .. } => "TimerPaused",
            CompetitionEvent::TimerResumed { .. } => "TimerResumed",
            CompetitionEvent::TimerReset { .. } => "TimerReset",
            CompetitionEvent::TimerCancelled { .. } => "TimerCancelled",
            CompetitionEvent::TimerExpired { .. } => "TimerExpired",
            CompetitionEvent::StoreError { .. } => "StoreError",
        }
    }

    /// Competition the event belongs to, if it is scoped to one
    pub fn competition_id(&self) -> Option<Uuid> {
        match self {
            CompetitionEvent::AttemptDeclared { competition_id, .. }
            | CompetitionEvent::AttemptWeightChanged { competition_id, .. }
            | CompetitionEvent::AttemptOpened { competition_id, .. }
            | CompetitionEvent::AttemptVoided { competition_id, .. }
            | CompetitionEvent::VoteTallyUpdated { competition_id, .. }
            | CompetitionEvent::AttemptJudged { competition_id, .. }
            | CompetitionEvent::AttemptFinalized { competition_id, .. }
            | CompetitionEvent::ScoreUpdated { competition_id, .. }
            | CompetitionEvent::LeaderboardUpdated { competition_id, .. }
            | CompetitionEvent::TimerStarted { competition_id, .. }
            | CompetitionEvent::TimerTick { competition_id, .. }
            | CompetitionEvent::TimerPaused { competition_id, .. }
            | CompetitionEvent::TimerResumed { competition_id, .. }
            | CompetitionEvent::TimerReset { competition_id, .. }
            | CompetitionEvent::TimerCancelled { competition_id, .. }
            | CompetitionEvent::TimerExpired { competition_id, .. } => Some(*competition_id),
            CompetitionEvent::RecordBroken { .. } | CompetitionEvent::StoreError { .. } => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use ironjudge_common::events::{EventBus, CompetitionEvent, TimerKind};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(CompetitionEvent::TimerTick {
///     competition_id: Uuid::new_v4(),
///     kind: TimerKind::Attempt,
///     remaining_ms: 42_000,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "TimerTick");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CompetitionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped (the subscriber then sees `RecvError::Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CompetitionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CompetitionEvent,
    ) -> Result<usize, broadcast::error::SendError<CompetitionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CompetitionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(competition_id: Uuid, remaining_ms: u64) -> CompetitionEvent {
        CompetitionEvent::TimerTick {
            competition_id,
            kind: TimerKind::Attempt,
            remaining_ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(tick(Uuid::new_v4(), 1000)).is_err());
        // Lossy variant never fails
        bus.emit_lossy(tick(Uuid::new_v4(), 1000));
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let competition_id = Uuid::new_v4();
        bus.emit(tick(competition_id, 5000)).expect("emit should succeed");

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.try_recv().expect("should receive");
            assert_eq!(event.event_type(), "TimerTick");
            assert_eq!(event.competition_id(), Some(competition_id));
        }
    }

    #[test]
    fn test_eventbus_emit_lossy_on_full_channel() {
        let bus = EventBus::new(2);
        let _rx = bus.subscribe();
        for i in 0..10 {
            bus.emit_lossy(tick(Uuid::new_v4(), i * 1000));
        }
        assert_eq!(bus.capacity(), 2);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CompetitionEvent::AttemptJudged {
            attempt_id: Uuid::nil(),
            competition_id: Uuid::nil(),
            decision: Decision::Valid,
            resolution: Resolution::Quorum,
            valid_count: 2,
            invalid_count: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AttemptJudged");
        assert_eq!(json["decision"], "valid");
        assert_eq!(json["resolution"], "quorum");

        let back: CompetitionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "AttemptJudged");
    }

    #[test]
    fn test_record_broken_has_no_competition_scope() {
        let event = CompetitionEvent::RecordBroken {
            record_id: Uuid::new_v4(),
            sport: Sport::Powerlifting,
            discipline: Discipline::Deadlift,
            category: "open".to_string(),
            weight_class: "93".to_string(),
            record_type: RecordType::National,
            athlete_id: Uuid::new_v4(),
            value: 225.0,
            previous_value: Some(220.0),
            improvement: 5.0,
            timestamp: Utc::now(),
        };
        assert_eq!(event.competition_id(), None);
        assert_eq!(event.event_type(), "RecordBroken");
    }
}
