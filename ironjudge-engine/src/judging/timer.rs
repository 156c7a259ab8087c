//! Per-competition countdown timers
//!
//! One authoritative timer per competition; starting a new one cancels the
//! previous one outright. Remaining time is derived from
//! `tokio::time::Instant`, so tests can drive it with a paused clock.
//!
//! **Responsibilities:**
//! - start / pause / resume / reset / cancel and `remaining()`
//! - a watcher task per running timer that publishes `TimerTick` events and
//!   claims the expiry
//! - expiry signalling to the engine over an mpsc channel, exactly once per
//!   timer generation
//!
//! The timer never decides attempt validity. It only reports that an
//! attempt-bound countdown ran out; the engine applies its expiry policy.

use crate::error::{Error, Result};
use ironjudge_common::events::{CompetitionEvent, EventBus, TimerKind};
use ironjudge_common::time::duration_to_millis;
use ironjudge_common::{AttemptId, CompetitionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Expiry notice sent to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSignal {
    pub competition_id: CompetitionId,
    pub kind: TimerKind,
    pub attempt_id: Option<AttemptId>,
    pub generation: u64,
}

/// Identity of one started timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    pub competition_id: CompetitionId,
    pub kind: TimerKind,
    pub attempt_id: Option<AttemptId>,
    pub duration: Duration,
    /// Unique per start/reset; stale handles never match a newer timer
    pub generation: u64,
}

struct TimerState {
    kind: TimerKind,
    duration: Duration,
    started_at: Instant,
    paused_elapsed: Duration,
    paused_at: Option<Instant>,
    attempt_id: Option<AttemptId>,
    fired: bool,
    generation: u64,
    watcher: Option<JoinHandle<()>>,
}

impl TimerState {
    fn remaining(&self, now: Instant) -> Duration {
        let reference = self.paused_at.unwrap_or(now);
        let elapsed = reference
            .saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_elapsed);
        self.duration.saturating_sub(elapsed)
    }

    fn handle(&self, competition_id: CompetitionId) -> TimerHandle {
        TimerHandle {
            competition_id,
            kind: self.kind,
            attempt_id: self.attempt_id,
            duration: self.duration,
            generation: self.generation,
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

struct Shared {
    timers: Mutex<HashMap<CompetitionId, TimerState>>,
    bus: EventBus,
    expiry_tx: mpsc::UnboundedSender<TimerSignal>,
    tick_interval: Duration,
    generations: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<CompetitionId, TimerState>> {
        // Critical sections never panic mid-update
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim and announce the expiry of `competition_id`'s timer if it is due
    ///
    /// With `generation` set, only that generation may fire and the signal
    /// goes to the engine's expiry channel (watcher path). Without it the
    /// caller claims the signal and resolves the attempt itself.
    fn fire_if_due(&self, competition_id: CompetitionId, generation: Option<u64>) -> Option<TimerSignal> {
        let signal = {
            let mut timers = self.lock();
            let state = timers.get_mut(&competition_id)?;
            if generation.is_some_and(|g| g != state.generation) {
                return None;
            }
            if state.fired || state.paused_at.is_some() || !state.remaining(Instant::now()).is_zero() {
                return None;
            }
            state.fired = true;
            TimerSignal {
                competition_id,
                kind: state.kind,
                attempt_id: state.attempt_id,
                generation: state.generation,
            }
        };

        info!(
            "{} timer expired for competition {} (attempt {:?})",
            signal.kind, competition_id, signal.attempt_id
        );
        self.bus.emit_lossy(CompetitionEvent::TimerExpired {
            competition_id,
            kind: signal.kind,
            attempt_id: signal.attempt_id,
            timestamp: ironjudge_common::time::now(),
        });
        if generation.is_some() && signal.kind == TimerKind::Attempt && signal.attempt_id.is_some() {
            // Receiver gone means the engine shut down; nothing left to resolve
            let _ = self.expiry_tx.send(signal);
        }
        Some(signal)
    }
}

/// Watcher loop: tick until zero, then claim the expiry
async fn watch(shared: Arc<Shared>, competition_id: CompetitionId, generation: u64) {
    loop {
        let (remaining, kind) = {
            let timers = shared.lock();
            match timers.get(&competition_id) {
                Some(state) if state.generation == generation && state.paused_at.is_none() => {
                    (state.remaining(Instant::now()), state.kind)
                }
                _ => return,
            }
        };

        if remaining.is_zero() {
            shared.fire_if_due(competition_id, Some(generation));
            return;
        }

        shared.bus.emit_lossy(CompetitionEvent::TimerTick {
            competition_id,
            kind,
            remaining_ms: duration_to_millis(remaining),
            timestamp: ironjudge_common::time::now(),
        });
        tokio::time::sleep(remaining.min(shared.tick_interval)).await;
    }
}

/// All competition timers of one engine
pub struct TimerRegistry {
    shared: Arc<Shared>,
}

impl TimerRegistry {
    /// Create a registry and the receiving end of its expiry channel
    pub fn new(bus: EventBus, tick_interval: Duration) -> (Self, mpsc::UnboundedReceiver<TimerSignal>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            timers: Mutex::new(HashMap::new()),
            bus,
            expiry_tx,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            generations: AtomicU64::new(0),
        });
        (Self { shared }, expiry_rx)
    }

    fn spawn_watcher(&self, competition_id: CompetitionId, generation: u64) -> JoinHandle<()> {
        tokio::spawn(watch(Arc::clone(&self.shared), competition_id, generation))
    }

    /// Start a countdown, replacing any timer the competition already has
    pub fn start(
        &self,
        competition_id: CompetitionId,
        kind: TimerKind,
        duration: Duration,
        attempt_id: Option<AttemptId>,
    ) -> TimerHandle {
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let state = TimerState {
            kind,
            duration,
            started_at: Instant::now(),
            paused_elapsed: Duration::ZERO,
            paused_at: None,
            attempt_id,
            fired: false,
            generation,
            watcher: None,
        };
        let handle = state.handle(competition_id);

        {
            let mut timers = self.shared.lock();
            if let Some(mut previous) = timers.insert(competition_id, state) {
                previous.stop_watcher();
                debug!(
                    "Replaced {} timer (generation {}) for competition {}",
                    previous.kind, previous.generation, competition_id
                );
            }
            let watcher = self.spawn_watcher(competition_id, generation);
            if let Some(state) = timers.get_mut(&competition_id) {
                state.watcher = Some(watcher);
            }
        }

        info!(
            "Started {} timer for competition {}: {:?} (attempt {:?})",
            kind, competition_id, duration, attempt_id
        );
        self.shared.bus.emit_lossy(CompetitionEvent::TimerStarted {
            competition_id,
            kind,
            duration_ms: duration_to_millis(duration),
            attempt_id,
            timestamp: ironjudge_common::time::now(),
        });
        handle
    }

    /// Freeze the countdown; pausing a paused or expired timer is a no-op
    pub fn pause(&self, competition_id: CompetitionId) -> Result<Duration> {
        let (kind, remaining, changed) = {
            let mut timers = self.shared.lock();
            let state = timers
                .get_mut(&competition_id)
                .ok_or_else(|| no_timer(competition_id))?;
            let now = Instant::now();
            let remaining = state.remaining(now);
            let changed = state.paused_at.is_none() && !state.fired;
            if changed {
                state.paused_at = Some(now);
                state.stop_watcher();
            }
            (state.kind, remaining, changed)
        };

        if changed {
            debug!("Paused timer for competition {} at {:?}", competition_id, remaining);
            self.shared.bus.emit_lossy(CompetitionEvent::TimerPaused {
                competition_id,
                kind,
                remaining_ms: duration_to_millis(remaining),
                timestamp: ironjudge_common::time::now(),
            });
        }
        Ok(remaining)
    }

    /// Continue a paused countdown
    pub fn resume(&self, competition_id: CompetitionId) -> Result<Duration> {
        let (kind, remaining, changed) = {
            let mut timers = self.shared.lock();
            let state = timers
                .get_mut(&competition_id)
                .ok_or_else(|| no_timer(competition_id))?;
            let now = Instant::now();
            let changed = match state.paused_at.take() {
                Some(paused_at) => {
                    state.paused_elapsed += now.saturating_duration_since(paused_at);
                    let generation = state.generation;
                    state.watcher = Some(self.spawn_watcher(competition_id, generation));
                    true
                }
                None => false,
            };
            (state.kind, state.remaining(now), changed)
        };

        if changed {
            debug!("Resumed timer for competition {} with {:?} left", competition_id, remaining);
            self.shared.bus.emit_lossy(CompetitionEvent::TimerResumed {
                competition_id,
                kind,
                remaining_ms: duration_to_millis(remaining),
                timestamp: ironjudge_common::time::now(),
            });
        }
        Ok(remaining)
    }

    /// Restart the current timer from its full duration (new generation)
    pub fn reset(&self, competition_id: CompetitionId) -> Result<TimerHandle> {
        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = {
            let mut timers = self.shared.lock();
            let state = timers
                .get_mut(&competition_id)
                .ok_or_else(|| no_timer(competition_id))?;
            state.stop_watcher();
            state.started_at = Instant::now();
            state.paused_elapsed = Duration::ZERO;
            state.paused_at = None;
            state.fired = false;
            state.generation = generation;
            state.watcher = Some(self.spawn_watcher(competition_id, generation));
            state.handle(competition_id)
        };

        info!("Reset {} timer for competition {}", handle.kind, competition_id);
        self.shared.bus.emit_lossy(CompetitionEvent::TimerReset {
            competition_id,
            kind: handle.kind,
            duration_ms: duration_to_millis(handle.duration),
            timestamp: ironjudge_common::time::now(),
        });
        Ok(handle)
    }

    /// Remove the competition's timer; returns whether one existed
    pub fn cancel(&self, competition_id: CompetitionId) -> bool {
        let removed = self.shared.lock().remove(&competition_id);
        match removed {
            Some(mut state) => {
                state.stop_watcher();
                debug!("Cancelled {} timer for competition {}", state.kind, competition_id);
                self.shared.bus.emit_lossy(CompetitionEvent::TimerCancelled {
                    competition_id,
                    kind: state.kind,
                    timestamp: ironjudge_common::time::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Cancel only if the competition's timer is still bound to `attempt_id`
    pub fn cancel_for_attempt(&self, competition_id: CompetitionId, attempt_id: AttemptId) -> bool {
        let bound = self
            .shared
            .lock()
            .get(&competition_id)
            .is_some_and(|state| state.attempt_id == Some(attempt_id));
        bound && self.cancel(competition_id)
    }

    /// Time left, clamped at zero; `None` when the competition has no timer
    pub fn remaining(&self, competition_id: CompetitionId) -> Option<Duration> {
        self.shared
            .lock()
            .get(&competition_id)
            .map(|state| state.remaining(Instant::now()))
    }

    pub fn is_paused(&self, competition_id: CompetitionId) -> bool {
        self.shared
            .lock()
            .get(&competition_id)
            .is_some_and(|state| state.paused_at.is_some())
    }

    pub fn handle(&self, competition_id: CompetitionId) -> Option<TimerHandle> {
        self.shared
            .lock()
            .get(&competition_id)
            .map(|state| state.handle(competition_id))
    }

    /// Claim the expiry if due and not yet fired
    ///
    /// Watchers fire on their own; explicit polls are for callers that drive
    /// time themselves. A claimed signal is returned to the caller only,
    /// never sent on the expiry channel. Repeated polls after expiry return
    /// `None`.
    pub fn poll_expired(&self, competition_id: CompetitionId) -> Option<TimerSignal> {
        self.shared.fire_if_due(competition_id, None)
    }

    /// Run the countdown out immediately (time called from the table)
    ///
    /// The caller claims the signal as with [`TimerRegistry::poll_expired`].
    /// `None` when there is no timer or it already fired.
    pub fn expire_now(&self, competition_id: CompetitionId) -> Option<TimerSignal> {
        {
            let mut timers = self.shared.lock();
            let state = timers.get_mut(&competition_id)?;
            if state.fired {
                return None;
            }
            state.stop_watcher();
            state.paused_at = None;
            state.duration = Duration::ZERO;
        }
        self.shared.fire_if_due(competition_id, None)
    }

    /// A later start or reset for the same attempt replaced `signal`'s timer
    pub fn is_superseded(&self, signal: &TimerSignal) -> bool {
        self.shared
            .lock()
            .get(&signal.competition_id)
            .is_some_and(|state| {
                state.attempt_id == signal.attempt_id && state.generation != signal.generation
            })
    }

    /// Abort every watcher and drop all timers
    pub fn shutdown(&self) {
        let mut timers = self.shared.lock();
        for state in timers.values_mut() {
            state.stop_watcher();
        }
        timers.clear();
    }
}

fn no_timer(competition_id: CompetitionId) -> Error {
    Error::NotFound(format!("timer for competition {}", competition_id))
}
