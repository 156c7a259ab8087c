//! Engine construction, lifecycle and attempt slots
//!
//! **Responsibilities:**
//! - Own the collaborators (store, event bus, timers, record tracker)
//! - Keep one mutex-guarded slot per attempt; every state and vote mutation
//!   of an attempt happens under its slot lock
//! - Run the expiry handler task that turns timer signals into decisions
//! - Serve consistent snapshots to readers

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::judging::timer::{TimerRegistry, TimerSignal};
use crate::judging::votes::{VoteSet, VoteTally};
use crate::leaderboard::{self, Standing};
use crate::locks::KeyedLocks;
use crate::model::{Athlete, Attempt, JudgePanel, Vote, VoteAuditEntry};
use crate::records::RecordTracker;
use crate::store::Store;
use crate::validation::AttemptValidator;
use ironjudge_common::events::{CompetitionEvent, Discipline, EventBus};
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, JudgeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// In-memory state of one attempt, guarded by the slot mutex
///
/// The slot runs ahead of the store between a mutation and its save. Writes
/// the store has not accepted stay pending here and go out again with the
/// next operation on the attempt, so a caller retrying after a store error
/// completes the write instead of hitting a no-op.
pub(super) struct AttemptSlot {
    pub(super) attempt: Attempt,
    pub(super) panel: JudgePanel,
    pub(super) votes: VoteSet,
    /// Highest attempt revision the store has accepted
    saved_revision: u64,
    /// Latest call per judge not yet accepted by the store
    unsaved_votes: HashMap<JudgeId, Vote>,
    unsaved_audit: Vec<VoteAuditEntry>,
}

/// Snapshot of what a slot owes the store
#[derive(Debug, Default)]
pub(super) struct PendingWrites {
    pub(super) votes: Vec<Vote>,
    pub(super) audit: Vec<VoteAuditEntry>,
    pub(super) attempt: Option<Attempt>,
}

impl AttemptSlot {
    /// Slot for an attempt whose current revision is already stored
    pub(super) fn new(attempt: Attempt, panel: JudgePanel, votes: VoteSet) -> Self {
        Self {
            saved_revision: attempt.revision,
            attempt,
            panel,
            votes,
            unsaved_votes: HashMap::new(),
            unsaved_audit: Vec::new(),
        }
    }

    /// Bump the revision after a mutation and return the snapshot to persist
    pub(super) fn commit(&mut self) -> Attempt {
        self.attempt.revision += 1;
        self.attempt.clone()
    }

    /// Queue an accepted vote (and its audit entry) for the store
    pub(super) fn stage_vote(&mut self, vote: &Vote, audit: Option<&VoteAuditEntry>) {
        self.unsaved_votes.insert(vote.judge_id, vote.clone());
        if let Some(entry) = audit {
            self.unsaved_audit.push(entry.clone());
        }
    }

    pub(super) fn has_pending_writes(&self) -> bool {
        self.attempt.revision > self.saved_revision
            || !self.unsaved_votes.is_empty()
            || !self.unsaved_audit.is_empty()
    }

    pub(super) fn pending_writes(&self) -> PendingWrites {
        let mut votes: Vec<Vote> = self.unsaved_votes.values().cloned().collect();
        votes.sort_by_key(|v| v.sequence);
        PendingWrites {
            votes,
            audit: self.unsaved_audit.clone(),
            attempt: (self.attempt.revision > self.saved_revision).then(|| self.attempt.clone()),
        }
    }

    /// Drop pending entries the store accepted; newer ones stay queued
    fn mark_written(&mut self, writes: &PendingWrites) {
        for vote in &writes.votes {
            if self
                .unsaved_votes
                .get(&vote.judge_id)
                .is_some_and(|pending| pending.sequence == vote.sequence)
            {
                self.unsaved_votes.remove(&vote.judge_id);
            }
        }
        self.unsaved_audit
            .retain(|entry| !writes.audit.iter().any(|w| w.sequence == entry.sequence));
        if let Some(attempt) = &writes.attempt {
            self.saved_revision = self.saved_revision.max(attempt.revision);
        }
    }
}

/// Live attempt adjudication engine
///
/// Cheap handles to shared state; background tasks hold their own clone.
/// Call [`AdjudicationEngine::start`] to process timer expiries and
/// [`AdjudicationEngine::shutdown`] to stop them.
pub struct AdjudicationEngine {
    pub(super) config: Arc<EngineConfig>,
    pub(super) store: Arc<dyn Store>,
    pub(super) bus: EventBus,
    pub(super) validator: Arc<AttemptValidator>,
    pub(super) timers: Arc<TimerRegistry>,
    pub(super) records: Arc<RecordTracker>,

    /// Attempt slots, loaded lazily from the store when absent
    pub(super) slots: Arc<RwLock<HashMap<AttemptId, Arc<Mutex<AttemptSlot>>>>>,

    /// Serializes declarations per (athlete, discipline) for attempt numbering
    pub(super) declare_locks: Arc<KeyedLocks<(AthleteId, Discipline)>>,

    /// Serializes score/record/leaderboard publication per competition
    pub(super) standings_locks: Arc<KeyedLocks<CompetitionId>>,

    /// Taken by the expiry handler on start
    expiry_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<TimerSignal>>>>,
    expiry_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AdjudicationEngine {
    /// Create an engine over `store`, publishing to `bus`
    pub fn new(config: EngineConfig, store: Arc<dyn Store>, bus: EventBus) -> Result<Self> {
        config.validate()?;

        let (timers, expiry_rx) = TimerRegistry::new(bus.clone(), config.tick_interval());
        let validator = AttemptValidator::new(&config);
        let records = RecordTracker::new(Arc::clone(&store));

        info!(
            "Adjudication engine created (attempt timer {}s, tie policy {:?}, expiry policy {:?})",
            config.attempt_timer_secs, config.tie_policy, config.expiry_policy
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            bus,
            validator: Arc::new(validator),
            timers: Arc::new(timers),
            records: Arc::new(records),
            slots: Arc::new(RwLock::new(HashMap::new())),
            declare_locks: Arc::new(KeyedLocks::new()),
            standings_locks: Arc::new(KeyedLocks::new()),
            expiry_rx: Arc::new(Mutex::new(Some(expiry_rx))),
            expiry_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Clone shared handles for a background task
    pub(super) fn clone_handles(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            bus: self.bus.clone(),
            validator: Arc::clone(&self.validator),
            timers: Arc::clone(&self.timers),
            records: Arc::clone(&self.records),
            slots: Arc::clone(&self.slots),
            declare_locks: Arc::clone(&self.declare_locks),
            standings_locks: Arc::clone(&self.standings_locks),
            expiry_rx: Arc::clone(&self.expiry_rx),
            expiry_task: Arc::clone(&self.expiry_task),
        }
    }

    /// Start the expiry handler; a second call is a no-op
    pub async fn start(&self) -> Result<()> {
        let Some(mut rx) = self.expiry_rx.lock().await.take() else {
            warn!("Adjudication engine already started");
            return Ok(());
        };

        let engine = self.clone_handles();
        let task = tokio::spawn(async move {
            debug!("Expiry handler started");
            while let Some(signal) = rx.recv().await {
                if let Err(e) = engine.handle_timer_expiry(signal).await {
                    error!(
                        "Failed to resolve expired attempt {:?}: {}",
                        signal.attempt_id, e
                    );
                    engine.bus.emit_lossy(CompetitionEvent::StoreError {
                        operation: "handle_timer_expiry".to_string(),
                        error: e.to_string(),
                        timestamp: ironjudge_common::time::now(),
                    });
                }
            }
            debug!("Expiry handler stopped");
        });
        *self.expiry_task.lock().await = Some(task);

        info!("Adjudication engine started");
        Ok(())
    }

    /// Stop the expiry handler and every timer watcher
    pub async fn shutdown(&self) {
        if let Some(task) = self.expiry_task.lock().await.take() {
            task.abort();
        }
        self.timers.shutdown();
        info!("Adjudication engine stopped");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ========================================
    // Attempt slots
    // ========================================

    pub(super) async fn insert_slot(&self, slot: AttemptSlot) -> Arc<Mutex<AttemptSlot>> {
        let id = slot.attempt.id;
        let slot = Arc::new(Mutex::new(slot));
        self.slots.write().await.insert(id, Arc::clone(&slot));
        slot
    }

    pub(super) fn new_vote_set(&self, attempt_id: AttemptId, panel: &JudgePanel) -> VoteSet {
        VoteSet::new(
            attempt_id,
            panel.size(),
            self.config.min_votes_for_quorum,
            self.config.tie_policy,
        )
    }

    /// Slot for `attempt_id`, rebuilt from the store if not in memory
    pub(super) async fn slot(&self, attempt_id: AttemptId) -> Result<Arc<Mutex<AttemptSlot>>> {
        if let Some(slot) = self.slots.read().await.get(&attempt_id) {
            return Ok(Arc::clone(slot));
        }

        let attempt = self
            .store
            .load_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attempt {}", attempt_id)))?;
        let panel = self.store.load_panel(attempt.session_id).await?;
        let votes = self.store.load_votes(attempt_id).await?;
        let audit = self.store.load_vote_audit(attempt_id).await?;
        let vote_set = self.new_vote_set(attempt_id, &panel).restore(votes, audit);
        debug!("Restored attempt {} from store ({})", attempt_id, attempt.state);

        let mut slots = self.slots.write().await;
        let slot = slots
            .entry(attempt_id)
            .or_insert_with(|| Arc::new(Mutex::new(AttemptSlot::new(attempt, panel, vote_set))));
        Ok(Arc::clone(slot))
    }

    /// Send a slot's pending writes to the store
    ///
    /// Votes and audit entries go first, the attempt last. Whatever fails
    /// stays pending in the slot; stores ignore replays of accepted rows.
    pub(super) async fn write_pending(
        &self,
        slot: &Arc<Mutex<AttemptSlot>>,
        writes: &PendingWrites,
    ) -> Result<()> {
        for vote in &writes.votes {
            self.store.save_vote(vote).await?;
        }
        for entry in &writes.audit {
            self.store.append_vote_audit(entry).await?;
        }
        if let Some(attempt) = &writes.attempt {
            self.store.save_attempt(attempt).await?;
        }
        slot.lock().await.mark_written(writes);
        Ok(())
    }

    // ========================================
    // Snapshots
    // ========================================

    /// Current attempt state, cloned under the slot lock
    pub async fn attempt(&self, attempt_id: AttemptId) -> Result<Attempt> {
        let slot = self.slot(attempt_id).await?;
        let guard = slot.lock().await;
        Ok(guard.attempt.clone())
    }

    pub async fn tally(&self, attempt_id: AttemptId) -> Result<VoteTally> {
        let slot = self.slot(attempt_id).await?;
        let guard = slot.lock().await;
        Ok(guard.votes.tally())
    }

    /// Current judge calls in seat order
    pub async fn votes(&self, attempt_id: AttemptId) -> Result<Vec<Vote>> {
        let slot = self.slot(attempt_id).await?;
        let guard = slot.lock().await;
        Ok(guard.votes.votes())
    }

    pub async fn vote_audit(&self, attempt_id: AttemptId) -> Result<Vec<VoteAuditEntry>> {
        let slot = self.slot(attempt_id).await?;
        let guard = slot.lock().await;
        Ok(guard.votes.audit().to_vec())
    }

    /// Rebuild the competition's standings from the store
    pub async fn leaderboard(&self, competition_id: CompetitionId) -> Result<Vec<Standing>> {
        let competition = self.store.load_competition(competition_id).await?;
        let attempts = self.store.list_attempts(competition_id).await?;
        let athletes = self.load_athletes(&attempts).await?;
        Ok(leaderboard::build_leaderboard(&competition, &athletes, &attempts))
    }

    pub(super) async fn load_athletes(
        &self,
        attempts: &[Attempt],
    ) -> Result<HashMap<AthleteId, Athlete>> {
        let ids: BTreeSet<AthleteId> = attempts.iter().map(|a| a.athlete_id).collect();
        let mut athletes = HashMap::with_capacity(ids.len());
        for id in ids {
            athletes.insert(id, self.store.load_athlete(id).await?);
        }
        Ok(athletes)
    }
}
