//! Store wrapper that fails chosen writes on demand
//!
//! Wraps a `MemoryStore`; an armed operation lets `skip` calls through,
//! fails the next `times` calls with `StoreError::Corrupt`, then passes
//! through again.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, SessionId};
use ironjudge_engine::model::{
    Athlete, Attempt, Competition, JudgePanel, RecordEntry, RecordKey, ScoreRecord, Vote,
    VoteAuditEntry,
};
use ironjudge_engine::store::StoreResult;
use ironjudge_engine::{MemoryStore, RegistrationStore, Store, StoreError};

/// Write operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    SaveAttempt,
    SaveVote,
    AppendVoteAudit,
    SaveRecord,
    SaveScore,
}

#[derive(Default)]
pub struct FailingStore {
    inner: MemoryStore,
    /// (calls to let through first, calls to fail)
    armed: Mutex<HashMap<Op, (usize, usize)>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `op`
    pub fn fail(&self, op: Op, times: usize) {
        self.fail_after(op, 0, times);
    }

    /// Let `skip` calls of `op` succeed, then fail the next `times`
    pub fn fail_after(&self, op: Op, skip: usize, times: usize) {
        self.armed.lock().unwrap().insert(op, (skip, times));
    }

    fn check(&self, op: Op) -> StoreResult<()> {
        let mut armed = self.armed.lock().unwrap();
        match armed.get_mut(&op) {
            Some((skip, _)) if *skip > 0 => {
                *skip -= 1;
                Ok(())
            }
            Some((_, times)) if *times > 0 => {
                *times -= 1;
                Err(StoreError::Corrupt(format!("injected {:?} failure", op)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn load_competition(&self, id: CompetitionId) -> StoreResult<Competition> {
        self.inner.load_competition(id).await
    }

    async fn load_panel(&self, session_id: SessionId) -> StoreResult<JudgePanel> {
        self.inner.load_panel(session_id).await
    }

    async fn load_athlete(&self, id: AthleteId) -> StoreResult<Athlete> {
        self.inner.load_athlete(id).await
    }

    async fn save_attempt(&self, attempt: &Attempt) -> StoreResult<()> {
        self.check(Op::SaveAttempt)?;
        self.inner.save_attempt(attempt).await
    }

    async fn load_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        self.inner.load_attempt(id).await
    }

    async fn list_attempts(&self, competition_id: CompetitionId) -> StoreResult<Vec<Attempt>> {
        self.inner.list_attempts(competition_id).await
    }

    async fn save_vote(&self, vote: &Vote) -> StoreResult<()> {
        self.check(Op::SaveVote)?;
        self.inner.save_vote(vote).await
    }

    async fn append_vote_audit(&self, entry: &VoteAuditEntry) -> StoreResult<()> {
        self.check(Op::AppendVoteAudit)?;
        self.inner.append_vote_audit(entry).await
    }

    async fn load_votes(&self, attempt_id: AttemptId) -> StoreResult<Vec<Vote>> {
        self.inner.load_votes(attempt_id).await
    }

    async fn load_vote_audit(&self, attempt_id: AttemptId) -> StoreResult<Vec<VoteAuditEntry>> {
        self.inner.load_vote_audit(attempt_id).await
    }

    async fn load_active_record(&self, key: &RecordKey) -> StoreResult<Option<RecordEntry>> {
        self.inner.load_active_record(key).await
    }

    async fn save_record(&self, entry: &RecordEntry) -> StoreResult<()> {
        self.check(Op::SaveRecord)?;
        self.inner.save_record(entry).await
    }

    async fn record_history(&self, key: &RecordKey) -> StoreResult<Vec<RecordEntry>> {
        self.inner.record_history(key).await
    }

    async fn save_score(&self, score: &ScoreRecord) -> StoreResult<()> {
        self.check(Op::SaveScore)?;
        self.inner.save_score(score).await
    }

    async fn load_score(
        &self,
        athlete_id: AthleteId,
        competition_id: CompetitionId,
    ) -> StoreResult<Option<ScoreRecord>> {
        self.inner.load_score(athlete_id, competition_id).await
    }
}

#[async_trait]
impl RegistrationStore for FailingStore {
    async fn register_competition(&self, competition: &Competition) -> StoreResult<()> {
        self.inner.register_competition(competition).await
    }

    async fn register_panel(&self, panel: &JudgePanel) -> StoreResult<()> {
        self.inner.register_panel(panel).await
    }

    async fn register_athlete(&self, athlete: &Athlete) -> StoreResult<()> {
        self.inner.register_athlete(athlete).await
    }

    async fn import_record(&self, entry: &RecordEntry) -> StoreResult<()> {
        self.inner.import_record(entry).await
    }
}
