//! In-memory store adapter
//!
//! All tables live behind one `RwLock`; every trait call takes the lock once,
//! so each write is atomic with respect to other calls.

use super::{RegistrationStore, Store, StoreError, StoreResult};
use crate::model::{
    Athlete, Attempt, Competition, JudgePanel, RecordEntry, RecordKey, ScoreRecord, Vote,
    VoteAuditEntry,
};
use async_trait::async_trait;
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, JudgeId, RecordId, SessionId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    competitions: HashMap<CompetitionId, Competition>,
    panels: HashMap<SessionId, JudgePanel>,
    athletes: HashMap<AthleteId, Athlete>,
    attempts: HashMap<AttemptId, Attempt>,
    votes: HashMap<(AttemptId, JudgeId), Vote>,
    vote_audit: HashMap<AttemptId, Vec<VoteAuditEntry>>,
    records: HashMap<RecordId, RecordEntry>,
    /// Insertion order of record ids, for history queries
    record_order: Vec<RecordId>,
    scores: HashMap<(AthleteId, CompetitionId), ScoreRecord>,
}

/// Process-local `Store`
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_competition(&self, id: CompetitionId) -> StoreResult<Competition> {
        let tables = self.tables.read().await;
        tables
            .competitions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("competition", id))
    }

    async fn load_panel(&self, session_id: SessionId) -> StoreResult<JudgePanel> {
        let tables = self.tables.read().await;
        tables
            .panels
            .get(&session_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("judge panel", session_id))
    }

    async fn load_athlete(&self, id: AthleteId) -> StoreResult<Athlete> {
        let tables = self.tables.read().await;
        tables
            .athletes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("athlete", id))
    }

    async fn save_attempt(&self, attempt: &Attempt) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.attempts.get(&attempt.id) {
            Some(existing) if existing.revision >= attempt.revision => {}
            _ => {
                tables.attempts.insert(attempt.id, attempt.clone());
            }
        }
        Ok(())
    }

    async fn load_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        Ok(self.tables.read().await.attempts.get(&id).cloned())
    }

    async fn list_attempts(&self, competition_id: CompetitionId) -> StoreResult<Vec<Attempt>> {
        let tables = self.tables.read().await;
        let mut attempts: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.competition_id == competition_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| a.declared_at.cmp(&b.declared_at).then(a.id.cmp(&b.id)));
        Ok(attempts)
    }

    async fn save_vote(&self, vote: &Vote) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let key = (vote.attempt_id, vote.judge_id);
        match tables.votes.get(&key) {
            Some(existing) if existing.sequence >= vote.sequence => {}
            _ => {
                tables.votes.insert(key, vote.clone());
            }
        }
        Ok(())
    }

    async fn append_vote_audit(&self, entry: &VoteAuditEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let trail = tables.vote_audit.entry(entry.attempt_id).or_default();
        if !trail.iter().any(|e| e.sequence == entry.sequence) {
            trail.push(entry.clone());
            trail.sort_by_key(|e| e.sequence);
        }
        Ok(())
    }

    async fn load_votes(&self, attempt_id: AttemptId) -> StoreResult<Vec<Vote>> {
        let tables = self.tables.read().await;
        let mut votes: Vec<Vote> = tables
            .votes
            .values()
            .filter(|v| v.attempt_id == attempt_id)
            .cloned()
            .collect();
        votes.sort_by_key(|v| v.position);
        Ok(votes)
    }

    async fn load_vote_audit(&self, attempt_id: AttemptId) -> StoreResult<Vec<VoteAuditEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.vote_audit.get(&attempt_id).cloned().unwrap_or_default())
    }

    async fn load_active_record(&self, key: &RecordKey) -> StoreResult<Option<RecordEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .record_order
            .iter()
            .rev()
            .filter_map(|id| tables.records.get(id))
            .find(|r| r.is_active && r.key == *key)
            .cloned())
    }

    async fn save_record(&self, entry: &RecordEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.records.insert(entry.id, entry.clone()).is_none() {
            tables.record_order.push(entry.id);
        }
        Ok(())
    }

    async fn record_history(&self, key: &RecordKey) -> StoreResult<Vec<RecordEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .record_order
            .iter()
            .filter_map(|id| tables.records.get(id))
            .filter(|r| r.key == *key)
            .cloned()
            .collect())
    }

    async fn save_score(&self, score: &ScoreRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .scores
            .insert((score.athlete_id, score.competition_id), score.clone());
        Ok(())
    }

    async fn load_score(
        &self,
        athlete_id: AthleteId,
        competition_id: CompetitionId,
    ) -> StoreResult<Option<ScoreRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.scores.get(&(athlete_id, competition_id)).cloned())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn register_competition(&self, competition: &Competition) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.competitions.insert(competition.id, competition.clone());
        Ok(())
    }

    async fn register_panel(&self, panel: &JudgePanel) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.panels.insert(panel.session_id, panel.clone());
        Ok(())
    }

    async fn register_athlete(&self, athlete: &Athlete) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.athletes.insert(athlete.id, athlete.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ironjudge_common::events::{AttemptState, Decision, Discipline, RecordType, Sport};
    use uuid::Uuid;

    fn attempt(revision: u64, state: AttemptState) -> Attempt {
        Attempt {
            id: Uuid::nil(),
            athlete_id: Uuid::new_v4(),
            competition_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            discipline: Discipline::Squat,
            attempt_number: 1,
            declared_weight: 200.0,
            actual_weight: 200.0,
            state,
            decision: None,
            resolution: None,
            declared_at: Utc::now(),
            opened_at: None,
            resolved_at: None,
            finalized_at: None,
            revision,
        }
    }

    #[tokio::test]
    async fn test_stale_attempt_save_is_ignored() {
        let store = MemoryStore::new();
        store.save_attempt(&attempt(3, AttemptState::Judged)).await.unwrap();
        store.save_attempt(&attempt(2, AttemptState::InProgress)).await.unwrap();

        let loaded = store.load_attempt(Uuid::nil()).await.unwrap().unwrap();
        assert_eq!(loaded.state, AttemptState::Judged);
        assert_eq!(loaded.revision, 3);
    }

    #[tokio::test]
    async fn test_vote_upsert_keeps_latest_sequence() {
        let store = MemoryStore::new();
        let judge = Uuid::new_v4();
        let vote = |decision, sequence| Vote {
            attempt_id: Uuid::nil(),
            judge_id: judge,
            position: 1,
            decision,
            submitted_at: Utc::now(),
            sequence,
        };

        store.save_vote(&vote(Decision::Invalid, 2)).await.unwrap();
        store.save_vote(&vote(Decision::Valid, 1)).await.unwrap();

        let votes = store.load_votes(Uuid::nil()).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].decision, Decision::Invalid);
    }

    #[tokio::test]
    async fn test_active_record_tracks_latest_active_entry() {
        let store = MemoryStore::new();
        let key = RecordKey {
            sport: Sport::Powerlifting,
            discipline: Discipline::Deadlift,
            category: "open".into(),
            weight_class: "93".into(),
            record_type: RecordType::National,
        };
        let mut old = RecordEntry {
            id: Uuid::new_v4(),
            key: key.clone(),
            holder_athlete_id: Uuid::new_v4(),
            value: 220.0,
            set_at: Utc::now(),
            is_ratified: true,
            is_active: true,
            attempt_id: None,
        };
        store.save_record(&old).await.unwrap();

        old.is_active = false;
        store.save_record(&old).await.unwrap();
        let new = RecordEntry {
            id: Uuid::new_v4(),
            value: 225.0,
            is_active: true,
            is_ratified: false,
            ..old.clone()
        };
        store.save_record(&new).await.unwrap();

        let active = store.load_active_record(&key).await.unwrap().unwrap();
        assert_eq!(active.value, 225.0);
        assert_eq!(store.record_history(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_competition_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load_competition(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "competition", .. }));
    }
}
