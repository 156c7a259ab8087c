//! Persistence collaborator
//!
//! The engine never talks to a database directly. It reads registration data
//! and writes attempt, vote, record and score rows through the `Store`
//! trait. Two adapters ship with the crate:
//!
//! - `MemoryStore`: process-local maps, used by tests and the simulator
//! - `SqliteStore`: sqlx SQLite pool with the schema created on open
//!
//! Writes are idempotent upserts. Attempt saves carry a `revision` and vote
//! saves a `sequence`; adapters drop a write that is not newer than the row
//! already stored, so saves issued after the attempt lock is released can
//! arrive in any order without regressing state.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::model::{
    Athlete, Attempt, Competition, JudgePanel, RecordEntry, RecordKey, ScoreRecord, Vote,
    VoteAuditEntry,
};
use async_trait::async_trait;
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, SessionId};
use thiserror::Error;

/// Store adapter errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Row exists but a column could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Everything the adjudication engine reads and writes
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_competition(&self, id: CompetitionId) -> StoreResult<Competition>;

    async fn load_panel(&self, session_id: SessionId) -> StoreResult<JudgePanel>;

    async fn load_athlete(&self, id: AthleteId) -> StoreResult<Athlete>;

    /// Upsert; ignored when the stored revision is equal or newer
    async fn save_attempt(&self, attempt: &Attempt) -> StoreResult<()>;

    async fn load_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>>;

    /// All attempts of a competition, any state
    async fn list_attempts(&self, competition_id: CompetitionId) -> StoreResult<Vec<Attempt>>;

    /// Upsert on (attempt, judge); ignored when the stored sequence is equal or newer
    async fn save_vote(&self, vote: &Vote) -> StoreResult<()>;

    /// Append to the audit trail; replaying an existing sequence is a no-op
    async fn append_vote_audit(&self, entry: &VoteAuditEntry) -> StoreResult<()>;

    async fn load_votes(&self, attempt_id: AttemptId) -> StoreResult<Vec<Vote>>;

    /// Audit trail in sequence order
    async fn load_vote_audit(&self, attempt_id: AttemptId) -> StoreResult<Vec<VoteAuditEntry>>;

    async fn load_active_record(&self, key: &RecordKey) -> StoreResult<Option<RecordEntry>>;

    /// Upsert by record id (deactivating an entry rewrites it)
    async fn save_record(&self, entry: &RecordEntry) -> StoreResult<()>;

    /// Every entry for a key, superseded ones included, oldest first
    async fn record_history(&self, key: &RecordKey) -> StoreResult<Vec<RecordEntry>>;

    /// Upsert on (athlete, competition)
    async fn save_score(&self, score: &ScoreRecord) -> StoreResult<()>;

    async fn load_score(
        &self,
        athlete_id: AthleteId,
        competition_id: CompetitionId,
    ) -> StoreResult<Option<ScoreRecord>>;
}

/// Registration-side writes the engine itself never performs
///
/// Used by the simulator and by tests to seed competitions, panels,
/// athletes and imported record history.
#[async_trait]
pub trait RegistrationStore: Store {
    async fn register_competition(&self, competition: &Competition) -> StoreResult<()>;

    async fn register_panel(&self, panel: &JudgePanel) -> StoreResult<()>;

    async fn register_athlete(&self, athlete: &Athlete) -> StoreResult<()>;

    async fn import_record(&self, entry: &RecordEntry) -> StoreResult<()> {
        self.save_record(entry).await
    }
}
