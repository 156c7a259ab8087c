//! SQLite store adapter (sqlx)
//!
//! Ids are stored as hyphenated text, enums through their `Display`/`FromStr`
//! text form and nested collections as JSON text. The schema is created on
//! open with `CREATE TABLE IF NOT EXISTS`.

use super::{RegistrationStore, Store, StoreError, StoreResult};
use crate::model::{
    Athlete, Attempt, Competition, JudgePanel, RecordEntry, RecordKey, ScoreRecord, Vote,
    VoteAuditEntry,
};
use async_trait::async_trait;
use ironjudge_common::events::{Discipline, ScoringFormula};
use ironjudge_common::{AthleteId, AttemptId, CompetitionId, SessionId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS competitions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        sport TEXT NOT NULL,
        formula TEXT,
        record_types TEXT NOT NULL DEFAULT '[]',
        strongman_events TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS judge_panels (
        session_id TEXT PRIMARY KEY,
        judges TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS athletes (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        sex TEXT NOT NULL,
        bodyweight REAL NOT NULL,
        age INTEGER,
        category TEXT NOT NULL,
        weight_class TEXT NOT NULL,
        equipment TEXT NOT NULL DEFAULT 'raw'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS attempts (
        id TEXT PRIMARY KEY,
        athlete_id TEXT NOT NULL,
        competition_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        discipline TEXT NOT NULL,
        attempt_number INTEGER NOT NULL,
        declared_weight REAL NOT NULL,
        actual_weight REAL NOT NULL,
        state TEXT NOT NULL,
        decision TEXT,
        resolution TEXT,
        declared_at TEXT NOT NULL,
        opened_at TEXT,
        resolved_at TEXT,
        finalized_at TEXT,
        revision INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_attempts_competition ON attempts(competition_id)",
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        attempt_id TEXT NOT NULL,
        judge_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        decision TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        PRIMARY KEY (attempt_id, judge_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vote_audit (
        attempt_id TEXT NOT NULL,
        sequence INTEGER NOT NULL,
        judge_id TEXT NOT NULL,
        previous TEXT,
        decision TEXT NOT NULL,
        at TEXT NOT NULL,
        PRIMARY KEY (attempt_id, sequence)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY,
        seq INTEGER NOT NULL,
        sport TEXT NOT NULL,
        discipline TEXT NOT NULL,
        category TEXT NOT NULL,
        weight_class TEXT NOT NULL,
        record_type TEXT NOT NULL,
        holder_athlete_id TEXT NOT NULL,
        value REAL NOT NULL,
        set_at TEXT NOT NULL,
        is_ratified INTEGER NOT NULL,
        is_active INTEGER NOT NULL,
        attempt_id TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_records_key
        ON records(sport, discipline, category, weight_class, record_type)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scores (
        athlete_id TEXT NOT NULL,
        competition_id TEXT NOT NULL,
        bests TEXT NOT NULL,
        total REAL NOT NULL,
        scores TEXT NOT NULL,
        bodyweight REAL NOT NULL,
        sex TEXT NOT NULL,
        age INTEGER,
        computed_at TEXT NOT NULL,
        PRIMARY KEY (athlete_id, competition_id)
    )
    "#,
];

/// `Store` backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and ensure the schema
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!("Opened SQLite store at {}", path.display());
        Self::with_pool(pool).await
    }

    /// Private in-memory database (single connection)
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating tables as needed
    pub async fn with_pool(pool: Pool<Sqlite>) -> StoreResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

// ========================================
// Column helpers
// ========================================

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("invalid uuid '{}': {}", value, e)))
}

fn parse_text<T: FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::Corrupt)
}

fn get_uuid(row: &SqliteRow, column: &str) -> StoreResult<Uuid> {
    let text: String = row.try_get(column)?;
    parse_uuid(&text)
}

fn get_parsed<T: FromStr<Err = String>>(row: &SqliteRow, column: &str) -> StoreResult<T> {
    let text: String = row.try_get(column)?;
    parse_text(&text)
}

fn get_parsed_opt<T: FromStr<Err = String>>(row: &SqliteRow, column: &str) -> StoreResult<Option<T>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| parse_text(&t)).transpose()
}

fn get_u64(row: &SqliteRow, column: &str) -> StoreResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn row_to_attempt(row: &SqliteRow) -> StoreResult<Attempt> {
    let attempt_number = u32::try_from(get_u64(row, "attempt_number")?)
        .map_err(|_| StoreError::Corrupt("attempt_number out of range".into()))?;
    Ok(Attempt {
        id: get_uuid(row, "id")?,
        athlete_id: get_uuid(row, "athlete_id")?,
        competition_id: get_uuid(row, "competition_id")?,
        session_id: get_uuid(row, "session_id")?,
        discipline: get_parsed(row, "discipline")?,
        attempt_number,
        declared_weight: row.try_get("declared_weight")?,
        actual_weight: row.try_get("actual_weight")?,
        state: get_parsed(row, "state")?,
        decision: get_parsed_opt(row, "decision")?,
        resolution: get_parsed_opt(row, "resolution")?,
        declared_at: row.try_get("declared_at")?,
        opened_at: row.try_get("opened_at")?,
        resolved_at: row.try_get("resolved_at")?,
        finalized_at: row.try_get("finalized_at")?,
        revision: get_u64(row, "revision")?,
    })
}

fn row_to_vote(row: &SqliteRow) -> StoreResult<Vote> {
    let position = u8::try_from(get_u64(row, "position")?)
        .map_err(|_| StoreError::Corrupt("vote position out of range".into()))?;
    Ok(Vote {
        attempt_id: get_uuid(row, "attempt_id")?,
        judge_id: get_uuid(row, "judge_id")?,
        position,
        decision: get_parsed(row, "decision")?,
        submitted_at: row.try_get("submitted_at")?,
        sequence: get_u64(row, "sequence")?,
    })
}

fn row_to_record(row: &SqliteRow) -> StoreResult<RecordEntry> {
    let attempt_id: Option<String> = row.try_get("attempt_id")?;
    Ok(RecordEntry {
        id: get_uuid(row, "id")?,
        key: RecordKey {
            sport: get_parsed(row, "sport")?,
            discipline: get_parsed(row, "discipline")?,
            category: row.try_get("category")?,
            weight_class: row.try_get("weight_class")?,
            record_type: get_parsed(row, "record_type")?,
        },
        holder_athlete_id: get_uuid(row, "holder_athlete_id")?,
        value: row.try_get("value")?,
        set_at: row.try_get("set_at")?,
        is_ratified: row.try_get("is_ratified")?,
        is_active: row.try_get("is_active")?,
        attempt_id: attempt_id.map(|id| parse_uuid(&id)).transpose()?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_competition(&self, id: CompetitionId) -> StoreResult<Competition> {
        let row = sqlx::query("SELECT * FROM competitions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("competition", id))?;

        let record_types: String = row.try_get("record_types")?;
        let strongman_events: String = row.try_get("strongman_events")?;
        Ok(Competition {
            id: get_uuid(&row, "id")?,
            name: row.try_get("name")?,
            sport: get_parsed(&row, "sport")?,
            formula: get_parsed_opt::<ScoringFormula>(&row, "formula")?,
            record_types: serde_json::from_str(&record_types)?,
            strongman_events: serde_json::from_str(&strongman_events)?,
        })
    }

    async fn load_panel(&self, session_id: SessionId) -> StoreResult<JudgePanel> {
        let row = sqlx::query("SELECT judges FROM judge_panels WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("judge panel", session_id))?;

        let judges: String = row.try_get("judges")?;
        Ok(JudgePanel::new(session_id, serde_json::from_str(&judges)?))
    }

    async fn load_athlete(&self, id: AthleteId) -> StoreResult<Athlete> {
        let row = sqlx::query("SELECT * FROM athletes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("athlete", id))?;

        let age: Option<i64> = row.try_get("age")?;
        Ok(Athlete {
            id: get_uuid(&row, "id")?,
            name: row.try_get("name")?,
            sex: get_parsed(&row, "sex")?,
            bodyweight: row.try_get("bodyweight")?,
            age: age.and_then(|a| u32::try_from(a).ok()),
            category: row.try_get("category")?,
            weight_class: row.try_get("weight_class")?,
            equipment: get_parsed(&row, "equipment")?,
        })
    }

    async fn save_attempt(&self, attempt: &Attempt) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, athlete_id, competition_id, session_id, discipline,
                attempt_number, declared_weight, actual_weight, state,
                decision, resolution, declared_at, opened_at, resolved_at,
                finalized_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                declared_weight = excluded.declared_weight,
                actual_weight = excluded.actual_weight,
                state = excluded.state,
                decision = excluded.decision,
                resolution = excluded.resolution,
                opened_at = excluded.opened_at,
                resolved_at = excluded.resolved_at,
                finalized_at = excluded.finalized_at,
                revision = excluded.revision
            WHERE excluded.revision > attempts.revision
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(attempt.athlete_id.to_string())
        .bind(attempt.competition_id.to_string())
        .bind(attempt.session_id.to_string())
        .bind(attempt.discipline.to_string())
        .bind(i64::from(attempt.attempt_number))
        .bind(attempt.declared_weight)
        .bind(attempt.actual_weight)
        .bind(attempt.state.to_string())
        .bind(attempt.decision.map(|d| d.to_string()))
        .bind(attempt.resolution.map(|r| r.to_string()))
        .bind(attempt.declared_at)
        .bind(attempt.opened_at)
        .bind(attempt.resolved_at)
        .bind(attempt.finalized_at)
        .bind(attempt.revision as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_attempt(&self, id: AttemptId) -> StoreResult<Option<Attempt>> {
        let row = sqlx::query("SELECT * FROM attempts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_attempt).transpose()
    }

    async fn list_attempts(&self, competition_id: CompetitionId) -> StoreResult<Vec<Attempt>> {
        let rows = sqlx::query(
            "SELECT * FROM attempts WHERE competition_id = ? ORDER BY declared_at, id",
        )
        .bind(competition_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_attempt).collect()
    }

    async fn save_vote(&self, vote: &Vote) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (attempt_id, judge_id, position, decision, submitted_at, sequence)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(attempt_id, judge_id) DO UPDATE SET
                decision = excluded.decision,
                submitted_at = excluded.submitted_at,
                sequence = excluded.sequence
            WHERE excluded.sequence > votes.sequence
            "#,
        )
        .bind(vote.attempt_id.to_string())
        .bind(vote.judge_id.to_string())
        .bind(i64::from(vote.position))
        .bind(vote.decision.to_string())
        .bind(vote.submitted_at)
        .bind(vote.sequence as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_vote_audit(&self, entry: &VoteAuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO vote_audit (attempt_id, sequence, judge_id, previous, decision, at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.attempt_id.to_string())
        .bind(entry.sequence as i64)
        .bind(entry.judge_id.to_string())
        .bind(entry.previous.map(|d| d.to_string()))
        .bind(entry.decision.to_string())
        .bind(entry.at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_votes(&self, attempt_id: AttemptId) -> StoreResult<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE attempt_id = ? ORDER BY position")
            .bind(attempt_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_vote).collect()
    }

    async fn load_vote_audit(&self, attempt_id: AttemptId) -> StoreResult<Vec<VoteAuditEntry>> {
        let rows = sqlx::query("SELECT * FROM vote_audit WHERE attempt_id = ? ORDER BY sequence")
            .bind(attempt_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(VoteAuditEntry {
                    attempt_id: get_uuid(row, "attempt_id")?,
                    judge_id: get_uuid(row, "judge_id")?,
                    sequence: get_u64(row, "sequence")?,
                    previous: get_parsed_opt(row, "previous")?,
                    decision: get_parsed(row, "decision")?,
                    at: row.try_get("at")?,
                })
            })
            .collect()
    }

    async fn load_active_record(&self, key: &RecordKey) -> StoreResult<Option<RecordEntry>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM records
            WHERE sport = ? AND discipline = ? AND category = ? AND weight_class = ?
              AND record_type = ? AND is_active = 1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(key.sport.to_string())
        .bind(key.discipline.to_string())
        .bind(&key.category)
        .bind(&key.weight_class)
        .bind(key.record_type.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn save_record(&self, entry: &RecordEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO records (
                id, seq, sport, discipline, category, weight_class, record_type,
                holder_athlete_id, value, set_at, is_ratified, is_active, attempt_id
            ) VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM records), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                is_ratified = excluded.is_ratified,
                is_active = excluded.is_active
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.key.sport.to_string())
        .bind(entry.key.discipline.to_string())
        .bind(&entry.key.category)
        .bind(&entry.key.weight_class)
        .bind(entry.key.record_type.to_string())
        .bind(entry.holder_athlete_id.to_string())
        .bind(entry.value)
        .bind(entry.set_at)
        .bind(entry.is_ratified)
        .bind(entry.is_active)
        .bind(entry.attempt_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_history(&self, key: &RecordKey) -> StoreResult<Vec<RecordEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM records
            WHERE sport = ? AND discipline = ? AND category = ? AND weight_class = ?
              AND record_type = ?
            ORDER BY seq
            "#,
        )
        .bind(key.sport.to_string())
        .bind(key.discipline.to_string())
        .bind(&key.category)
        .bind(&key.weight_class)
        .bind(key.record_type.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn save_score(&self, score: &ScoreRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scores (
                athlete_id, competition_id, bests, total, scores,
                bodyweight, sex, age, computed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(athlete_id, competition_id) DO UPDATE SET
                bests = excluded.bests,
                total = excluded.total,
                scores = excluded.scores,
                bodyweight = excluded.bodyweight,
                sex = excluded.sex,
                age = excluded.age,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(score.athlete_id.to_string())
        .bind(score.competition_id.to_string())
        .bind(serde_json::to_string(&score.bests)?)
        .bind(score.total)
        .bind(serde_json::to_string(&score.scores)?)
        .bind(score.bodyweight)
        .bind(score.sex.to_string())
        .bind(score.age.map(i64::from))
        .bind(score.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_score(
        &self,
        athlete_id: AthleteId,
        competition_id: CompetitionId,
    ) -> StoreResult<Option<ScoreRecord>> {
        let row = sqlx::query("SELECT * FROM scores WHERE athlete_id = ? AND competition_id = ?")
            .bind(athlete_id.to_string())
            .bind(competition_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let bests: String = row.try_get("bests")?;
        let scores: String = row.try_get("scores")?;
        let age: Option<i64> = row.try_get("age")?;
        Ok(Some(ScoreRecord {
            athlete_id,
            competition_id,
            bests: serde_json::from_str::<BTreeMap<Discipline, f64>>(&bests)?,
            total: row.try_get("total")?,
            scores: serde_json::from_str::<BTreeMap<ScoringFormula, f64>>(&scores)?,
            bodyweight: row.try_get("bodyweight")?,
            sex: get_parsed(&row, "sex")?,
            age: age.and_then(|a| u32::try_from(a).ok()),
            computed_at: row.try_get("computed_at")?,
        }))
    }
}

#[async_trait]
impl RegistrationStore for SqliteStore {
    async fn register_competition(&self, competition: &Competition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO competitions (id, name, sport, formula, record_types, strongman_events)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(competition.id.to_string())
        .bind(&competition.name)
        .bind(competition.sport.to_string())
        .bind(competition.formula.map(|f| f.to_string()))
        .bind(serde_json::to_string(&competition.record_types)?)
        .bind(serde_json::to_string(&competition.strongman_events)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register_panel(&self, panel: &JudgePanel) -> StoreResult<()> {
        sqlx::query("INSERT OR REPLACE INTO judge_panels (session_id, judges) VALUES (?, ?)")
            .bind(panel.session_id.to_string())
            .bind(serde_json::to_string(&panel.judges)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn register_athlete(&self, athlete: &Athlete) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO athletes (
                id, name, sex, bodyweight, age, category, weight_class, equipment
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(athlete.id.to_string())
        .bind(&athlete.name)
        .bind(athlete.sex.to_string())
        .bind(athlete.bodyweight)
        .bind(athlete.age.map(i64::from))
        .bind(&athlete.category)
        .bind(&athlete.weight_class)
        .bind(athlete.equipment.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
