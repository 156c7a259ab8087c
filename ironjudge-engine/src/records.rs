//! Record tracker
//!
//! Compares a finalized valid lift against the active record for its key and
//! registers a new entry when it is strictly greater. Superseded entries are
//! deactivated after the new entry is saved and kept as history. New entries start unratified;
//! ratification happens outside the engine.
//!
//! Checks for one key are serialized through a per-key async mutex so two
//! simultaneous finalizations can not both read the same active record and
//! both register.

use crate::error::Result;
use crate::locks::KeyedLocks;
use crate::model::{RecordEntry, RecordKey};
use crate::store::Store;
use ironjudge_common::{AthleteId, AttemptId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one record check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCheck {
    pub is_new_record: bool,
    /// Active entry before the check, if any
    pub previous: Option<RecordEntry>,
    /// Margin over the previous value (the full value when there was none)
    pub improvement: f64,
    /// Entry written when a record was set
    pub entry: Option<RecordEntry>,
}

pub struct RecordTracker {
    store: Arc<dyn Store>,
    key_locks: KeyedLocks<RecordKey>,
}

impl RecordTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            key_locks: KeyedLocks::new(),
        }
    }

    /// Register `value` for `key` if it beats the active record
    ///
    /// Only call this for valid lifts. Non-positive values never register.
    /// The new entry is saved before the previous one is deactivated, so a
    /// failed write never leaves the key without an active record. Calling
    /// again for an attempt whose entry is already active finishes the
    /// registration and reports the same record.
    pub async fn check_and_register(
        &self,
        key: &RecordKey,
        value: f64,
        holder: AthleteId,
        attempt_id: Option<AttemptId>,
    ) -> Result<RecordCheck> {
        let _guard = self.key_locks.acquire(key).await;

        let previous = self.store.load_active_record(key).await?;
        if let (Some(active), Some(attempt_id)) = (&previous, attempt_id) {
            if active.attempt_id == Some(attempt_id) {
                return self.complete_registration(key, active.clone()).await;
            }
        }

        let beats = match &previous {
            Some(active) => value > active.value,
            None => value > 0.0,
        };

        if !beats {
            debug!(
                "No record for {}: {} kg vs active {:?}",
                key,
                value,
                previous.as_ref().map(|r| r.value)
            );
            return Ok(RecordCheck {
                is_new_record: false,
                previous,
                improvement: 0.0,
                entry: None,
            });
        }

        let entry = RecordEntry {
            id: ironjudge_common::ids::generate(),
            key: key.clone(),
            holder_athlete_id: holder,
            value,
            set_at: ironjudge_common::time::now(),
            is_ratified: false,
            is_active: true,
            attempt_id,
        };
        self.store.save_record(&entry).await?;

        if let Some(active) = &previous {
            let superseded = RecordEntry {
                is_active: false,
                ..active.clone()
            };
            self.store.save_record(&superseded).await?;
        }

        let improvement = previous.as_ref().map_or(value, |r| value - r.value);
        info!(
            "New {} record: {} kg by athlete {} (+{} kg)",
            key, value, holder, improvement
        );

        Ok(RecordCheck {
            is_new_record: true,
            previous,
            improvement,
            entry: Some(entry),
        })
    }

    /// Deactivate whatever `entry` superseded and report it as the record
    async fn complete_registration(&self, key: &RecordKey, entry: RecordEntry) -> Result<RecordCheck> {
        let mut previous: Option<RecordEntry> = None;
        for other in self.store.record_history(key).await? {
            if other.id == entry.id || other.value >= entry.value {
                continue;
            }
            if other.is_active {
                let superseded = RecordEntry {
                    is_active: false,
                    ..other.clone()
                };
                self.store.save_record(&superseded).await?;
            }
            if previous.as_ref().map_or(true, |p| other.value > p.value) {
                // Reported as it was before this record replaced it
                previous = Some(RecordEntry {
                    is_active: true,
                    ..other
                });
            }
        }

        let improvement = previous.as_ref().map_or(entry.value, |r| entry.value - r.value);
        debug!(
            "{} record {} kg already registered for attempt {:?}",
            key, entry.value, entry.attempt_id
        );
        Ok(RecordCheck {
            is_new_record: true,
            previous,
            improvement,
            entry: Some(entry),
        })
    }
}
