//! Store failures propagate and retries complete the write
//!
//! Covers:
//! - a vote whose save failed is persisted by the judge's identical retry
//! - a quorum vote whose attempt save failed leaves the store judged on retry
//! - open and void retries after a failed attempt save
//! - finalize stays retryable when record, score or attempt writes fail
//! - a failed record deactivation never leaves the key without an active record
//! - overlapping finalize retries publish once

mod helpers;

use std::sync::Arc;

use chrono::Utc;
use ironjudge_common::events::{
    AttemptState, CompetitionEvent, Decision, Discipline, RecordType, Resolution, Sex, Sport,
};
use ironjudge_engine::judging::VoteOutcome;
use ironjudge_engine::model::{RecordEntry, RecordKey};
use ironjudge_engine::{EngineConfig, Error, StoreError};
use helpers::{athlete, drain_events, FailingStore, Op, TestMeet};
use uuid::Uuid;

use Decision::{Invalid, Valid};

async fn failing_meet() -> (TestMeet, Arc<FailingStore>) {
    let store = Arc::new(FailingStore::new());
    let meet =
        TestMeet::with_store(Sport::Powerlifting, EngineConfig::default(), Arc::clone(&store))
            .await;
    (meet, store)
}

fn deadlift_key() -> RecordKey {
    RecordKey {
        sport: Sport::Powerlifting,
        discipline: Discipline::Deadlift,
        category: "open".to_string(),
        weight_class: "93".to_string(),
        record_type: RecordType::National,
    }
}

fn is_injected(err: &Error) -> bool {
    matches!(err, Error::Store(StoreError::Corrupt(_)))
}

#[tokio::test]
async fn test_vote_retry_after_failed_save_is_persisted() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Retry", Sex::Male, 90.0, "93");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::Squat, 200.0).await;
    let mut rx = meet.bus.subscribe();

    store.fail(Op::SaveVote, 1);
    let err = meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap_err();
    assert!(is_injected(&err));
    assert!(meet.store.load_votes(id).await.unwrap().is_empty());

    let receipt = meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();
    assert_eq!(receipt.outcome, VoteOutcome::Unchanged);
    assert_eq!(receipt.tally.valid_count, 1);

    let votes = meet.store.load_votes(id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].decision, Valid);
    assert_eq!(meet.store.load_vote_audit(id).await.unwrap().len(), 1);

    // Once written, a further identical call is a plain no-op
    meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();
    let tallies = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CompetitionEvent::VoteTallyUpdated { .. }))
        .count();
    assert_eq!(tallies, 1);
    assert_eq!(meet.store.load_vote_audit(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_audit_append_is_retried_without_duplicates() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Audit", Sex::Female, 63.0, "63");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::BenchPress, 90.0).await;

    store.fail(Op::AppendVoteAudit, 1);
    assert!(meet.engine.submit_vote(id, meet.judge(1), Invalid).await.is_err());
    // Vote row made it, its audit entry did not
    assert_eq!(meet.store.load_votes(id).await.unwrap().len(), 1);
    assert!(meet.store.load_vote_audit(id).await.unwrap().is_empty());

    // A correction flushes the missing entry along with its own
    let receipt = meet.engine.submit_vote(id, meet.judge(1), Valid).await.unwrap();
    assert!(matches!(receipt.outcome, VoteOutcome::Corrected { .. }));

    let audit = meet.store.load_vote_audit(id).await.unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].decision, Invalid);
    assert_eq!(audit[1].previous, Some(Invalid));
    assert_eq!(meet.store.load_votes(id).await.unwrap()[0].decision, Valid);
}

#[tokio::test]
async fn test_quorum_retry_persists_judged_attempt() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Quorum", Sex::Male, 100.0, "105");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::Deadlift, 250.0).await;
    meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();
    meet.engine.submit_vote(id, meet.judge(1), Valid).await.unwrap();

    store.fail(Op::SaveAttempt, 1);
    let err = meet.engine.submit_vote(id, meet.judge(2), Invalid).await.unwrap_err();
    assert!(is_injected(&err));
    assert_eq!(meet.engine.attempt(id).await.unwrap().state, AttemptState::Judged);
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::InProgress
    );

    let mut rx = meet.bus.subscribe();
    let receipt = meet.engine.submit_vote(id, meet.judge(2), Invalid).await.unwrap();
    assert_eq!(receipt.state, AttemptState::Judged);

    let stored = meet.store.load_attempt(id).await.unwrap().unwrap();
    assert_eq!(stored.state, AttemptState::Judged);
    assert_eq!(stored.decision, Some(Valid));
    assert_eq!(stored.resolution, Some(Resolution::Quorum));
    assert_eq!(meet.store.load_votes(id).await.unwrap().len(), 3);
    assert!(drain_events(&mut rx)
        .iter()
        .any(|e| matches!(e, CompetitionEvent::AttemptJudged { .. })));
}

#[tokio::test]
async fn test_open_and_void_retry_after_failed_save() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Opened", Sex::Female, 57.0, "57");
    meet.register(&lifter).await;
    let id = meet.declare(&lifter, Discipline::Squat, 110.0).await;

    store.fail(Op::SaveAttempt, 1);
    assert!(meet.engine.open(id).await.is_err());
    let handle = meet.engine.open(id).await.unwrap();
    assert_eq!(handle.attempt_id, Some(id));
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::InProgress
    );

    store.fail(Op::SaveAttempt, 1);
    assert!(meet.engine.void(id, "athlete passed").await.is_err());
    let voided = meet.engine.void(id, "athlete passed").await.unwrap();
    assert_eq!(voided.state, AttemptState::Void);
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::Void
    );

    // Nothing left to retry: a third void is a wrong-state operation again
    let err = meet.engine.void(id, "again").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { from: AttemptState::Void, .. }));
}

#[tokio::test]
async fn test_finalize_retry_after_failed_record_save() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Record", Sex::Male, 92.0, "93");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::Squat, 230.0).await;
    for seat in 0..3 {
        meet.engine.submit_vote(id, meet.judge(seat), Valid).await.unwrap();
    }

    store.fail(Op::SaveRecord, 1);
    let err = meet.engine.finalize(id).await.unwrap_err();
    assert!(is_injected(&err));

    // Finalized for voting purposes, not yet in the store
    assert!(matches!(
        meet.engine.submit_vote(id, meet.judge(0), Invalid).await,
        Err(Error::AttemptClosed(_))
    ));
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::Judged
    );
    assert!(meet.store.load_score(lifter.id, meet.competition.id).await.unwrap().is_none());

    let outcome = meet.engine.finalize(id).await.unwrap();
    assert_eq!(outcome.attempt.state, AttemptState::Finalized);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].improvement, 230.0);

    let score = meet
        .store
        .load_score(lifter.id, meet.competition.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score.bests[&Discipline::Squat], 230.0);
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::Finalized
    );

    let err = meet.engine.finalize(id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { from: AttemptState::Finalized, .. }));
}

#[tokio::test]
async fn test_finalize_retry_after_failed_score_and_attempt_saves() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Score", Sex::Female, 75.0, "76");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::BenchPress, 100.0).await;
    for seat in 0..3 {
        meet.engine.submit_vote(id, meet.judge(seat), Valid).await.unwrap();
    }

    store.fail(Op::SaveScore, 1);
    assert!(meet.engine.finalize(id).await.is_err());
    store.fail(Op::SaveAttempt, 1);
    assert!(meet.engine.finalize(id).await.is_err());
    assert!(meet.store.load_score(lifter.id, meet.competition.id).await.unwrap().is_some());

    let mut rx = meet.bus.subscribe();
    let outcome = meet.engine.finalize(id).await.unwrap();
    // Record from the earlier run is reported again, not lost
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].entry.as_ref().unwrap().attempt_id, Some(id));
    assert_eq!(
        meet.store
            .record_history(&RecordKey {
                discipline: Discipline::BenchPress,
                weight_class: "76".to_string(),
                ..deadlift_key()
            })
            .await
            .unwrap()
            .len(),
        1
    );

    let types: Vec<String> = drain_events(&mut rx)
        .iter()
        .map(|e| e.event_type().to_string())
        .collect();
    assert!(types.iter().any(|t| t == "AttemptFinalized"));
    assert!(types.iter().any(|t| t == "ScoreUpdated"));
    assert_eq!(
        meet.engine.leaderboard(meet.competition.id).await.unwrap(),
        outcome.standings
    );
}

#[tokio::test]
async fn test_failed_deactivation_keeps_new_record_active() {
    let (meet, store) = failing_meet().await;
    let old = RecordEntry {
        id: Uuid::new_v4(),
        key: deadlift_key(),
        holder_athlete_id: Uuid::new_v4(),
        value: 220.0,
        set_at: Utc::now(),
        is_ratified: true,
        is_active: true,
        attempt_id: None,
    };
    meet.registry.import_record(&old).await.unwrap();
    let lifter = athlete("Breaker", Sex::Male, 92.1, "93");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::Deadlift, 225.0).await;
    for seat in 0..3 {
        meet.engine.submit_vote(id, meet.judge(seat), Valid).await.unwrap();
    }

    // New entry saved, deactivating the old one fails
    store.fail_after(Op::SaveRecord, 1, 1);
    assert!(meet.engine.finalize(id).await.is_err());
    let active = meet.store.load_active_record(&deadlift_key()).await.unwrap().unwrap();
    assert_eq!(active.value, 225.0);

    let outcome = meet.engine.finalize(id).await.unwrap();
    assert_eq!(outcome.records.len(), 1);
    let check = &outcome.records[0];
    assert_eq!(check.previous.as_ref().map(|r| r.value), Some(220.0));
    assert_eq!(check.improvement, 5.0);

    let history = meet.store.record_history(&deadlift_key()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(!history.iter().find(|r| r.id == old.id).unwrap().is_active);
}

#[tokio::test]
async fn test_concurrent_finalize_retries_publish_once() {
    let (meet, store) = failing_meet().await;
    let lifter = athlete("Twice", Sex::Male, 82.5, "83");
    meet.register(&lifter).await;
    let id = meet.open(&lifter, Discipline::Squat, 210.0).await;
    for seat in 0..3 {
        meet.engine.submit_vote(id, meet.judge(seat), Valid).await.unwrap();
    }
    store.fail(Op::SaveScore, 1);
    assert!(meet.engine.finalize(id).await.is_err());

    let mut rx = meet.bus.subscribe();
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&meet.engine);
            tokio::spawn(async move { engine.finalize(id).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(Error::InvalidTransition { from: AttemptState::Finalized, .. })
    )));

    let finalized = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CompetitionEvent::AttemptFinalized { .. }))
        .count();
    assert_eq!(finalized, 1);
    assert_eq!(
        meet.store.load_attempt(id).await.unwrap().unwrap().state,
        AttemptState::Finalized
    );
}
