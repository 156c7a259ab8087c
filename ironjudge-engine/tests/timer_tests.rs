//! Attempt timer behaviour through the engine (paused tokio clock)
//!
//! Covers:
//! - forced decision on expiry from partial votes
//! - quorum vote arriving after a forced decision
//! - void expiry policy
//! - pause / resume / reset and per-competition isolation
//! - tick events and remaining-time monotonicity
//! - calling time on a started engine resolves in the caller

mod helpers;

use std::time::Duration;

use ironjudge_common::events::{
    AttemptState, CompetitionEvent, Decision, Discipline, Resolution, Sex, Sport, TimerKind,
};
use ironjudge_engine::config::ExpiryPolicy;
use ironjudge_engine::{DeclareRequest, EngineConfig};
use helpers::{athlete, drain_events, wait_for_state, TestMeet};

use Decision::{Invalid, Valid};

const ATTEMPT_WINDOW: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_expiry_forces_decision_from_partial_votes() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Clock", Sex::Male, 93.0, "93");
    meet.register(&lifter).await;
    let mut rx = meet.bus.subscribe();

    let id = meet.open(&lifter, Discipline::Squat, 210.0).await;
    meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();
    meet.engine.submit_vote(id, meet.judge(1), Invalid).await.unwrap();

    tokio::time::sleep(ATTEMPT_WINDOW + Duration::from_secs(1)).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Judged).await);

    let attempt = meet.engine.attempt(id).await.unwrap();
    assert_eq!(attempt.decision, Some(Invalid));
    assert_eq!(attempt.resolution, Some(Resolution::TimerExpired));

    let expired = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CompetitionEvent::TimerExpired { .. }))
        .count();
    assert_eq!(expired, 1);

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_expiry_without_votes_is_invalid() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Silent", Sex::Female, 63.0, "63");
    meet.register(&lifter).await;

    let id = meet.open(&lifter, Discipline::BenchPress, 80.0).await;
    tokio::time::sleep(ATTEMPT_WINDOW * 2).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Judged).await);
    assert_eq!(meet.engine.attempt(id).await.unwrap().decision, Some(Invalid));

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_quorum_after_forced_expiry_upgrades_resolution() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Late", Sex::Male, 120.0, "120");
    meet.register(&lifter).await;

    let id = meet.open(&lifter, Discipline::Deadlift, 300.0).await;
    meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();
    meet.engine.submit_vote(id, meet.judge(1), Valid).await.unwrap();

    tokio::time::sleep(ATTEMPT_WINDOW + Duration::from_secs(1)).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Judged).await);
    let forced = meet.engine.attempt(id).await.unwrap();
    assert_eq!(forced.decision, Some(Valid));
    assert_eq!(forced.resolution, Some(Resolution::TimerExpired));

    let receipt = meet.engine.submit_vote(id, meet.judge(2), Valid).await.unwrap();
    assert_eq!(receipt.resolution, Some(Resolution::Quorum));
    assert_eq!(receipt.decision, Some(Valid));

    let stored = meet.store.load_attempt(id).await.unwrap().unwrap();
    assert_eq!(stored.resolution, Some(Resolution::Quorum));

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_void_expiry_policy() {
    let config = EngineConfig {
        expiry_policy: ExpiryPolicy::Void,
        ..EngineConfig::default()
    };
    let meet = TestMeet::new(Sport::Powerlifting, config).await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Voided", Sex::Male, 74.0, "74");
    meet.register(&lifter).await;

    let id = meet.open(&lifter, Discipline::Squat, 170.0).await;
    meet.engine.submit_vote(id, meet.judge(0), Valid).await.unwrap();

    tokio::time::sleep(ATTEMPT_WINDOW + Duration::from_secs(1)).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Void).await);
    assert_eq!(meet.engine.attempt(id).await.unwrap().decision, None);

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_the_attempt_open() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Paused", Sex::Female, 76.0, "76");
    meet.register(&lifter).await;
    let competition = meet.competition.id;

    let id = meet.open(&lifter, Discipline::Squat, 150.0).await;
    tokio::time::sleep(Duration::from_secs(20)).await;
    let left = meet.engine.pause_timer(competition).unwrap();
    assert!(left <= Duration::from_secs(40));
    assert!(meet.engine.timer_paused(competition));

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(meet.engine.attempt(id).await.unwrap().state, AttemptState::InProgress);
    assert_eq!(meet.engine.timer_remaining(competition), Some(left));

    meet.engine.resume_timer(competition).unwrap();
    tokio::time::sleep(left + Duration::from_secs(1)).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Judged).await);

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_restarts_the_window() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Reset", Sex::Male, 66.0, "66");
    meet.register(&lifter).await;
    let competition = meet.competition.id;

    let id = meet.open(&lifter, Discipline::BenchPress, 120.0).await;
    tokio::time::sleep(Duration::from_secs(50)).await;
    let handle = meet.engine.reset_timer(competition).unwrap();
    assert_eq!(handle.attempt_id, Some(id));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(meet.engine.attempt(id).await.unwrap().state, AttemptState::InProgress);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(wait_for_state(&meet.engine, id, AttemptState::Judged).await);

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_competitions_have_independent_timers() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let other = meet.add_competition(Sport::Powerlifting).await;

    let first = athlete("Platform A", Sex::Male, 83.0, "83");
    let second = athlete("Platform B", Sex::Male, 83.0, "83");
    meet.register(&first).await;
    meet.register(&second).await;

    let a = meet.open(&first, Discipline::Squat, 200.0).await;
    let b = meet
        .engine
        .declare(DeclareRequest {
            competition_id: other.id,
            ..meet.request(&second, Discipline::Squat, 200.0)
        })
        .await
        .unwrap()
        .attempt
        .id;
    meet.engine.open(b).await.unwrap();

    meet.engine.pause_timer(other.id).unwrap();
    tokio::time::sleep(ATTEMPT_WINDOW + Duration::from_secs(1)).await;

    assert!(wait_for_state(&meet.engine, a, AttemptState::Judged).await);
    assert_eq!(meet.engine.attempt(b).await.unwrap().state, AttemptState::InProgress);
    assert_eq!(meet.engine.timer_remaining(other.id), Some(ATTEMPT_WINDOW));

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_calling_time_resolves_without_waiting() {
    let meet = TestMeet::powerlifting().await;
    let lifter = athlete("Called", Sex::Female, 52.0, "52");
    meet.register(&lifter).await;

    let id = meet.open(&lifter, Discipline::Deadlift, 150.0).await;
    meet.engine.submit_vote(id, meet.judge(2), Valid).await.unwrap();

    let resolved = meet.engine.expire_timer(meet.competition.id).await.unwrap().unwrap();
    assert_eq!(resolved.id, id);
    assert_eq!(resolved.state, AttemptState::Judged);
    // One valid vote out of three is still a majority of the votes cast
    assert_eq!(resolved.decision, Some(Valid));

    // Second call finds nothing left to expire
    assert!(meet.engine.expire_timer(meet.competition.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_calling_time_on_started_engine_returns_resolved_attempt() {
    let meet = TestMeet::powerlifting().await;
    meet.engine.start().await.unwrap();
    let lifter = athlete("Started", Sex::Male, 105.0, "105");
    meet.register(&lifter).await;
    let mut rx = meet.bus.subscribe();

    for discipline in [Discipline::Squat, Discipline::BenchPress, Discipline::Deadlift] {
        let id = meet.open(&lifter, discipline, 150.0).await;
        meet.engine.submit_vote(id, meet.judge(0), Invalid).await.unwrap();

        // The background handler never sees a called-time expiry
        let resolved = meet.engine.expire_timer(meet.competition.id).await.unwrap();
        assert_eq!(resolved.map(|a| a.id), Some(id));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            meet.engine.attempt(id).await.unwrap().resolution,
            Some(Resolution::TimerExpired)
        );
    }

    let judged = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CompetitionEvent::AttemptJudged { .. }))
        .count();
    assert_eq!(judged, 3);

    meet.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_after_quorum_does_nothing() {
    let meet = TestMeet::powerlifting().await;
    let lifter = athlete("Polled", Sex::Male, 59.0, "59");
    meet.register(&lifter).await;

    let id = meet.open(&lifter, Discipline::Squat, 150.0).await;
    for seat in 0..3 {
        meet.engine.submit_vote(id, meet.judge(seat), Invalid).await.unwrap();
    }
    tokio::time::sleep(ATTEMPT_WINDOW * 2).await;
    assert!(meet.engine.poll_timer(meet.competition.id).await.unwrap().is_none());
    assert_eq!(
        meet.engine.attempt(id).await.unwrap().resolution,
        Some(Resolution::Quorum)
    );
}

#[tokio::test(start_paused = true)]
async fn test_remaining_never_increases_and_ticks_are_published() {
    let meet = TestMeet::powerlifting().await;
    let competition = meet.competition.id;
    let mut rx = meet.bus.subscribe();

    let handle = meet.engine.start_timer(competition, TimerKind::Rest);
    assert_eq!(handle.attempt_id, None);

    let mut last = meet.engine.timer_remaining(competition).unwrap();
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(7_500)).await;
        let now = meet.engine.timer_remaining(competition).unwrap();
        assert!(now <= last);
        last = now;
    }
    assert_eq!(last, Duration::ZERO);

    let events = drain_events(&mut rx);
    let ticks = events
        .iter()
        .filter(|e| matches!(e, CompetitionEvent::TimerTick { .. }))
        .count();
    assert!(ticks >= 30, "only {} ticks", ticks);
    assert!(events.iter().any(|e| matches!(
        e,
        CompetitionEvent::TimerExpired { kind: TimerKind::Rest, attempt_id: None, .. }
    )));
}
