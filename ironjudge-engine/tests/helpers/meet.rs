//! Test meet fixture
//!
//! Registers one competition with a three-judge panel and hands out an
//! engine wired to a `MemoryStore` (or any other store) and an `EventBus`.

use std::sync::Arc;
use std::time::Duration;

use ironjudge_common::events::{
    AttemptState, CompetitionEvent, Decision, Discipline, Equipment, EventBus, RecordType, Sex,
    Sport,
};
use ironjudge_common::AttemptId;
use ironjudge_engine::judging::FinalizeOutcome;
use ironjudge_engine::model::{Athlete, Competition, JudgePanel};
use ironjudge_engine::{
    AdjudicationEngine, DeclareRequest, EngineConfig, MemoryStore, RegistrationStore, Store,
};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Athlete in the open category
pub fn athlete(name: &str, sex: Sex, bodyweight: f64, weight_class: &str) -> Athlete {
    Athlete {
        id: Uuid::new_v4(),
        name: name.to_string(),
        sex,
        bodyweight,
        age: Some(28),
        category: "open".to_string(),
        weight_class: weight_class.to_string(),
        equipment: Equipment::Raw,
    }
}

pub struct TestMeet {
    pub engine: Arc<AdjudicationEngine>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<dyn RegistrationStore>,
    pub bus: EventBus,
    pub competition: Competition,
    pub panel: JudgePanel,
}

impl TestMeet {
    /// Powerlifting meet tracking national records, default config
    pub async fn powerlifting() -> Self {
        Self::new(Sport::Powerlifting, EngineConfig::default()).await
    }

    pub async fn new(sport: Sport, config: EngineConfig) -> Self {
        Self::with_store(sport, config, Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store<S>(sport: Sport, config: EngineConfig, store: Arc<S>) -> Self
    where
        S: RegistrationStore + 'static,
    {
        let competition = Competition {
            id: Uuid::new_v4(),
            name: format!("{} test meet", sport),
            sport,
            formula: None,
            record_types: vec![RecordType::National],
            strongman_events: vec![],
        };
        store.register_competition(&competition).await.unwrap();

        let panel = JudgePanel::new(Uuid::new_v4(), (0..3).map(|_| Uuid::new_v4()).collect());
        store.register_panel(&panel).await.unwrap();

        let bus = EventBus::new(1000);
        let registry: Arc<dyn RegistrationStore> = store.clone();
        let store: Arc<dyn Store> = store;
        let engine = AdjudicationEngine::new(config, Arc::clone(&store), bus.clone()).unwrap();

        Self {
            engine: Arc::new(engine),
            store,
            registry,
            bus,
            competition,
            panel,
        }
    }

    /// Register an athlete for this meet
    pub async fn register(&self, athlete: &Athlete) {
        self.registry.register_athlete(athlete).await.unwrap();
    }

    /// Second competition on the same engine and panel
    pub async fn add_competition(&self, sport: Sport) -> Competition {
        let competition = Competition {
            id: Uuid::new_v4(),
            name: format!("{} side meet", sport),
            sport,
            formula: None,
            record_types: vec![RecordType::National],
            strongman_events: vec![],
        };
        self.registry.register_competition(&competition).await.unwrap();
        competition
    }

    pub fn judge(&self, seat: usize) -> Uuid {
        self.panel.judges[seat]
    }

    pub fn request(&self, athlete: &Athlete, discipline: Discipline, weight: f64) -> DeclareRequest {
        DeclareRequest {
            athlete_id: athlete.id,
            competition_id: self.competition.id,
            session_id: self.panel.session_id,
            discipline,
            attempt_number: None,
            weight,
        }
    }

    pub async fn declare(&self, athlete: &Athlete, discipline: Discipline, weight: f64) -> AttemptId {
        self.engine
            .declare(self.request(athlete, discipline, weight))
            .await
            .unwrap()
            .attempt
            .id
    }

    /// Declare and open an attempt
    pub async fn open(&self, athlete: &Athlete, discipline: Discipline, weight: f64) -> AttemptId {
        let id = self.declare(athlete, discipline, weight).await;
        self.engine.open(id).await.unwrap();
        id
    }

    /// Run a full attempt: declare, open, one call per seat, finalize
    pub async fn lift(
        &self,
        athlete: &Athlete,
        discipline: Discipline,
        weight: f64,
        calls: [Decision; 3],
    ) -> FinalizeOutcome {
        let id = self.open(athlete, discipline, weight).await;
        for (seat, decision) in calls.into_iter().enumerate() {
            self.engine.submit_vote(id, self.judge(seat), decision).await.unwrap();
        }
        self.engine.finalize(id).await.unwrap()
    }
}

/// Everything currently buffered on a subscriber
pub fn drain_events(rx: &mut broadcast::Receiver<CompetitionEvent>) -> Vec<CompetitionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll until the attempt reaches `state` (paused-clock friendly)
pub async fn wait_for_state(engine: &AdjudicationEngine, id: AttemptId, state: AttemptState) -> bool {
    for _ in 0..200 {
        if engine.attempt(id).await.unwrap().state == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
