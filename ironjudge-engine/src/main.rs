//! Meet simulator (ironjudge-sim) - Main entry point
//!
//! Replays a scripted meet through the adjudication engine: registers the
//! competition, panel, athletes and prior records, then declares, opens and
//! judges every scripted lift in order. Prints the final standings and the
//! active records as JSON on stdout; logs go to stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ironjudge_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use ironjudge_common::events::{
    AttemptState, Decision, Discipline, Equipment, EventBus, RecordType, ScoringFormula, Sex,
    StandingInfo,
};
use ironjudge_common::{AthleteId, JudgeId};
use ironjudge_engine::model::{
    Athlete, Attempt, Competition, JudgePanel, RecordEntry, RecordKey,
};
use ironjudge_engine::scoring::strongman::StrongmanEventScoring;
use ironjudge_engine::{
    AdjudicationEngine, DeclareRequest, EngineConfig, MemoryStore, RegistrationStore,
    SqliteStore, Store,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "ironjudge_engine=info,ironjudge_common=info,ironjudge_sim=info";

/// Command-line arguments for ironjudge-sim
#[derive(Parser, Debug)]
#[command(name = "ironjudge-sim")]
#[command(about = "Replay a scripted strength-sport meet through the adjudication engine")]
#[command(version)]
struct Args {
    /// Meet script (JSON)
    script: PathBuf,

    /// Engine configuration file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// SQLite database file; in-memory store when absent
    #[arg(short, long, env = "IRONJUDGE_DATABASE")]
    database: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (overrides the config file's)
    #[arg(long, env = "IRONJUDGE_LOG")]
    log_level: Option<String>,

    /// Echo every engine event to stderr as a JSON line
    #[arg(long)]
    events: bool,
}

// ========================================
// Script format
// ========================================

#[derive(Debug, Deserialize)]
struct MeetScript {
    competition: CompetitionScript,
    /// Judge names in seat order
    judges: Vec<String>,
    athletes: Vec<AthleteScript>,
    #[serde(default)]
    records: Vec<RecordScript>,
    lifts: Vec<LiftScript>,
}

#[derive(Debug, Deserialize)]
struct CompetitionScript {
    name: String,
    sport: ironjudge_common::events::Sport,
    #[serde(default)]
    formula: Option<ScoringFormula>,
    #[serde(default)]
    record_types: Vec<RecordType>,
    #[serde(default)]
    strongman_events: Vec<StrongmanEventScoring>,
}

#[derive(Debug, Deserialize)]
struct AthleteScript {
    /// Short handle used by `lifts` and `records`
    key: String,
    name: String,
    sex: Sex,
    bodyweight: f64,
    #[serde(default)]
    age: Option<u32>,
    category: String,
    weight_class: String,
    #[serde(default)]
    equipment: Equipment,
}

#[derive(Debug, Deserialize)]
struct RecordScript {
    discipline: Discipline,
    category: String,
    weight_class: String,
    record_type: RecordType,
    value: f64,
    /// Athlete key when the holder is in this meet
    #[serde(default)]
    holder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiftScript {
    athlete: String,
    discipline: Discipline,
    weight: f64,
    /// Weight change after declaring, before the attempt is opened
    #[serde(default)]
    change_to: Option<f64>,
    /// Calls in seat order; `null` for a judge who never votes
    #[serde(default)]
    votes: Vec<Option<Decision>>,
    /// Athlete passes: the attempt is voided instead of opened
    #[serde(default)]
    pass: bool,
}

#[derive(Debug, Serialize)]
struct LiftSummary {
    athlete: String,
    discipline: Discipline,
    attempt_number: u32,
    weight: f64,
    state: AttemptState,
    decision: Option<Decision>,
    records: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MeetReport {
    competition: String,
    lifts: Vec<LiftSummary>,
    rejected: Vec<String>,
    standings: Vec<StandingInfo>,
    records: Vec<RecordEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so its log_level can seed the filter
    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = EngineConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let default_filter = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    // Initialize tracing (stderr keeps stdout clean for the report)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    let script = read_script(&args.script)?;
    info!(
        "Replaying {} ({} athletes, {} lifts)",
        script.competition.name,
        script.athletes.len(),
        script.lifts.len()
    );

    let database = args.database.clone().or_else(|| config.database_path.clone());
    let report = match database {
        Some(path) => {
            info!("Using SQLite store at {}", path.display());
            let store = SqliteStore::open(&path)
                .await
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            run(Arc::new(store), config, script, args.events).await?
        }
        None => run(Arc::new(MemoryStore::new()), config, script, args.events).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_script(path: &Path) -> Result<MeetScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid script {}", path.display()))
}

async fn run<S>(store: Arc<S>, config: EngineConfig, script: MeetScript, echo_events: bool) -> Result<MeetReport>
where
    S: RegistrationStore + 'static,
{
    let bus = EventBus::new(config.event_bus_capacity);
    let event_task = spawn_event_logger(&bus, echo_events);

    // Registration
    let competition = Competition {
        id: ironjudge_common::ids::generate(),
        name: script.competition.name.clone(),
        sport: script.competition.sport,
        formula: script.competition.formula,
        record_types: script.competition.record_types.clone(),
        strongman_events: script.competition.strongman_events.clone(),
    };
    store.register_competition(&competition).await?;

    let judges: Vec<JudgeId> = script.judges.iter().map(|_| ironjudge_common::ids::generate()).collect();
    let panel = JudgePanel::new(ironjudge_common::ids::generate(), judges);
    store.register_panel(&panel).await?;

    let mut athletes: HashMap<String, Athlete> = HashMap::new();
    for entry in &script.athletes {
        let athlete = Athlete {
            id: ironjudge_common::ids::generate(),
            name: entry.name.clone(),
            sex: entry.sex,
            bodyweight: entry.bodyweight,
            age: entry.age,
            category: entry.category.clone(),
            weight_class: entry.weight_class.clone(),
            equipment: entry.equipment,
        };
        store.register_athlete(&athlete).await?;
        athletes.insert(entry.key.clone(), athlete);
    }

    let mut record_keys = Vec::new();
    for entry in &script.records {
        let holder: AthleteId = match &entry.holder {
            Some(key) => athlete_by_key(&athletes, key)?.id,
            None => ironjudge_common::ids::generate(),
        };
        let key = RecordKey {
            sport: competition.sport,
            discipline: entry.discipline.clone(),
            category: entry.category.clone(),
            weight_class: entry.weight_class.clone(),
            record_type: entry.record_type,
        };
        store
            .import_record(&RecordEntry {
                id: ironjudge_common::ids::generate(),
                key: key.clone(),
                holder_athlete_id: holder,
                value: entry.value,
                set_at: ironjudge_common::time::now(),
                is_ratified: true,
                is_active: true,
                attempt_id: None,
            })
            .await?;
        record_keys.push(key);
    }

    let dyn_store: Arc<dyn Store> = store;
    let engine = AdjudicationEngine::new(config, Arc::clone(&dyn_store), bus)?;
    engine.start().await?;

    let mut lifts = Vec::new();
    let mut rejected = Vec::new();
    for lift in &script.lifts {
        let athlete = athlete_by_key(&athletes, &lift.athlete)?;
        match replay_lift(&engine, &competition, &panel, athlete, lift).await {
            Ok(summary) => {
                for check in &summary.records {
                    info!("{}", check);
                }
                lifts.push(summary);
            }
            Err(e) => {
                warn!("{} {} {} kg rejected: {}", athlete.name, lift.discipline, lift.weight, e);
                rejected.push(format!("{} {} {} kg: {}", athlete.name, lift.discipline, lift.weight, e));
            }
        }
    }

    let formula = competition.ranking_formula();
    let standings = engine
        .leaderboard(competition.id)
        .await?
        .iter()
        .map(|s| s.to_info(formula))
        .collect();

    let mut records = Vec::new();
    for key in record_keys_for(&competition, &athletes, record_keys) {
        if let Some(active) = dyn_store.load_active_record(&key).await? {
            records.push(active);
        }
    }

    engine.shutdown().await;
    event_task.abort();

    Ok(MeetReport {
        competition: competition.name,
        lifts,
        rejected,
        standings,
        records,
    })
}

/// Declare, open and judge one scripted lift
async fn replay_lift(
    engine: &AdjudicationEngine,
    competition: &Competition,
    panel: &JudgePanel,
    athlete: &Athlete,
    lift: &LiftScript,
) -> ironjudge_engine::Result<LiftSummary> {
    let declared = engine
        .declare(DeclareRequest {
            athlete_id: athlete.id,
            competition_id: competition.id,
            session_id: panel.session_id,
            discipline: lift.discipline.clone(),
            attempt_number: None,
            weight: lift.weight,
        })
        .await?;
    let attempt_id = declared.attempt.id;
    for warning in &declared.warnings {
        warn!("{}: {}", athlete.name, warning);
    }
    if let Some(weight) = lift.change_to {
        engine.change_weight(attempt_id, weight).await?;
    }

    if lift.pass {
        let attempt = engine.void(attempt_id, "athlete passed").await?;
        return Ok(summarize(athlete, &attempt, Vec::new()));
    }

    engine.open(attempt_id).await?;
    for (judge, call) in panel.judges.iter().zip(&lift.votes) {
        if let Some(decision) = call {
            engine.submit_vote(attempt_id, *judge, *decision).await?;
        }
    }

    // Not every judge voted: time is called and the expiry policy applies
    if engine.attempt(attempt_id).await?.state == AttemptState::InProgress {
        debug!("Calling time on attempt {}", attempt_id);
        engine.expire_timer(competition.id).await?;
    }

    let attempt = engine.attempt(attempt_id).await?;
    if attempt.state != AttemptState::Judged {
        return Ok(summarize(athlete, &attempt, Vec::new()));
    }

    let outcome = engine.finalize(attempt_id).await?;
    let records = outcome
        .records
        .iter()
        .filter_map(|check| check.entry.as_ref())
        .map(|entry| format!("{} record {} kg ({})", entry.key.record_type, entry.value, entry.key))
        .collect();
    Ok(summarize(athlete, &outcome.attempt, records))
}

fn summarize(athlete: &Athlete, attempt: &Attempt, records: Vec<String>) -> LiftSummary {
    LiftSummary {
        athlete: athlete.name.clone(),
        discipline: attempt.discipline.clone(),
        attempt_number: attempt.attempt_number,
        weight: attempt.actual_weight,
        state: attempt.state,
        decision: attempt.decision,
        records,
    }
}

fn athlete_by_key<'a>(athletes: &'a HashMap<String, Athlete>, key: &str) -> Result<&'a Athlete> {
    match athletes.get(key) {
        Some(athlete) => Ok(athlete),
        None => bail!("unknown athlete key {:?}", key),
    }
}

/// Imported keys plus every key the meet's lifters could have set
fn record_keys_for(
    competition: &Competition,
    athletes: &HashMap<String, Athlete>,
    mut keys: Vec<RecordKey>,
) -> Vec<RecordKey> {
    let mut disciplines = competition.sport.disciplines();
    disciplines.extend(competition.strongman_events.iter().map(|e| e.discipline.clone()));
    disciplines.push(Discipline::Total);

    for athlete in athletes.values() {
        for record_type in &competition.record_types {
            for discipline in &disciplines {
                keys.push(RecordKey {
                    sport: competition.sport,
                    discipline: discipline.clone(),
                    category: athlete.category.clone(),
                    weight_class: athlete.weight_class.clone(),
                    record_type: *record_type,
                });
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    keys.retain(|key| seen.insert(key.clone()));
    keys
}

/// Drain the event bus so it always has a subscriber; optionally echo events
fn spawn_event_logger(bus: &EventBus, echo: bool) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if echo {
                        match serde_json::to_string(&event) {
                            Ok(line) => eprintln!("{}", line),
                            Err(e) => warn!("Failed to serialize {}: {}", event.event_type(), e),
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
