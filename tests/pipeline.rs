use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use reqwest::StatusCode;
use rusqlite::Connection;
use serde_json::{Value, json};
use tempfile::TempDir;

use gamelog_sync::error::SourceError;
use gamelog_sync::orchestrator::{EntityKind, Orchestrator, PeriodOutcome, Subject};
use gamelog_sync::payload::{Split, parse_game_log_json};
use gamelog_sync::pipeline::{StageStatus, SyncPipeline};
use gamelog_sync::record::Cell;
use gamelog_sync::schema::{TABLES, TEAM_GAME_LOGS, create_tables};
use gamelog_sync::source::{GameLogQuery, GameLogSource};
use gamelog_sync::store::{SqliteStore, Store};

/// Serves canned bodies keyed by the query's display string. Unscripted
/// queries answer with an empty `stats` list.
#[derive(Default)]
struct ScriptedSource {
    responses: HashMap<String, Option<String>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedSource {
    fn respond(mut self, query: &str, body: impl Into<String>) -> Self {
        self.responses.insert(query.to_string(), Some(body.into()));
        self
    }

    fn fail(mut self, query: &str) -> Self {
        self.responses.insert(query.to_string(), None);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl GameLogSource for ScriptedSource {
    fn fetch_game_log(&self, query: &GameLogQuery<'_>) -> Result<Vec<Split>, SourceError> {
        let target = query.to_string();
        self.calls.borrow_mut().push(target.clone());
        match self.responses.get(&target) {
            Some(Some(body)) => parse_game_log_json(body),
            Some(None) => Err(SourceError::Status {
                target,
                status: StatusCode::SERVICE_UNAVAILABLE,
            }),
            None => parse_game_log_json(r#"{"stats": []}"#),
        }
    }
}

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn game_log(splits: Vec<Value>) -> String {
    json!({ "stats": [{ "splits": splits }] }).to_string()
}

fn split(game_pk: i64, team: &str, opponent: &str, is_home: bool, stat: Value) -> Value {
    json!({
        "team": { "name": team },
        "opponent": { "name": opponent },
        "isHome": is_home,
        "game": { "gamePk": game_pk, "officialDate": "2023-06-01" },
        "stat": stat,
    })
}

fn subject() -> Subject {
    Subject {
        player_id: 677951,
        team_id: 118,
        team_name: "Kansas City Royals".to_string(),
    }
}

fn provisioned_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(&dir.path().join("logs.sqlite")).expect("open store");
    create_tables(&store).expect("create tables");
    (dir, store)
}

fn count(store: &SqliteStore, table: &str) -> i64 {
    let conn = Connection::open(store.path()).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

fn team_source() -> ScriptedSource {
    ScriptedSource::default()
        .respond("player 677951 hitting log 2023", read_fixture("player_game_log.json"))
        .respond("team 118 hitting log 2023", read_fixture("team_game_log.json"))
        .respond(
            "Minnesota Twins offense log 2023",
            game_log(vec![
                split(718780, "Minnesota Twins", "Kansas City Royals", false, json!({"hits": 8, "ops": ".790"})),
                split(718766, "Minnesota Twins", "Kansas City Royals", false, json!({"hits": 3})),
                split(718999, "Minnesota Twins", "Detroit Tigers", true, json!({"hits": 12})),
            ]),
        )
        .fail("Oakland Athletics offense log 2023")
        .respond(
            "Minnesota Twins defense log 2023",
            read_fixture("opponent_defense_game_log.json"),
        )
        .respond(
            "Oakland Athletics defense log 2023",
            game_log(vec![split(718700, "Oakland Athletics", "Kansas City Royals", true, json!({"errors": 1}))]),
        )
}

#[test]
fn empty_period_is_skipped_and_next_period_collected() {
    let (_dir, store) = provisioned_store();
    let source = ScriptedSource::default()
        .respond("player 677951 hitting log 2022", read_fixture("empty_stats.json"))
        .respond("player 677951 hitting log 2023", read_fixture("player_game_log.json"));
    let orchestrator = Orchestrator::new(&source, &store, subject());

    let collected = orchestrator.collect(EntityKind::Player, &[2022, 2023]).unwrap();

    assert_eq!(collected.records.len(), 2);
    assert_eq!(collected.periods[0].outcome, PeriodOutcome::Empty);
    assert_eq!(collected.periods[1].outcome, PeriodOutcome::Accumulated(2));
}

#[test]
fn failed_and_malformed_periods_are_skipped() {
    let (_dir, store) = provisioned_store();
    let source = ScriptedSource::default()
        .fail("team 118 hitting log 2021")
        .respond("team 118 hitting log 2022", read_fixture("missing_game.json"))
        .respond("team 118 hitting log 2023", read_fixture("team_game_log.json"));
    let orchestrator = Orchestrator::new(&source, &store, subject());

    let collected = orchestrator.collect(EntityKind::Team, &[2021, 2022, 2023]).unwrap();

    assert!(matches!(collected.periods[0].outcome, PeriodOutcome::Failed(_)));
    assert!(matches!(collected.periods[1].outcome, PeriodOutcome::Failed(_)));
    assert_eq!(collected.periods[2].outcome, PeriodOutcome::Accumulated(3));
    assert_eq!(collected.records.len(), 3);
    assert_eq!(source.calls().len(), 3);
}

#[test]
fn opponent_stage_without_team_rows_is_empty() {
    let (_dir, store) = provisioned_store();
    let source = ScriptedSource::default();
    let orchestrator = Orchestrator::new(&source, &store, subject());

    let collected = orchestrator.collect(EntityKind::OpponentOffense, &[2023]).unwrap();

    assert!(collected.records.is_empty());
    assert_eq!(collected.periods[0].outcome, PeriodOutcome::Empty);
    assert!(source.calls().is_empty());
}

#[test]
fn full_run_populates_every_table() {
    let (_dir, store) = provisioned_store();
    let source = team_source();
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()));

    let summary = pipeline.run(&[2023]).unwrap();

    for stage in &summary.stages {
        assert_eq!(stage.status, StageStatus::Synced, "{}", stage.kind);
    }
    assert_eq!(count(&store, "player_game_logs"), 2);
    assert_eq!(count(&store, "team_game_logs"), 3);
    // Every split of each opponent's season log; the Athletics offense fetch failed.
    assert_eq!(count(&store, "opponent_offense_game_logs"), 3);
    assert_eq!(count(&store, "opponent_defense_game_logs"), 3);
    assert_eq!(summary.rows_upserted(), 11);

    // Each opponent is fetched once per period, after the team stage ran.
    let calls = source.calls();
    assert_eq!(
        calls,
        vec![
            "player 677951 hitting log 2023",
            "team 118 hitting log 2023",
            "Minnesota Twins offense log 2023",
            "Oakland Athletics offense log 2023",
            "Minnesota Twins defense log 2023",
            "Oakland Athletics defense log 2023",
        ]
    );

    let conn = Connection::open(store.path()).unwrap();
    let (home_away, era): (String, Option<f64>) = conn
        .query_row(
            "SELECT home_away, era FROM opponent_defense_game_logs WHERE game_id = 718780",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(home_away, "home");
    assert_eq!(era, Some(0.0));
    let season: i64 = conn
        .query_row(
            "SELECT season FROM opponent_offense_game_logs WHERE game_id = 718780",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(season, 2023);

    // Twins game against a third team is kept as well.
    let hits: i64 = conn
        .query_row(
            "SELECT h FROM opponent_offense_game_logs WHERE game_id = 718999 AND team = 'Minnesota Twins'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(hits, 12);
}

#[test]
fn opponents_come_only_from_the_subject_teams_rows() {
    let (_dir, store) = provisioned_store();
    let conn = Connection::open(store.path()).unwrap();
    conn.execute_batch(
        "INSERT INTO team_game_logs (game_id, team, season, opponent)
         VALUES (718780, 'Kansas City Royals', 2023, 'Minnesota Twins'),
                (718780, 'Minnesota Twins', 2023, 'Kansas City Royals'),
                (718555, 'Minnesota Twins', 2023, 'Cleveland Guardians'),
                (718001, 'Kansas City Royals', 2022, 'Oakland Athletics');",
    )
    .unwrap();
    let source = ScriptedSource::default();
    let orchestrator = Orchestrator::new(&source, &store, subject());

    orchestrator.collect(EntityKind::OpponentOffense, &[2023]).unwrap();

    assert_eq!(source.calls(), vec!["Minnesota Twins offense log 2023"]);
}

#[test]
fn rerunning_the_pipeline_changes_nothing() {
    let (_dir, store) = provisioned_store();
    let source = team_source();
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()));

    pipeline.run(&[2023]).unwrap();
    let before = TABLES.iter().map(|t| count(&store, t.name)).collect::<Vec<_>>();
    pipeline.run(&[2023]).unwrap();
    let after = TABLES.iter().map(|t| count(&store, t.name)).collect::<Vec<_>>();

    assert_eq!(before, after);
}

#[test]
fn colliding_keys_across_seasons_keep_the_later_season() {
    let (_dir, store) = provisioned_store();
    let body = read_fixture("player_game_log.json");
    let source = ScriptedSource::default()
        .respond("player 677951 hitting log 2022", body.clone())
        .respond("player 677951 hitting log 2023", body);
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()))
        .with_stages(&[EntityKind::Player]);

    let summary = pipeline.run(&[2022, 2023]).unwrap();

    let stage = summary.stage(EntityKind::Player).unwrap();
    assert_eq!(stage.records_collected, 4);
    assert_eq!(stage.rows_upserted, 2);
    let pairs = store
        .distinct_pairs("player_game_logs", ("team", "game_id"), &[("season", &Cell::Integer(2023))])
        .unwrap();
    assert_eq!(pairs.len(), 2);
}

#[test]
fn stages_run_in_declared_order() {
    let (_dir, store) = provisioned_store();
    let source = ScriptedSource::default();
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()))
        .with_stages(&[EntityKind::OpponentDefense, EntityKind::Team]);

    assert_eq!(pipeline.stages(), &[EntityKind::Team, EntityKind::OpponentDefense]);

    let summary = pipeline.run(&[2023]).unwrap();
    assert_eq!(summary.stages.len(), 2);
    assert!(
        summary
            .stages
            .iter()
            .all(|s| s.status == StageStatus::NothingToWrite)
    );
}

#[test]
fn failed_team_stage_blocks_opponent_stages() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("logs.sqlite")).unwrap();
    for table in TABLES.iter().filter(|t| t.name != TEAM_GAME_LOGS.name) {
        store.execute_batch(&table.create_sql()).unwrap();
    }
    let source = team_source();
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()));

    let summary = pipeline.run(&[2023]).unwrap();

    assert_eq!(summary.stage(EntityKind::Player).unwrap().status, StageStatus::Synced);
    assert!(matches!(
        summary.stage(EntityKind::Team).unwrap().status,
        StageStatus::Failed(_)
    ));
    for kind in [EntityKind::OpponentOffense, EntityKind::OpponentDefense] {
        assert_eq!(
            summary.stage(kind).unwrap().status,
            StageStatus::Blocked {
                on: EntityKind::Team
            }
        );
    }
    assert_eq!(summary.failed_stages(), 3);
    assert!(!source.calls().iter().any(|c| c.contains("offense") || c.contains("defense")));
}

#[test]
fn unreachable_store_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::at(&dir.path().join("missing").join("logs.sqlite"));
    let source = team_source();
    let pipeline = SyncPipeline::new(Orchestrator::new(&source, &store, subject()));

    let err = pipeline.run(&[2023]).unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(source.calls(), vec!["player 677951 hitting log 2023"]);
}
