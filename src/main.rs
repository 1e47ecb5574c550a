use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use tracing::info;

use gamelog_sync::config::{SyncConfig, parse_seasons};
use gamelog_sync::http_client::http_client;
use gamelog_sync::logging::init_tracing;
use gamelog_sync::orchestrator::{EntityKind, Orchestrator, PeriodOutcome};
use gamelog_sync::pipeline::{StageStatus, SyncPipeline, SyncSummary};
use gamelog_sync::schema::create_tables;
use gamelog_sync::source::HttpSource;
use gamelog_sync::store::SqliteStore;

/// Fetch MLB game logs and upsert them into SQLite.
///
/// Every option can also be set through the environment (or a `.env` file);
/// flags win over the environment.
#[derive(Debug, Parser)]
#[command(name = "gamelog_sync", version)]
struct Args {
    /// SQLite file to write into [env: GAMELOG_DB_PATH]
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seasons to sync, e.g. `2022-2024` or `2023,2024` [env: GAMELOG_SEASONS]
    #[arg(long)]
    seasons: Option<String>,

    /// [env: GAMELOG_PLAYER_ID]
    #[arg(long)]
    player_id: Option<u32>,

    /// [env: GAMELOG_TEAM_ID]
    #[arg(long)]
    team_id: Option<u32>,

    /// Name stored for team logs when the source omits it [env: GAMELOG_TEAM_NAME]
    #[arg(long)]
    team_name: Option<String>,

    /// [env: MLB_API_BASE]
    #[arg(long)]
    api_base: Option<String>,

    /// Per-request timeout [env: GAMELOG_HTTP_TIMEOUT_SECS]
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not create missing tables before syncing
    #[arg(long)]
    skip_schema: bool,

    /// Only run these stages (repeatable); declared order is kept
    #[arg(long, value_enum)]
    only: Vec<Stage>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Stage {
    Player,
    Team,
    OpponentOffense,
    OpponentDefense,
}

impl From<Stage> for EntityKind {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Player => EntityKind::Player,
            Stage::Team => EntityKind::Team,
            Stage::OpponentOffense => EntityKind::OpponentOffense,
            Stage::OpponentDefense => EntityKind::OpponentDefense,
        }
    }
}

impl Args {
    fn apply(&self, config: &mut SyncConfig) -> Result<()> {
        if let Some(db) = &self.db {
            config.db_path = Some(db.clone());
        }
        if let Some(raw) = &self.seasons {
            let seasons = parse_seasons(raw);
            if seasons.is_empty() {
                return Err(anyhow!("no valid seasons in `{raw}`"));
            }
            config.seasons = seasons;
        }
        if let Some(id) = self.player_id {
            config.player_id = id;
        }
        if let Some(id) = self.team_id {
            config.team_id = id;
        }
        if let Some(name) = &self.team_name {
            config.team_name = name.clone();
        }
        if let Some(base) = &self.api_base {
            config.api_base = base.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("info")?;

    let args = Args::parse();
    let mut config = SyncConfig::from_env();
    args.apply(&mut config)?;
    if config.seasons.is_empty() {
        return Err(anyhow!("no seasons to sync"));
    }

    let db_path = config
        .resolved_db_path()
        .context("unable to resolve sqlite path")?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    if !args.skip_schema {
        create_tables(&store).context("create game log tables")?;
    }

    let source = HttpSource::new(http_client(config.request_timeout)?, &config.api_base);
    let mut pipeline = SyncPipeline::new(Orchestrator::new(source, store, config.subject()));
    if !args.only.is_empty() {
        let stages = args.only.iter().copied().map(EntityKind::from).collect::<Vec<_>>();
        pipeline = pipeline.with_stages(&stages);
    }

    info!(
        seasons = ?config.seasons,
        stages = ?pipeline.stages(),
        db = %db_path.display(),
        "starting sync"
    );
    let summary = pipeline.run(&config.seasons).context("sync aborted")?;
    print_summary(&db_path, &config.seasons, &summary);

    let failed = summary.failed_stages();
    if failed > 0 {
        return Err(anyhow!("{failed} stage(s) did not complete"));
    }
    Ok(())
}

fn print_summary(db_path: &Path, seasons: &[i32], summary: &SyncSummary) {
    println!("Game log sync complete");
    println!("DB: {}", db_path.display());
    println!("Seasons: {seasons:?}");
    println!("Rows upserted: {}", summary.rows_upserted());

    for stage in &summary.stages {
        let status = match &stage.status {
            StageStatus::Synced => "synced".to_string(),
            StageStatus::NothingToWrite => "nothing to write".to_string(),
            StageStatus::Blocked { on } => format!("blocked ({on} stage failed)"),
            StageStatus::Failed(err) => format!("failed: {}", brief(err)),
        };
        println!(
            "{} -> {}: periods {}/{} records={} upserted={} [{}]",
            stage.kind,
            stage.table,
            stage.periods_succeeded(),
            stage.periods.len(),
            stage.records_collected,
            stage.rows_upserted,
            status
        );
        for period in &stage.periods {
            if let PeriodOutcome::Failed(reason) = &period.outcome {
                println!("   - {}: {}", period.season, brief(reason));
            }
        }
    }
}

/// First line of `reason`, cut to a width that fits a summary row.
fn brief(reason: &str) -> String {
    const MAX_CHARS: usize = 200;
    let line = reason.lines().next().unwrap_or_default();
    if line.chars().count() <= MAX_CHARS {
        return line.to_string();
    }
    let cut = line.chars().take(MAX_CHARS).collect::<String>();
    format!("{cut}...")
}
