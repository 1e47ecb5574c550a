use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, Local};

use crate::http_client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::orchestrator::Subject;
use crate::source::MLB_API_BASE;

const CACHE_DIR: &str = "gamelog_sync";
const DB_FILE: &str = "game_logs.sqlite";

pub const DEFAULT_PLAYER_ID: u32 = 677951;
pub const DEFAULT_TEAM_ID: u32 = 118;
pub const DEFAULT_TEAM_NAME: &str = "Kansas City Royals";
pub const FIRST_SEASON: i32 = 2022;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub db_path: Option<PathBuf>,
    pub api_base: String,
    pub player_id: u32,
    pub team_id: u32,
    pub team_name: String,
    pub seasons: Vec<i32>,
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Read from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), Local::now().year())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, current_year: i32) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let seasons = var("GAMELOG_SEASONS")
            .map(|raw| parse_seasons(&raw))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_seasons(current_year));
        let timeout_secs = var("GAMELOG_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
            .max(1);

        Self {
            db_path: var("GAMELOG_DB_PATH").map(|v| PathBuf::from(v.trim())),
            api_base: var("MLB_API_BASE").unwrap_or_else(|| MLB_API_BASE.to_string()),
            player_id: var("GAMELOG_PLAYER_ID")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_PLAYER_ID),
            team_id: var("GAMELOG_TEAM_ID")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_TEAM_ID),
            team_name: var("GAMELOG_TEAM_NAME").unwrap_or_else(|| DEFAULT_TEAM_NAME.to_string()),
            seasons,
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn subject(&self) -> Subject {
        Subject {
            player_id: self.player_id,
            team_id: self.team_id,
            team_name: self.team_name.clone(),
        }
    }

    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path.clone().or_else(default_db_path)
    }
}

/// Every completed season from [`FIRST_SEASON`]; the current one is excluded.
pub fn default_seasons(current_year: i32) -> Vec<i32> {
    (FIRST_SEASON..current_year).collect()
}

/// Accepts `2022,2023`, `2022 2023` and ranges like `2022-2024`. Output is
/// deduplicated in first-seen order.
pub fn parse_seasons(raw: &str) -> Vec<i32> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in raw.split([',', ';', ' ']).map(str::trim).filter(|p| !p.is_empty()) {
        let years = match part.split_once('-') {
            Some((from, to)) => match (from.trim().parse::<i32>(), to.trim().parse::<i32>()) {
                (Ok(from), Ok(to)) if from <= to => (from..=to).collect::<Vec<_>>(),
                _ => continue,
            },
            None => match part.parse::<i32>() {
                Ok(year) => vec![year],
                Err(_) => continue,
            },
        };
        for year in years {
            if year > 0 && seen.insert(year) {
                out.push(year);
            }
        }
    }
    out
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}
