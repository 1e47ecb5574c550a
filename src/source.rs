use std::fmt;

use reqwest::blocking::Client;

use crate::error::SourceError;
use crate::payload::{Split, parse_game_log_json};

pub const MLB_API_BASE: &str = "https://statsapi.mlb.com/api/v1";

/// One game log request: a subject and a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameLogQuery<'a> {
    Player { player_id: u32, season: i32 },
    Team { team_id: u32, season: i32 },
    OpponentOffense { team: &'a str, season: i32 },
    OpponentDefense { team: &'a str, season: i32 },
}

impl GameLogQuery<'_> {
    pub fn season(&self) -> i32 {
        match *self {
            GameLogQuery::Player { season, .. }
            | GameLogQuery::Team { season, .. }
            | GameLogQuery::OpponentOffense { season, .. }
            | GameLogQuery::OpponentDefense { season, .. } => season,
        }
    }

    /// Path relative to the API base and its query parameters.
    pub fn endpoint(&self) -> (String, Vec<(&'static str, String)>) {
        let season = self.season().to_string();
        match *self {
            GameLogQuery::Player { player_id, .. } => (
                format!("people/{player_id}/stats"),
                vec![
                    ("stats", "gameLog".to_string()),
                    ("group", "hitting".to_string()),
                    ("season", season),
                ],
            ),
            GameLogQuery::Team { team_id, .. } => (
                format!("teams/{team_id}/stats"),
                vec![
                    ("stats", "gameLog".to_string()),
                    ("group", "hitting".to_string()),
                    ("season", season),
                ],
            ),
            GameLogQuery::OpponentOffense { team, .. } => (
                "teams/stats".to_string(),
                vec![
                    ("team", team.to_string()),
                    ("group", "hitting".to_string()),
                    ("stats", "gameLog".to_string()),
                    ("season", season),
                ],
            ),
            GameLogQuery::OpponentDefense { team, .. } => (
                "teams/stats".to_string(),
                vec![
                    ("team", team.to_string()),
                    ("group", "pitching,fielding".to_string()),
                    ("stats", "gameLog".to_string()),
                    ("season", season),
                ],
            ),
        }
    }
}

impl fmt::Display for GameLogQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameLogQuery::Player { player_id, season } => {
                write!(f, "player {player_id} hitting log {season}")
            }
            GameLogQuery::Team { team_id, season } => {
                write!(f, "team {team_id} hitting log {season}")
            }
            GameLogQuery::OpponentOffense { team, season } => {
                write!(f, "{team} offense log {season}")
            }
            GameLogQuery::OpponentDefense { team, season } => {
                write!(f, "{team} defense log {season}")
            }
        }
    }
}

/// Where game logs come from. An empty vec means the source had no data.
pub trait GameLogSource {
    fn fetch_game_log(&self, query: &GameLogQuery<'_>) -> Result<Vec<Split>, SourceError>;
}

impl<T: GameLogSource + ?Sized> GameLogSource for &T {
    fn fetch_game_log(&self, query: &GameLogQuery<'_>) -> Result<Vec<Split>, SourceError> {
        (**self).fetch_game_log(query)
    }
}

/// Blocking HTTP source for the MLB Stats API.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, query: &GameLogQuery<'_>) -> String {
        let (path, _) = query.endpoint();
        format!("{}/{}", self.base_url, path)
    }
}

impl GameLogSource for HttpSource {
    fn fetch_game_log(&self, query: &GameLogQuery<'_>) -> Result<Vec<Split>, SourceError> {
        let (_, params) = query.endpoint();
        let target = query.to_string();
        let unavailable = |source| SourceError::Unavailable {
            target: target.clone(),
            source,
        };

        let resp = self
            .client
            .get(self.url_for(query))
            .query(&params)
            .send()
            .map_err(unavailable)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                target: target.clone(),
                status,
            });
        }
        let body = resp.text().map_err(unavailable)?;
        parse_game_log_json(&body)
    }
}
