use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SourceError;

/// Top level of a `stats=gameLog` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameLogResponse {
    #[serde(default)]
    pub stats: Option<Vec<StatGroup>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatGroup {
    #[serde(default)]
    pub splits: Option<Vec<Split>>,
}

/// One per-game entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Split {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "isHome", default)]
    pub is_home: Option<bool>,
    #[serde(default)]
    pub game: Option<GameMeta>,
    #[serde(default)]
    pub team: Option<TeamRef>,
    #[serde(default)]
    pub opponent: Option<TeamRef>,
    #[serde(default)]
    pub stat: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameMeta {
    #[serde(rename = "gamePk", default)]
    pub game_pk: Option<i64>,
    #[serde(rename = "officialDate", default)]
    pub official_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GameLogResponse {
    /// Splits of the first stat group. Missing or empty `stats` means no data.
    pub fn into_splits(self) -> Vec<Split> {
        self.stats
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|group| group.splits)
            .unwrap_or_default()
    }
}

pub fn parse_game_log_json(raw: &str) -> Result<Vec<Split>, SourceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let response: GameLogResponse = serde_json::from_str(trimmed)?;
    Ok(response.into_splits())
}

#[cfg(test)]
mod tests {
    use super::parse_game_log_json;

    #[test]
    fn empty_and_missing_stats_are_no_data() {
        assert!(parse_game_log_json(r#"{"stats": []}"#).unwrap().is_empty());
        assert!(parse_game_log_json(r#"{"copyright": "x"}"#).unwrap().is_empty());
        assert!(parse_game_log_json(r#"{"stats": null}"#).unwrap().is_empty());
        assert!(parse_game_log_json("null").unwrap().is_empty());
        assert!(parse_game_log_json("  ").unwrap().is_empty());
    }

    #[test]
    fn only_first_group_is_read() {
        let raw = r#"{"stats": [
            {"splits": [{"game": {"gamePk": 1}}]},
            {"splits": [{"game": {"gamePk": 2}}, {"game": {"gamePk": 3}}]}
        ]}"#;
        let splits = parse_game_log_json(raw).unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].game.as_ref().and_then(|g| g.game_pk), Some(1));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_game_log_json("<html>").is_err());
    }
}
