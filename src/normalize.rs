//! Flatten game log splits into records.
//!
//! Every stat column is resolved through a [`StatField`] entry that names its
//! source key and what to store when the key is absent, so a sparse `stat`
//! block never fails a split. A split without game metadata does.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::payload::Split;
use crate::record::{Cell, Record};

/// How the source's `isHome` flag maps onto the stored `home_away` label.
///
/// The hitting game logs report `isHome` from the logged team's side, so
/// `Direct` stores it as-is. The opponent defense log has always been
/// recorded with the flag flipped (`isHome == true` stored as `"away"`);
/// that table keeps `Inverted` so existing rows stay comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeAwayPolarity {
    Direct,
    Inverted,
}

impl HomeAwayPolarity {
    pub fn label(self, is_home: bool) -> &'static str {
        let home = match self {
            HomeAwayPolarity::Direct => is_home,
            HomeAwayPolarity::Inverted => !is_home,
        };
        if home { "home" } else { "away" }
    }
}

/// Storage type of a stat column, which also fixes its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatValue {
    /// Integer, `0` when absent.
    Count,
    /// Real, null when absent or not a finite number.
    Rate,
    /// Verbatim text, null when absent.
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct StatField {
    pub column: &'static str,
    pub source_key: &'static str,
    pub value: StatValue,
}

impl StatField {
    pub const fn count(column: &'static str, source_key: &'static str) -> Self {
        Self {
            column,
            source_key,
            value: StatValue::Count,
        }
    }

    pub const fn rate(column: &'static str, source_key: &'static str) -> Self {
        Self {
            column,
            source_key,
            value: StatValue::Rate,
        }
    }

    pub const fn text(column: &'static str, source_key: &'static str) -> Self {
        Self {
            column,
            source_key,
            value: StatValue::Text,
        }
    }

    pub fn default_cell(&self) -> Cell {
        match self.value {
            StatValue::Count => Cell::Integer(0),
            StatValue::Rate | StatValue::Text => Cell::Null,
        }
    }

    pub fn resolve(&self, stat: Option<&Map<String, Value>>) -> Cell {
        let Some(raw) = stat.and_then(|s| s.get(self.source_key)) else {
            return self.default_cell();
        };
        let cell = match self.value {
            StatValue::Count => as_i64_any(raw).map(Cell::Integer),
            StatValue::Rate => as_f64_any(raw).map(Cell::Real),
            StatValue::Text => as_text(raw).map(Cell::Text),
        };
        cell.unwrap_or_else(|| self.default_cell())
    }
}

pub const OFFENSE_STATS: &[StatField] = &[
    StatField::count("ab", "atBats"),
    StatField::count("h", "hits"),
    StatField::count("tb", "totalBases"),
    StatField::count("sb", "stolenBases"),
    StatField::count("cs", "caughtStealing"),
    StatField::count("bb", "baseOnBalls"),
    StatField::count("so", "strikeOuts"),
    StatField::count("rbi", "rbi"),
    StatField::text("ops", "ops"),
];

pub const DEFENSE_STATS: &[StatField] = &[
    StatField::rate("era", "earnedRunAverage"),
    StatField::rate("whip", "whip"),
    StatField::rate("opponent_obp", "obp"),
    StatField::rate("opponent_slg", "slg"),
    StatField::rate("cs_percentage", "caughtStealingPercent"),
    StatField::count("errors", "errors"),
];

/// Where the `team` column comes from.
#[derive(Debug, Clone, Copy)]
pub enum TeamSource<'a> {
    /// `split.team.name`, required.
    Split,
    /// Always the given name; used when the log was requested for that team.
    Fixed(&'a str),
}

impl TeamSource<'_> {
    fn resolve(&self, split: &Split) -> Option<String> {
        match self {
            TeamSource::Split => split.team.as_ref().and_then(|t| t.name.clone()),
            TeamSource::Fixed(name) => Some(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping<'a> {
    pub stats: &'static [StatField],
    pub polarity: HomeAwayPolarity,
    pub team: TeamSource<'a>,
    pub season: Option<i32>,
}

pub fn normalize(splits: &[Split], mapping: &FieldMapping<'_>) -> Result<Vec<Record>, NormalizeError> {
    splits
        .iter()
        .enumerate()
        .map(|(index, split)| normalize_split(index, split, mapping))
        .collect()
}

fn normalize_split(
    index: usize,
    split: &Split,
    mapping: &FieldMapping<'_>,
) -> Result<Record, NormalizeError> {
    let game = split.game.as_ref().ok_or(NormalizeError::MissingField {
        index,
        field: "game",
    })?;
    let game_id = game.game_pk.ok_or(NormalizeError::MissingField {
        index,
        field: "game.gamePk",
    })?;
    let team = mapping
        .team
        .resolve(split)
        .ok_or(NormalizeError::MissingField {
            index,
            field: "team.name",
        })?;

    let date = game
        .official_date
        .as_deref()
        .or(game.date.as_deref())
        .or(split.date.as_deref())
        .and_then(normalize_date);
    let opponent = split.opponent.as_ref().and_then(|o| o.name.clone());
    let home_away = mapping.polarity.label(split.is_home.unwrap_or(false));

    let mut record = Record::new()
        .with("game_id", game_id)
        .with("date", date)
        .with("team", team)
        .with("season", mapping.season.map(i64::from))
        .with("opponent", opponent)
        .with("home_away", home_away);

    let stat = split.stat.as_ref();
    for field in mapping.stats {
        record.set(field.column, field.resolve(stat));
    }
    Ok(record)
}

/// `YYYY-MM-DD` from either a bare date or an RFC 3339 timestamp.
fn normalize_date(raw: &str) -> Option<String> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(n) = v.as_f64() {
        return Some(n as i64);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_f64_any(v: &Value) -> Option<f64> {
    let n = match v.as_f64() {
        Some(n) => n,
        None => v.as_str()?.trim().parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
