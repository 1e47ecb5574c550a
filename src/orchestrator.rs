use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{SourceError, StoreError};
use crate::normalize::{
    DEFENSE_STATS, FieldMapping, HomeAwayPolarity, OFFENSE_STATS, StatField, TeamSource, normalize,
};
use crate::payload::Split;
use crate::record::{Cell, Record};
use crate::schema::{
    OPPONENT_DEFENSE_GAME_LOGS, OPPONENT_OFFENSE_GAME_LOGS, PLAYER_GAME_LOGS, TEAM_GAME_LOGS,
    TableSchema,
};
use crate::source::{GameLogQuery, GameLogSource};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player,
    Team,
    OpponentOffense,
    OpponentDefense,
}

impl EntityKind {
    /// Every kind, in the order the pipeline runs them.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Player,
        EntityKind::Team,
        EntityKind::OpponentOffense,
        EntityKind::OpponentDefense,
    ];

    pub fn table(self) -> &'static TableSchema {
        match self {
            EntityKind::Player => &PLAYER_GAME_LOGS,
            EntityKind::Team => &TEAM_GAME_LOGS,
            EntityKind::OpponentOffense => &OPPONENT_OFFENSE_GAME_LOGS,
            EntityKind::OpponentDefense => &OPPONENT_DEFENSE_GAME_LOGS,
        }
    }

    pub fn stats(self) -> &'static [StatField] {
        match self {
            EntityKind::OpponentDefense => DEFENSE_STATS,
            _ => OFFENSE_STATS,
        }
    }

    pub fn polarity(self) -> HomeAwayPolarity {
        match self {
            EntityKind::OpponentDefense => HomeAwayPolarity::Inverted,
            _ => HomeAwayPolarity::Direct,
        }
    }

    /// Stage whose table this kind reads before fetching.
    pub fn depends_on(self) -> Option<EntityKind> {
        match self {
            EntityKind::OpponentOffense | EntityKind::OpponentDefense => Some(EntityKind::Team),
            EntityKind::Player | EntityKind::Team => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Team => "team",
            EntityKind::OpponentOffense => "opponent offense",
            EntityKind::OpponentDefense => "opponent defense",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Who the primary logs are fetched for.
#[derive(Debug, Clone)]
pub struct Subject {
    pub player_id: u32,
    pub team_id: u32,
    pub team_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeriodOutcome {
    Accumulated(usize),
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub season: i32,
    pub outcome: PeriodOutcome,
}

impl PeriodReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, PeriodOutcome::Accumulated(_))
    }
}

/// Records gathered for one entity kind across all periods.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: Vec<Record>,
    pub periods: Vec<PeriodReport>,
}

/// Fetches and normalizes game logs period by period.
///
/// A failing or empty period is logged and skipped; only store errors from
/// the opponent lookup escape.
pub struct Orchestrator<S, D> {
    source: S,
    store: D,
    subject: Subject,
}

impl<S: GameLogSource, D: Store> Orchestrator<S, D> {
    pub fn new(source: S, store: D, subject: Subject) -> Self {
        Self {
            source,
            store,
            subject,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn collect(&self, kind: EntityKind, periods: &[i32]) -> Result<Collection, StoreError> {
        let mut out = Collection::default();
        for &season in periods {
            let (records, outcome) = match kind {
                EntityKind::Player | EntityKind::Team => self.collect_primary(kind, season),
                EntityKind::OpponentOffense | EntityKind::OpponentDefense => {
                    self.collect_opponents(kind, season)?
                }
            };
            match &outcome {
                PeriodOutcome::Accumulated(n) => {
                    info!(kind = kind.label(), season, records = n, "period collected")
                }
                PeriodOutcome::Empty => {
                    info!(kind = kind.label(), season, "no game logs for period, skipping")
                }
                PeriodOutcome::Failed(reason) => {
                    warn!(kind = kind.label(), season, %reason, "period skipped")
                }
            }
            out.records.extend(records);
            out.periods.push(PeriodReport { season, outcome });
        }
        Ok(out)
    }

    fn collect_primary(&self, kind: EntityKind, season: i32) -> (Vec<Record>, PeriodOutcome) {
        let (query, team) = match kind {
            EntityKind::Player => (
                GameLogQuery::Player {
                    player_id: self.subject.player_id,
                    season,
                },
                TeamSource::Split,
            ),
            _ => (
                GameLogQuery::Team {
                    team_id: self.subject.team_id,
                    season,
                },
                TeamSource::Fixed(&self.subject.team_name),
            ),
        };
        match self.fetch_normalized(kind, &query, team) {
            Ok(records) if records.is_empty() => (records, PeriodOutcome::Empty),
            Ok(records) => {
                let n = records.len();
                (records, PeriodOutcome::Accumulated(n))
            }
            Err(err) => (Vec::new(), PeriodOutcome::Failed(err.to_string())),
        }
    }

    fn collect_opponents(
        &self,
        kind: EntityKind,
        season: i32,
    ) -> Result<(Vec<Record>, PeriodOutcome), StoreError> {
        let opponents = self.opponent_games(season)?;
        if opponents.is_empty() {
            debug!(
                kind = kind.label(),
                season,
                table = TEAM_GAME_LOGS.name,
                "no opponents recorded for period"
            );
            return Ok((Vec::new(), PeriodOutcome::Empty));
        }

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (opponent, games) in &opponents {
            debug!(kind = kind.label(), season, %opponent, games, "fetching opponent log");
            let query = match kind {
                EntityKind::OpponentOffense => GameLogQuery::OpponentOffense {
                    team: opponent,
                    season,
                },
                _ => GameLogQuery::OpponentDefense {
                    team: opponent,
                    season,
                },
            };
            match self.fetch_normalized(kind, &query, TeamSource::Fixed(opponent)) {
                Ok(rows) => records.extend(rows),
                Err(err) => {
                    warn!(kind = kind.label(), season, %opponent, error = %err, "opponent skipped");
                    failures.push(format!("{opponent}: {err}"));
                }
            }
        }

        let outcome = if !records.is_empty() {
            PeriodOutcome::Accumulated(records.len())
        } else if failures.len() == opponents.len() {
            PeriodOutcome::Failed(failures.join("; "))
        } else {
            PeriodOutcome::Empty
        };
        Ok((records, outcome))
    }

    /// Opponents the subject team faced in `season`, with the number of
    /// games played against each. Rows other teams left in the table are ignored.
    fn opponent_games(&self, season: i32) -> Result<IndexMap<String, usize>, StoreError> {
        let season = Cell::Integer(i64::from(season));
        let team = Cell::from(self.subject.team_name.as_str());
        let pairs = self.store.distinct_pairs(
            TEAM_GAME_LOGS.name,
            ("opponent", "game_id"),
            &[("season", &season), ("team", &team)],
        )?;
        let mut out: IndexMap<String, usize> = IndexMap::new();
        for (opponent, _) in pairs {
            if let Cell::Text(opponent) = opponent {
                *out.entry(opponent).or_default() += 1;
            }
        }
        Ok(out)
    }

    fn fetch_normalized(
        &self,
        kind: EntityKind,
        query: &GameLogQuery<'_>,
        team: TeamSource<'_>,
    ) -> Result<Vec<Record>, SourceError> {
        let splits: Vec<Split> = self.source.fetch_game_log(query)?;
        let mapping = FieldMapping {
            stats: kind.stats(),
            polarity: kind.polarity(),
            team,
            season: Some(query.season()),
        };
        Ok(normalize(&splits, &mapping)?)
    }
}
