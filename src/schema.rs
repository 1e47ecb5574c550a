//! Table descriptors for the four game log tables.
//!
//! The descriptors drive the DDL and supply the unique key used as the upsert
//! conflict target. Records are projected onto the live table's columns, not
//! onto these lists, so a provisioned table with extra columns still works.

use crate::error::StoreError;
use crate::store::{Store, quote_ident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub required: bool,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            required: false,
        }
    }

    pub const fn required(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            required: true,
        }
    }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub unique_key: &'static [&'static str],
}

impl TableSchema {
    pub fn column_set(&self) -> ColumnSet {
        ColumnSet::new(self.columns.iter().map(|c| c.name))
    }

    pub fn unique_key(&self) -> UniqueKey {
        UniqueKey::new(self.unique_key.iter().copied())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn create_sql(&self) -> String {
        let mut defs = self
            .columns
            .iter()
            .map(|c| {
                let not_null = if c.required { " NOT NULL" } else { "" };
                format!("    {} {}{}", quote_ident(c.name), c.sql_type.as_sql(), not_null)
            })
            .collect::<Vec<_>>();
        let key = self
            .unique_key
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        defs.push(format!("    UNIQUE ({key})"));

        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            quote_ident(self.name),
            defs.join(",\n")
        );
        if self.has_column("season") {
            sql.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {} ON {}(season);",
                quote_ident(&format!("idx_{}_season", self.name)),
                quote_ident(self.name)
            ));
        }
        sql
    }
}

const GAME_KEY: &[&str] = &["game_id", "team"];

pub static PLAYER_GAME_LOGS: TableSchema = TableSchema {
    name: "player_game_logs",
    columns: &[
        Column::required("game_id", SqlType::Integer),
        Column::new("date", SqlType::Text),
        Column::required("team", SqlType::Text),
        Column::new("season", SqlType::Integer),
        Column::new("opponent", SqlType::Text),
        Column::new("home_away", SqlType::Text),
        Column::new("ab", SqlType::Integer),
        Column::new("h", SqlType::Integer),
        Column::new("tb", SqlType::Integer),
        Column::new("sb", SqlType::Integer),
        Column::new("cs", SqlType::Integer),
        Column::new("bb", SqlType::Integer),
        Column::new("so", SqlType::Integer),
        Column::new("rbi", SqlType::Integer),
        Column::new("ops", SqlType::Text),
    ],
    unique_key: GAME_KEY,
};

pub static TEAM_GAME_LOGS: TableSchema = TableSchema {
    name: "team_game_logs",
    columns: &[
        Column::required("game_id", SqlType::Integer),
        Column::new("date", SqlType::Text),
        Column::required("team", SqlType::Text),
        Column::new("season", SqlType::Integer),
        Column::new("opponent", SqlType::Text),
        Column::new("home_away", SqlType::Text),
        Column::new("ab", SqlType::Integer),
        Column::new("h", SqlType::Integer),
        Column::new("tb", SqlType::Integer),
        Column::new("sb", SqlType::Integer),
        Column::new("cs", SqlType::Integer),
        Column::new("bb", SqlType::Integer),
        Column::new("so", SqlType::Integer),
        Column::new("rbi", SqlType::Integer),
        Column::new("ops", SqlType::Text),
    ],
    unique_key: GAME_KEY,
};

// Season-scoped, but keyed on (game_id, team) only: a colliding pair from a
// later season overwrites the earlier row.
pub static OPPONENT_OFFENSE_GAME_LOGS: TableSchema = TableSchema {
    name: "opponent_offense_game_logs",
    columns: &[
        Column::required("game_id", SqlType::Integer),
        Column::new("date", SqlType::Text),
        Column::required("team", SqlType::Text),
        Column::new("season", SqlType::Integer),
        Column::new("home_away", SqlType::Text),
        Column::new("ab", SqlType::Integer),
        Column::new("h", SqlType::Integer),
        Column::new("tb", SqlType::Integer),
        Column::new("sb", SqlType::Integer),
        Column::new("cs", SqlType::Integer),
        Column::new("bb", SqlType::Integer),
        Column::new("so", SqlType::Integer),
        Column::new("rbi", SqlType::Integer),
        Column::new("ops", SqlType::Text),
    ],
    unique_key: GAME_KEY,
};

pub static OPPONENT_DEFENSE_GAME_LOGS: TableSchema = TableSchema {
    name: "opponent_defense_game_logs",
    columns: &[
        Column::required("game_id", SqlType::Integer),
        Column::new("date", SqlType::Text),
        Column::required("team", SqlType::Text),
        Column::new("season", SqlType::Integer),
        Column::new("home_away", SqlType::Text),
        Column::new("era", SqlType::Real),
        Column::new("whip", SqlType::Real),
        Column::new("opponent_obp", SqlType::Real),
        Column::new("opponent_slg", SqlType::Real),
        Column::new("cs_percentage", SqlType::Real),
        Column::new("errors", SqlType::Integer),
    ],
    unique_key: GAME_KEY,
};

pub static TABLES: &[&TableSchema] = &[
    &PLAYER_GAME_LOGS,
    &TEAM_GAME_LOGS,
    &OPPONENT_OFFENSE_GAME_LOGS,
    &OPPONENT_DEFENSE_GAME_LOGS,
];

pub fn table(name: &str) -> Option<&'static TableSchema> {
    TABLES.iter().copied().find(|t| t.name == name)
}

/// Unique key registered for `table_name`.
pub fn resolve_key(table_name: &str) -> Result<UniqueKey, StoreError> {
    table(table_name)
        .map(TableSchema::unique_key)
        .ok_or_else(|| StoreError::schema_mismatch(table_name, "no unique key registered"))
}

/// Create every game log table that does not exist yet.
pub fn create_tables<S: Store + ?Sized>(store: &S) -> Result<(), StoreError> {
    let ddl = TABLES
        .iter()
        .map(|t| t.create_sql())
        .collect::<Vec<_>>()
        .join("\n");
    store.execute_batch(&ddl)
}

/// Ordered column names a destination table accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSet(Vec<String>);

impl ColumnSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered column names whose combined value is unique within a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey(Vec<String>);

impl UniqueKey {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|c| c == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
