use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params, params_from_iter};

use crate::error::StoreError;
use crate::record::Cell;
use crate::schema::ColumnSet;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Relational store the sync writes into.
///
/// Implementations acquire whatever connection they need per call and
/// release it before returning; nothing is held between calls.
pub trait Store {
    /// Run one or more DDL statements.
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError>;

    /// Run `statements` inside one transaction, returning rows changed. Either
    /// every statement lands or none does.
    fn execute_in_transaction(&self, statements: &[Statement]) -> Result<usize, StoreError>;

    /// Column names of `table` in declaration order; empty if it does not exist.
    fn table_columns(&self, table: &str) -> Result<ColumnSet, StoreError>;

    /// Distinct `(first, second)` pairs of `table` matching every
    /// `column = value` in `filters`.
    fn distinct_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        filters: &[(&str, &Cell)],
    ) -> Result<Vec<(Cell, Cell)>, StoreError>;
}

/// One parameterized statement of a transactional write.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Cell>,
}

impl<T: Store + ?Sized> Store for &T {
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        (**self).execute_batch(sql)
    }

    fn execute_in_transaction(&self, statements: &[Statement]) -> Result<usize, StoreError> {
        (**self).execute_in_transaction(statements)
    }

    fn table_columns(&self, table: &str) -> Result<ColumnSet, StoreError> {
        (**self).table_columns(table)
    }

    fn distinct_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        filters: &[(&str, &Cell)],
    ) -> Result<Vec<(Cell, Cell)>, StoreError> {
        (**self).distinct_pairs(table, columns, filters)
    }
}

/// SQLite file store. Opens a fresh connection for every operation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Create the parent directory if needed and check the file can be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self::at(path);
        store.connect()?;
        Ok(store)
    }

    /// Point at `path` without touching the filesystem.
    pub fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path).map_err(|source| self.unavailable(source))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| self.unavailable(source))?;
        Ok(conn)
    }

    fn unavailable(&self, source: rusqlite::Error) -> StoreError {
        StoreError::Unavailable {
            target: self.path.display().to_string(),
            source,
        }
    }
}

impl Store for SqliteStore {
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn execute_in_transaction(&self, statements: &[Statement]) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        for statement in statements {
            let mut stmt = tx.prepare_cached(&statement.sql)?;
            changed += stmt.execute(params_from_iter(statement.params.iter()))?;
        }
        tx.commit()?;
        Ok(changed)
    }

    fn table_columns(&self, table: &str) -> Result<ColumnSet, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ColumnSet::new(names))
    }

    fn distinct_pairs(
        &self,
        table: &str,
        columns: (&str, &str),
        filters: &[(&str, &Cell)],
    ) -> Result<Vec<(Cell, Cell)>, StoreError> {
        let conn = self.connect()?;
        let predicate = if filters.is_empty() {
            String::new()
        } else {
            let terms = filters
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
                .collect::<Vec<_>>();
            format!(" WHERE {}", terms.join(" AND "))
        };
        let sql = format!(
            "SELECT DISTINCT {first}, {second} FROM {table}{predicate} ORDER BY {first}, {second}",
            first = quote_ident(columns.0),
            second = quote_ident(columns.1),
            table = quote_ident(table),
        );
        let mut stmt = conn.prepare(&sql)?;
        let pairs = stmt
            .query_map(params_from_iter(filters.iter().map(|(_, value)| *value)), |row| {
                Ok((row.get::<_, Cell>(0)?, row.get::<_, Cell>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::from(rusqlite::types::Null),
            Cell::Integer(n) => ToSqlOutput::from(*n),
            Cell::Real(n) => ToSqlOutput::from(*n),
            Cell::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Cell {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(n) => Cell::Integer(n),
            ValueRef::Real(n) => Cell::Real(n),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Cell::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        })
    }
}
