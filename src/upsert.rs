use indexmap::IndexMap;
use tracing::debug;

use crate::error::StoreError;
use crate::record::{Cell, Record};
use crate::schema::UniqueKey;
use crate::store::{Statement, Store, quote_ident};

/// Bound on `?` placeholders in one SQLite statement.
pub const MAX_VARIABLES_PER_STATEMENT: usize = 32766;

/// Insert `records` into `table`, overwriting the non-key columns of any row
/// that already holds the same `key`. Returns the number of rows written.
///
/// All records must share one column set. Large batches are split into as many
/// statements as [`MAX_VARIABLES_PER_STATEMENT`] requires, all run in one
/// transaction, so the batch lands completely or not at all. An empty batch
/// returns before anything is sent to the store.
pub fn upsert<S: Store + ?Sized>(
    store: &S,
    records: &[Record],
    table: &str,
    key: &UniqueKey,
) -> Result<usize, StoreError> {
    let Some(first) = records.first() else {
        return Ok(0);
    };
    if key.is_empty() {
        return Err(StoreError::schema_mismatch(table, "empty unique key"));
    }

    let columns = first.columns().map(str::to_string).collect::<Vec<_>>();
    if let Some(missing) = key.iter().find(|k| !first.contains(k)) {
        return Err(StoreError::schema_mismatch(
            table,
            format!("key column `{missing}` not present in records"),
        ));
    }
    for (idx, record) in records.iter().enumerate().skip(1) {
        if record.len() != columns.len() || columns.iter().any(|c| !record.contains(c)) {
            return Err(StoreError::schema_mismatch(
                table,
                format!("record {idx} does not share the batch column set"),
            ));
        }
    }

    let table_columns = store.table_columns(table)?;
    if table_columns.is_empty() {
        return Err(StoreError::schema_mismatch(table, "table does not exist"));
    }
    let unknown = columns
        .iter()
        .filter(|c| !table_columns.contains(c))
        .cloned()
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        return Err(StoreError::schema_mismatch(
            table,
            format!("unknown columns: {}", unknown.join(", ")),
        ));
    }

    let rows_per_statement = (MAX_VARIABLES_PER_STATEMENT / columns.len()).max(1);
    let statements = records
        .chunks(rows_per_statement)
        .map(|chunk| {
            let mut params = Vec::with_capacity(columns.len() * chunk.len());
            for record in chunk {
                for column in &columns {
                    params.push(record.get(column).cloned().unwrap_or(Cell::Null));
                }
            }
            Statement {
                sql: build_upsert_sql(table, &columns, key, chunk.len()),
                params,
            }
        })
        .collect::<Vec<_>>();

    let written = store.execute_in_transaction(&statements)?;
    debug!(
        table,
        rows = records.len(),
        statements = statements.len(),
        written,
        "upsert applied"
    );
    Ok(written)
}

/// Multi-row `INSERT ... ON CONFLICT (key) DO UPDATE` over `columns`.
///
/// Every non-key column is overwritten with the incoming value. A batch made
/// of key columns only becomes `DO NOTHING`.
pub fn build_upsert_sql(table: &str, columns: &[String], key: &UniqueKey, rows: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![placeholders.as_str(); rows].join(", ");
    let conflict = key.iter().map(quote_ident).collect::<Vec<_>>().join(", ");

    let updates = columns
        .iter()
        .filter(|c| !key.contains(c))
        .map(|c| {
            let ident = quote_ident(c);
            format!("{ident} = excluded.{ident}")
        })
        .collect::<Vec<_>>();
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({column_list}) VALUES {values} ON CONFLICT ({conflict}) {action}",
        quote_ident(table)
    )
}

/// Collapse records sharing a key value into the last one seen, keeping the
/// position of the first occurrence.
pub fn dedup_by_key(records: Vec<Record>, key: &UniqueKey) -> Vec<Record> {
    let mut by_key: IndexMap<Vec<Cell>, Record> = IndexMap::with_capacity(records.len());
    for record in records {
        by_key.insert(record.key_values(key), record);
    }
    by_key.into_values().collect()
}
