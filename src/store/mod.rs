// src/store/mod.rs
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::schema::{Column, ColumnType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("no table named `{0}`")]
    UnknownTable(String),
    #[error("row has {got} fields, table `{table}` has {want} columns")]
    FieldCount {
        table: String,
        want: usize,
        got: usize,
    },
    #[error("value `{value}` does not fit {ty} column `{column}`")]
    Reject {
        value: String,
        column: String,
        ty: &'static str,
    },
}

/// The local relational store backing one ingestion target: a SQLite
/// database plus the column definitions of every table created through it.
///
/// The store is owned exclusively by one load operation at a time; callers
/// serialize access rather than sharing a handle across in-flight loads.
pub struct SqliteStore {
    conn: Connection,
    tables: HashMap<String, Vec<Column>>,
}

impl SqliteStore {
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(SqliteStore {
            conn: Connection::open_in_memory()?,
            tables: HashMap::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(SqliteStore {
            conn: Connection::open(path)?,
            tables: HashMap::new(),
        })
    }

    /// Column definitions of a table created through this store, in
    /// positional order.
    pub fn columns(&self, table: &str) -> Option<&[Column]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn drop_table_if_exists(&mut self, table: &str) -> Result<(), StoreError> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)), [])?;
        self.tables.remove(table);
        Ok(())
    }

    pub fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<(), StoreError> {
        let defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE {} ({})", quote_ident(table), defs);
        debug!(table, columns = columns.len(), "create table");
        self.conn.execute(&sql, [])?;
        self.tables.insert(table.to_string(), columns.to_vec());
        Ok(())
    }

    /// Insert one row, positionally mapped against the table's columns.
    ///
    /// Values are coerced explicitly rather than left to SQLite's affinity
    /// rules: an INTEGER column only accepts values parsing as i64, a REAL
    /// column values parsing as f64, and the empty string binds NULL in any
    /// column. Anything else is rejected with an error scoped to this row.
    pub fn insert_row(&self, table: &str, values: &[String]) -> Result<(), StoreError> {
        let columns = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        if values.len() != columns.len() {
            return Err(StoreError::FieldCount {
                table: table.to_string(),
                want: columns.len(),
                got: values.len(),
            });
        }

        let bound = columns
            .iter()
            .zip(values)
            .map(|(col, raw)| coerce(col, raw))
            .collect::<Result<Vec<Value>, StoreError>>()?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(table),
            placeholders
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(bound))?;
        Ok(())
    }

    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Serialize the whole database to bytes via SQLite's backup API. This
    /// is the payload a background ingestion hands back on completion.
    pub fn export_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let tmp = tempfile::NamedTempFile::new()?;
        let mut dst = Connection::open(tmp.path())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dst)?;
        backup.run_to_completion(64, Duration::from_millis(0), None)?;
        drop(backup);
        dst.close().map_err(|(_, err)| StoreError::Sql(err))?;
        Ok(std::fs::read(tmp.path())?)
    }
}

fn coerce(column: &Column, raw: &str) -> Result<Value, StoreError> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(Value::Null);
    }
    match column.ty {
        ColumnType::Integer => value.parse::<i64>().map(Value::Integer).map_err(|_| reject(column, raw)),
        ColumnType::Real => value.parse::<f64>().map(Value::Real).map_err(|_| reject(column, raw)),
        ColumnType::Text => Ok(Value::Text(raw.to_string())),
    }
}

fn reject(column: &Column, raw: &str) -> StoreError {
    StoreError::Reject {
        value: raw.to_string(),
        column: column.name.clone(),
        ty: column.ty.sql(),
    }
}

/// Double-quote an identifier so header names and table names pass through
/// verbatim, including dots, spaces and reserved words.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
