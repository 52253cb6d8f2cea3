pub mod filter;
pub mod patches;
pub mod queries;
mod tags;
mod tasks;
mod timestamps;

pub use filter::{FilterMode, FilterSelection};
pub use tasks::{ExportRow, Rollover, TaskRow};
pub use timestamps::EventType;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, ToSql, params, params_from_iter};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task name already exists: {0}")]
    TaskNameExists(String),
    #[error("Tag name already exists: {0}")]
    TagNameExists(String),
    #[error("Task not found: {0}")]
    TaskNotFound(i64),
    #[error("Name must not be empty")]
    EmptyName,
    #[error("The default tag cannot be deleted")]
    DefaultTagProtected,
    #[error("Unknown column `{column}` for table `{table}`")]
    UnknownColumn { table: &'static str, column: String },
    #[error("Invalid filter mode: {0}. Expected AND or OR")]
    InvalidFilterMode(String),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A row returned by the generic accessors, one value per selected column.
pub type Record = Vec<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Tasks,
    Activity,
    TasksTags,
    Timestamps,
    Tags,
    Options,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Activity => "activity",
            Self::TasksTags => "tasks_tags",
            Self::Timestamps => "timestamps",
            Self::Tags => "tags",
            Self::Options => "options",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Tasks => &["id", "name", "description", "creation_date"],
            Self::Activity => &["date", "task_id", "spent_time"],
            Self::TasksTags => &["task_id", "tag_id"],
            Self::Timestamps => &["timestamp", "task_id", "event_type", "datetime", "comment"],
            Self::Tags => &["id", "name"],
            Self::Options => &["name", "value"],
        }
    }

    /// Maps a caller supplied column name onto the schema, so that only known
    /// identifiers are ever spliced into SQL text.
    fn column(self, column: &str) -> StoreResult<&'static str> {
        if column == "rowid" {
            return Ok("rowid");
        }

        self.columns()
            .iter()
            .find(|known| **known == column)
            .copied()
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name(),
                column: column.to_string(),
            })
    }

    fn column_list(self, columns: &[&str]) -> StoreResult<String> {
        if columns.is_empty() {
            return Ok(self.columns().join(", "));
        }

        columns
            .iter()
            .map(|column| self.column(column))
            .collect::<StoreResult<Vec<_>>>()
            .map(|checked| checked.join(", "))
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        let report = database
            .init_schema()
            .with_context(|| format!("Failed to initialize schema: {}", path.display()))?;
        debug!(
            from = ?report.from_version,
            to = report.to_version,
            applied = ?report.applied,
            skipped = report.skipped_statements,
            "schema ready"
        );

        Ok(database)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite DB")?;
        let database = Self { conn };
        database
            .init_schema()
            .context("Failed to initialize in-memory schema")?;

        Ok(database)
    }

    /// Creates the tables on first run, then brings the schema up to the latest patch.
    pub fn init_schema(&self) -> StoreResult<patches::PatchReport> {
        let exists: i64 = self
            .conn
            .query_row(queries::TASKS_TABLE_EXISTS, [], |row| row.get(0))?;

        if exists == 0 {
            debug!("creating schema");
            queries::schema_statements()
                .iter()
                .try_for_each(|statement| self.conn.execute_batch(statement))?;
            self.conn
                .execute(queries::SEED_VERSION, params![env!("CARGO_PKG_VERSION")])?;
        }

        patches::apply_patches(&self.conn, patches::PATCHES)
    }

    pub fn patch_version(&self) -> StoreResult<Option<i64>> {
        patches::stored_version(&self.conn)
    }

    /// Returns `search` columns of `table` for rows where `field = value`.
    /// An empty `search` selects every column.
    pub fn find_by_clause(
        &self,
        table: Table,
        field: &str,
        value: &dyn ToSql,
        search: &[&str],
        order: Option<&str>,
    ) -> StoreResult<Vec<Record>> {
        let field = table.column(field)?;
        let order_by = order
            .map(|column| table.column(column).map(|column| format!(" ORDER BY {column}")))
            .transpose()?
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {} WHERE {field} = ?1{order_by}",
            table.column_list(search)?,
            table.name()
        );

        self.records(&sql, params![value])
    }

    pub fn find_all(&self, table: Table, sort_field: Option<&str>) -> StoreResult<Vec<Record>> {
        let order_by = sort_field
            .map(|column| table.column(column).map(|column| format!(" ORDER BY {column} ASC")))
            .transpose()?
            .unwrap_or_default();
        let sql = format!(
            "SELECT {} FROM {}{order_by}",
            table.column_list(&[])?,
            table.name()
        );

        self.records(&sql, [])
    }

    /// Inserts one row and returns its rowid.
    pub fn insert(&self, table: Table, fields: &[&str], values: &[&dyn ToSql]) -> StoreResult<i64> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.name(),
            table.column_list(fields)?,
            queries::placeholders(values.len())
        );

        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update(
        &self,
        table: Table,
        field: &str,
        value: &dyn ToSql,
        where_field: &str,
        where_value: &dyn ToSql,
    ) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            table.name(),
            table.column(field)?,
            table.column(where_field)?
        );

        Ok(self.conn.execute(&sql, params![value, where_value])?)
    }

    /// Deletes rows matching every `column IN (values)` clause. A clause with
    /// no values matches nothing; no clauses at all clears the table.
    pub fn delete(&self, table: Table, clauses: &[(&str, &[Value])]) -> StoreResult<usize> {
        if clauses.iter().any(|(_, values)| values.is_empty()) {
            return Ok(0);
        }

        let conditions = clauses
            .iter()
            .map(|(column, values)| {
                table
                    .column(column)
                    .map(|column| format!("{column} IN {}", queries::placeholders(values.len())))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!("DELETE FROM {}{where_clause}", table.name());
        let values = clauses.iter().flat_map(|(_, values)| values.iter());

        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    pub fn option(&self, name: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                params![name],
                |row| row.get::<_, Value>(0),
            )
            .optional()?;

        Ok(value.and_then(value_to_string))
    }

    pub fn set_option(&self, name: &str, value: &str) -> StoreResult<()> {
        self.conn
            .execute(queries::UPSERT_OPTION, params![name, value])?;
        Ok(())
    }

    pub fn options(&self) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .find_all(Table::Options, Some("name"))?
            .into_iter()
            .filter_map(|record| {
                let mut values = record.into_iter();
                let name = values.next().and_then(value_to_string)?;
                let value = values.next().and_then(value_to_string).unwrap_or_default();
                Some((name, value))
            })
            .collect())
    }

    fn records<P: rusqlite::Params>(&self, sql: &str, params: P) -> StoreResult<Vec<Record>> {
        let mut statement = self.conn.prepare(sql)?;
        let width = statement.column_count();

        let rows = statement
            .query_map(params, |row| {
                (0..width)
                    .map(|index| row.get::<_, Value>(index))
                    .collect::<rusqlite::Result<Record>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

/// Renders a stored value as text. The options table has NUMERIC affinity, so
/// values written as text may come back as integers.
pub fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(number) => Some(number.to_string()),
        Value::Real(number) => Some(number.to_string()),
        Value::Text(text) => Some(text),
        Value::Blob(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
