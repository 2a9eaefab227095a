//! SQLite dialect

use super::dialect::Dialect;
use super::schema::TableSchema;
use crate::Result;
use crate::binding::FieldBinding;
use crate::config::ConnectionConfig;
use crate::query::QueryParameter;
use crate::value::{Value, ValueType};
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Location {
    File(PathBuf),
    /// Shared-cache in-memory database. The keeper connection keeps it alive
    /// between batches.
    Memory { uri: String, _keeper: Mutex<Connection> },
}

/// SQLite database file or shared in-memory database.
pub struct SqliteDialect {
    location: Location,
    busy_timeout: Duration,
}

impl SqliteDialect {
    /// Database file, created on first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Private in-memory database shared by every connection of this dialect.
    pub fn in_memory() -> Result<Self> {
        let uri = format!("file:rowbind-{}?mode=memory&cache=shared", Uuid::new_v4());
        let keeper = Connection::open(&uri)?;
        Ok(Self {
            location: Location::Memory {
                uri,
                _keeper: Mutex::new(keeper),
            },
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Ok(Self::open(path)),
            None => Self::in_memory(),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Database file path, `None` in memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory { .. } => None,
        }
    }

    fn existing_columns(connection: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
        let mut stmt = connection.prepare(&format!("PRAGMA table_info(`{}`)", table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(columns.into_iter().map(|c| c.to_ascii_lowercase()).collect())
    }

    fn bind<'a>(params: &'a [(String, SqlValue)]) -> Vec<(&'a str, &'a dyn ToSql)> {
        params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

impl Dialect for SqliteDialect {
    type Connection = Connection;
    type Param = (String, SqlValue);
    type Error = rusqlite::Error;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let connection = match &self.location {
            Location::File(path) => Connection::open(path)?,
            Location::Memory { uri, .. } => Connection::open(uri)?,
        };
        connection.busy_timeout(self.busy_timeout)?;
        Ok(connection)
    }

    fn close(&self, connection: Connection) {
        if let Err((_, e)) = connection.close() {
            warn!(error = %e, "failed to close sqlite connection");
        }
    }

    fn check_or_create_table(&self, connection: &mut Connection, schema: &TableSchema) -> rusqlite::Result<()> {
        connection.execute(&create_table_statement(schema), [])?;

        let existing = Self::existing_columns(connection, schema.table_name())?;
        for field in schema.fields() {
            if existing.contains(&field.column().to_ascii_lowercase()) {
                continue;
            }
            if field.is_primary_key() {
                warn!(
                    table = schema.table_name(),
                    column = field.column(),
                    "primary key column missing from existing table, cannot be added"
                );
                continue;
            }
            connection.execute(&add_column_statement(schema, field), [])?;
            info!(table = schema.table_name(), column = field.column(), "added column");
        }

        for statement in index_statements(schema) {
            connection.execute(&statement, [])?;
        }
        Ok(())
    }

    fn convert_parameter(&self, parameter: &QueryParameter) -> (String, SqlValue) {
        let value = parameter
            .value
            .convert(parameter.value_type)
            .unwrap_or_else(|_| parameter.value.clone());
        (parameter.name.clone(), to_sql_value(value))
    }

    fn is_constraint_violation(&self, error: &rusqlite::Error) -> bool {
        error.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
    }

    fn execute(&self, connection: &mut Connection, sql: &str, params: &[(String, SqlValue)]) -> rusqlite::Result<i64> {
        let mut stmt = connection.prepare_cached(sql)?;
        let affected = stmt.execute(Self::bind(params).as_slice())?;
        Ok(affected as i64)
    }

    fn execute_returning_id(
        &self,
        connection: &mut Connection,
        sql: &str,
        params: &[(String, SqlValue)],
    ) -> rusqlite::Result<i64> {
        let affected = self.execute(connection, sql, params)?;
        if affected < 1 {
            return Ok(0);
        }
        Ok(connection.last_insert_rowid())
    }

    fn query(
        &self,
        connection: &mut Connection,
        sql: &str,
        params: &[(String, SqlValue)],
    ) -> rusqlite::Result<Vec<Vec<Value>>> {
        let mut stmt = connection.prepare_cached(sql)?;
        let column_count = stmt.column_count();
        let bound = Self::bind(params);
        let mut rows = stmt.query(bound.as_slice())?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(from_value_ref(row.get_ref(index)?));
            }
            results.push(values);
        }
        Ok(results)
    }
}

fn to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(b)),
        Value::Char(c) => SqlValue::Text(c.to_string()),
        Value::I8(v) => SqlValue::Integer(i64::from(v)),
        Value::I16(v) => SqlValue::Integer(i64::from(v)),
        Value::I32(v) => SqlValue::Integer(i64::from(v)),
        Value::I64(v) => SqlValue::Integer(v),
        Value::U8(v) => SqlValue::Integer(i64::from(v)),
        Value::U16(v) => SqlValue::Integer(i64::from(v)),
        Value::U32(v) => SqlValue::Integer(i64::from(v)),
        Value::U64(v) => i64::try_from(v)
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(v.to_string())),
        Value::F32(v) => SqlValue::Real(f64::from(v)),
        Value::F64(v) => SqlValue::Real(v),
        Value::Text(s) => SqlValue::Text(s),
        Value::Timestamp(ts) => SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        Value::Blob(bytes) => SqlValue::Blob(bytes),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::I64(i),
        ValueRef::Real(f) => Value::F64(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

fn column_type(field: &FieldBinding) -> String {
    match field.value_type() {
        ValueType::Bool
        | ValueType::I8
        | ValueType::I16
        | ValueType::I32
        | ValueType::I64
        | ValueType::U8
        | ValueType::U16
        | ValueType::U32
        | ValueType::U64 => "INTEGER".to_string(),
        ValueType::F32 | ValueType::F64 => "REAL".to_string(),
        ValueType::Char => "CHAR(1)".to_string(),
        ValueType::Text => match field.varchar() {
            Some(length) => format!("VARCHAR({})", length),
            None => "TEXT".to_string(),
        },
        ValueType::Timestamp => "DATETIME".to_string(),
        ValueType::Blob => "BLOB".to_string(),
    }
}

/// Literal used to fill a new NOT NULL column on existing rows.
fn default_literal(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::F32 | ValueType::F64 => "0.0",
        ValueType::Text | ValueType::Char => "''",
        ValueType::Timestamp => "'1970-01-01 00:00:00'",
        ValueType::Blob => "X''",
        _ => "0",
    }
}

fn column_definition(field: &FieldBinding) -> String {
    let mut definition = format!("`{}` {}", field.column(), column_type(field));
    if field.is_auto_increment() {
        definition.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    if !field.nullable() {
        definition.push_str(" NOT NULL");
    }
    definition
}

pub fn create_table_statement(schema: &TableSchema) -> String {
    let mut definitions: Vec<String> = schema.fields().iter().map(column_definition).collect();
    let keys: Vec<String> = schema
        .primary_keys()
        .iter()
        .filter(|key| !key.is_auto_increment())
        .map(|key| format!("`{}`", key.column()))
        .collect();
    if !keys.is_empty() {
        definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS `{}` (\n    {}\n)",
        schema.table_name(),
        definitions.join(",\n    ")
    )
}

fn add_column_statement(schema: &TableSchema, field: &FieldBinding) -> String {
    let mut statement = format!("ALTER TABLE `{}` ADD COLUMN {}", schema.table_name(), column_definition(field));
    if !field.nullable() {
        statement.push_str(" DEFAULT ");
        statement.push_str(default_literal(field.value_type()));
    }
    statement
}

pub fn index_statements(schema: &TableSchema) -> Vec<String> {
    let columns = |columns: &[String]| -> String {
        columns.iter().map(|c| format!("`{}`", c)).collect::<Vec<_>>().join(", ")
    };

    let unique = schema.unique_constraints().iter().map(|c| {
        format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS `{}` ON `{}` ({})",
            c.name,
            schema.table_name(),
            columns(&c.columns)
        )
    });
    let plain = schema.indexes().iter().map(|c| {
        format!(
            "CREATE INDEX IF NOT EXISTS `{}` ON `{}` ({})",
            c.name,
            schema.table_name(),
            columns(&c.columns)
        )
    });
    unique.chain(plain).collect()
}

/// Every DDL statement that creates the table of `schema`.
pub fn schema_statements(schema: &TableSchema) -> Vec<String> {
    std::iter::once(create_table_statement(schema))
        .chain(index_statements(schema))
        .collect()
}
