//! Statement generation and batched execution over a [`Dialect`]

use super::Backend;
use super::dialect::Dialect;
use super::schema::TableSchema;
use crate::binding::FieldBinding;
use crate::config::{DatabaseConfig, RetryPolicy};
use crate::id::{IdGenerator, UuidGenerator};
use crate::query::{Filter, QueryParameter};
use crate::record::Record;
use crate::report::{FailureKind, RecordOutcome};
use crate::value::Value;
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Affected-row sentinel for an item rejected on a constraint.
const CONSTRAINT_SENTINEL: i64 = -1;

/// SQL backend: builds statements from table schemas and runs them in
/// batches, one prepared execution per record, on one connection per batch.
pub struct SqlBackend<D: Dialect> {
    dialect: D,
    retry: RetryPolicy,
    id_generator: Box<dyn IdGenerator>,
    slow_query_threshold: Duration,
}

impl<D: Dialect> SqlBackend<D> {
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            retry: RetryPolicy::default(),
            id_generator: Box::new(UuidGenerator),
            slow_query_threshold: Duration::from_millis(500),
        }
    }

    pub fn from_config(dialect: D, config: &DatabaseConfig) -> Self {
        Self::new(dialect)
            .with_retry(config.retry.clone())
            .with_slow_query_threshold(config.slow_query_threshold())
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn quote(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn placeholder(&self, column: &str) -> String {
        self.dialect.parameter_name(column)
    }

    fn parameters(&self, columns: &[&FieldBinding], record: &dyn Record) -> Vec<D::Param> {
        columns
            .iter()
            .map(|column| {
                let parameter = QueryParameter::new(
                    self.placeholder(column.column()),
                    column.get_value(record),
                    column.value_type(),
                );
                self.dialect.convert_parameter(&parameter)
            })
            .collect()
    }

    /// `SELECT <every column> FROM <table>`
    pub fn select_expression(&self, schema: &TableSchema) -> String {
        let columns: Vec<String> = schema.fields().iter().map(|f| self.quote(f.column())).collect();
        format!("SELECT {} FROM {}", columns.join(", "), self.quote(schema.table_name()))
    }

    /// Run `execute` for every item of a batch on one connection.
    ///
    /// A dropped connection is closed and reopened, and the batch resumes at the
    /// failing item. With `classify_constraints`, constraint violations record
    /// `on_constraint` for the item and the batch continues. Any other error
    /// aborts the batch.
    fn run_batch<T>(
        &self,
        statement: &str,
        count: usize,
        classify_constraints: bool,
        mut execute: impl FnMut(&mut D::Connection, usize) -> std::result::Result<T, D::Error>,
        on_constraint: impl Fn() -> T,
    ) -> Result<Vec<T>> {
        debug!(dialect = self.dialect.name(), statement, count, "executing batch");

        let mut results: Vec<T> = Vec::with_capacity(count);
        let mut attempts: u32 = 0;
        let start = Instant::now();

        loop {
            let resumed_at = results.len();
            let outcome = self.dialect.open().and_then(|mut connection| {
                let mut outcome = Ok(());
                for index in results.len()..count {
                    match execute(&mut connection, index) {
                        Ok(value) => results.push(value),
                        Err(e) if classify_constraints && self.dialect.is_constraint_violation(&e) => {
                            error!(statement, index, error = %e, "constraint violation");
                            results.push(on_constraint());
                        }
                        Err(e) => {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
                self.dialect.close(connection);
                outcome
            });

            let e = match outcome {
                Ok(()) => break,
                Err(e) => e,
            };

            if !self.dialect.is_transient(&e) {
                error!(statement, error = %e, "unhandled error in batch");
                return Err(Error::Backend(Box::new(e)));
            }

            if results.len() > resumed_at {
                attempts = 0;
            }
            attempts += 1;
            if self.retry.is_exhausted(attempts) {
                error!(statement, attempts, error = %e, "giving up on dropped connection");
                return Err(Error::RetriesExhausted {
                    attempts,
                    source: Box::new(e),
                });
            }

            let delay = self.retry.backoff(attempts);
            warn!(
                statement,
                attempts,
                resume_at = results.len(),
                error = %e,
                "connection dropped, reconnecting in {:?}",
                delay
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }

        let elapsed = start.elapsed();
        debug!(statement, elapsed_ms = elapsed.as_millis() as u64, "batch finished");
        if elapsed > self.slow_query_threshold {
            warn!(statement, elapsed_ms = elapsed.as_millis() as u64, "slow batch");
        }
        Ok(results)
    }

    /// Execute a non-query once per parameter set.
    ///
    /// Constraint violations yield `-1` for that item.
    pub fn execute_batch(&self, sql: &str, parameter_sets: &[Vec<QueryParameter>]) -> Result<Vec<i64>> {
        let params: Vec<Vec<D::Param>> = parameter_sets
            .iter()
            .map(|set| set.iter().map(|p| self.dialect.convert_parameter(p)).collect())
            .collect();
        self.run_batch(
            sql,
            params.len(),
            true,
            |connection, index| self.dialect.execute(connection, sql, &params[index]),
            || CONSTRAINT_SENTINEL,
        )
    }

    /// Select with a raw `WHERE` suffix, once per parameter set.
    pub fn select_objects_raw(
        &self,
        schema: &TableSchema,
        where_clause: &str,
        parameter_sets: &[Vec<QueryParameter>],
    ) -> Result<Vec<Vec<Box<dyn Record>>>> {
        let sql = format!("{} {}", self.select_expression(schema), where_clause.trim());
        let params: Vec<Vec<D::Param>> = parameter_sets
            .iter()
            .map(|set| set.iter().map(|p| self.dialect.convert_parameter(p)).collect())
            .collect();
        let rows = self.run_batch(
            &sql,
            params.len(),
            false,
            |connection, index| self.dialect.query(connection, &sql, &params[index]),
            Vec::new,
        )?;
        Ok(rows.into_iter().map(|rows| materialize(schema, rows)).collect())
    }

    /// Row count of a table.
    pub fn count_rows(&self, schema: &TableSchema) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.quote(schema.table_name()));
        let rows = self.run_batch(
            &sql,
            1,
            false,
            |connection, _| self.dialect.query(connection, &sql, &[]),
            Vec::new,
        )?;
        let count = rows
            .into_iter()
            .flatten()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|value| value.extract::<i64>())
            .transpose()?;
        Ok(count.unwrap_or(0))
    }
}

impl<D: Dialect> Backend for SqlBackend<D> {
    fn check_or_create_table(&self, schema: &TableSchema) -> Result<()> {
        let statement = format!("check table {}", schema.table_name());
        self.run_batch(
            &statement,
            1,
            false,
            |connection, _| self.dialect.check_or_create_table(connection, schema),
            || (),
        )?;
        Ok(())
    }

    fn add_objects(&self, schema: &TableSchema, records: &mut [&mut dyn Record]) -> Result<Vec<RecordOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let columns: Vec<&FieldBinding> = schema.fields().iter().filter(|f| !f.is_auto_increment()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(schema.table_name()),
            columns.iter().map(|c| self.quote(c.column())).collect::<Vec<_>>().join(", "),
            columns.iter().map(|c| self.placeholder(c.column())).collect::<Vec<_>>().join(", ")
        );

        for record in records.iter_mut() {
            if record.state().id().is_empty() {
                record.state_mut().set_id(self.id_generator.generate());
            }
        }

        let params: Vec<Vec<D::Param>> = records.iter().map(|r| self.parameters(&columns, &**r)).collect();

        if let Some(key) = schema.auto_increment_key() {
            let ids = self.run_batch(
                &sql,
                params.len(),
                true,
                |connection, index| self.dialect.execute_returning_id(connection, &sql, &params[index]),
                || CONSTRAINT_SENTINEL,
            )?;

            let outcomes = records
                .iter_mut()
                .zip(ids)
                .map(|(record, id)| {
                    if id > 0 {
                        database_set_value(schema.table_name(), &mut **record, key, Value::I64(id));
                        let state = record.state_mut();
                        state.set_id(id.to_string());
                        state.mark_persisted();
                        Ok(())
                    } else {
                        error!(table = schema.table_name(), record = %&**record, sql = %sql, "error adding record, no generated key");
                        Err(if id < 0 {
                            FailureKind::ConstraintViolation
                        } else {
                            FailureKind::InvalidGeneratedId
                        })
                    }
                })
                .collect();
            return Ok(outcomes);
        }

        let affected = self.run_batch(
            &sql,
            params.len(),
            true,
            |connection, index| self.dialect.execute(connection, &sql, &params[index]),
            || CONSTRAINT_SENTINEL,
        )?;

        Ok(records
            .iter_mut()
            .zip(affected)
            .map(|(record, affected)| {
                if affected > 0 {
                    record.state_mut().mark_persisted();
                    Ok(())
                } else {
                    error!(table = schema.table_name(), record = %&**record, sql = %sql, "error adding record");
                    Err(if affected < 0 {
                        FailureKind::ConstraintViolation
                    } else {
                        FailureKind::NoRowsAffected
                    })
                }
            })
            .collect())
    }

    fn save_objects(&self, schema: &TableSchema, records: &mut [&mut dyn Record]) -> Result<Vec<RecordOutcome>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let primary = schema.primary_keys();
        if primary.is_empty() {
            return Err(Error::MissingPrimaryKey(schema.table_name().to_string()));
        }
        let columns: Vec<&FieldBinding> = schema
            .fields()
            .iter()
            .filter(|f| !f.is_primary_key() && !f.is_read_only())
            .collect();

        let assignments = |bindings: &[&FieldBinding]| -> Vec<String> {
            bindings
                .iter()
                .map(|c| format!("{} = {}", self.quote(c.column()), self.placeholder(c.column())))
                .collect()
        };
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote(schema.table_name()),
            assignments(&columns).join(", "),
            assignments(&primary).join(" AND ")
        );

        let bound: Vec<&FieldBinding> = columns.iter().chain(primary.iter()).copied().collect();
        let params: Vec<Vec<D::Param>> = records.iter().map(|r| self.parameters(&bound, &**r)).collect();

        let affected = self.run_batch(
            &sql,
            params.len(),
            true,
            |connection, index| self.dialect.execute(connection, &sql, &params[index]),
            || CONSTRAINT_SENTINEL,
        )?;

        Ok(records
            .iter_mut()
            .zip(affected)
            .map(|(record, affected)| {
                if affected > 0 {
                    let state = record.state_mut();
                    state.set_dirty(false);
                    state.set_persisted(true);
                    Ok(())
                } else if affected < 0 {
                    error!(table = schema.table_name(), record = %&**record, sql = %sql, "error saving record, constraint failed?");
                    Err(FailureKind::ConstraintViolation)
                } else {
                    error!(table = schema.table_name(), record = %&**record, sql = %sql, "error saving record, key value changed?");
                    Err(FailureKind::NoRowsAffected)
                }
            })
            .collect())
    }

    fn select_objects(&self, schema: &TableSchema, filters: &[Filter]) -> Result<Vec<Vec<Box<dyn Record>>>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let base = self.select_expression(schema);
        let statements: Vec<(String, Vec<D::Param>)> = filters
            .iter()
            .map(|filter| {
                let rendered = filter.render(|n| self.quote(n), |n| self.placeholder(n));
                let params = rendered
                    .parameters
                    .iter()
                    .map(|p| self.dialect.convert_parameter(p))
                    .collect();
                (format!("{}{}", base, rendered.text), params)
            })
            .collect();

        let rows = self.run_batch(
            &base,
            statements.len(),
            false,
            |connection, index| {
                let (sql, params) = &statements[index];
                self.dialect.query(connection, sql, params)
            },
            Vec::new,
        )?;
        Ok(rows.into_iter().map(|rows| materialize(schema, rows)).collect())
    }
}

/// Build one persisted, clean record per row. Columns follow `schema.fields()`.
fn materialize(schema: &TableSchema, rows: Vec<Vec<Value>>) -> Vec<Box<dyn Record>> {
    let primary = schema.primary_key();
    rows.into_iter()
        .map(|row| {
            let mut record = schema.create_record();
            for (field, value) in schema.fields().iter().zip(row) {
                database_set_value(schema.table_name(), &mut *record, field, value);
            }
            if let Some(key) = primary {
                let id = key.get_value(&*record);
                if !id.is_null() {
                    record.state_mut().set_id(id.to_string());
                }
            }
            record.state_mut().mark_persisted();
            record
        })
        .collect()
}

/// Assign a database value to a bound field.
///
/// Null leaves the field untouched. A value that does not convert to the
/// field's type is logged and also leaves the field untouched.
pub fn database_set_value(table: &str, record: &mut dyn Record, field: &FieldBinding, value: Value) {
    if value.is_null() {
        return;
    }

    let converted = match value.convert(field.value_type()) {
        Ok(converted) => converted,
        Err(e) => {
            error!(table, column = field.column(), error = %e, "value does not fit the column type");
            return;
        }
    };

    if let Err(e) = field.set_value(record, converted) {
        error!(table, column = field.column(), error = %e, "could not assign column value");
    }
}
