//! Storage layer
//!
//! - [`schema`]: table schemas derived from record metadata
//! - [`dialect`]: the contract a concrete SQL database implements
//! - [`backend`]: statement generation and batched execution with reconnects
//! - [`sqlite`]: the SQLite dialect

pub mod backend;
pub mod dialect;
pub mod schema;
pub mod sqlite;

pub use backend::{SqlBackend, database_set_value};
pub use dialect::{Dialect, TRANSIENT_SOCKET_CODES, is_transient_error};
pub use schema::{Constraint, TableSchema};
pub use sqlite::SqliteDialect;

use crate::Result;
use crate::query::Filter;
use crate::record::Record;
use crate::report::RecordOutcome;

/// Physical operations the object database delegates to.
///
/// Batch operations return one outcome per input record, in input order.
/// Per-record failures are outcomes; an `Err` means the whole call failed.
pub trait Backend: Send + Sync {
    /// Verify the physical table of `schema`, creating or extending it.
    fn check_or_create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Insert records. Successful records become persisted and clean.
    fn add_objects(&self, schema: &TableSchema, records: &mut [&mut dyn Record]) -> Result<Vec<RecordOutcome>>;

    /// Update records by primary key. Successful records become persisted and clean.
    fn save_objects(&self, schema: &TableSchema, records: &mut [&mut dyn Record]) -> Result<Vec<RecordOutcome>>;

    /// One result list per filter, in filter order.
    fn select_objects(&self, schema: &TableSchema, filters: &[Filter]) -> Result<Vec<Vec<Box<dyn Record>>>>;
}
