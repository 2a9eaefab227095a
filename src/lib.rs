//! # Rowbind - Metadata-driven object persistence
//!
//! Maps plain in-memory records to relational tables.
//!
//! Rowbind provides:
//! - Declarative per-type record metadata resolved into column bindings
//! - Physical schema derivation (primary keys, unique constraints, indexes)
//! - Grouped saves with relation cascades and relation population on load
//! - Batched statement execution that reconnects and resumes on dropped connections
//! - A SQLite dialect behind a backend-agnostic [`storage::Dialect`] trait

pub mod value;
pub mod id;
pub mod record;
pub mod binding;
pub mod metadata;
pub mod query;
pub mod storage;
pub mod registry;
pub mod report;
pub mod database;
pub mod config;
pub mod tables;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use value::{FromValue, Value, ValueType};
pub use id::{IdGenerator, UuidGenerator};
pub use record::{Entity, Record, RecordState, RelationValue};
pub use binding::{Cardinality, FieldBinding, RelationBinding};
pub use metadata::{FieldDef, RecordDescriptor, RelationDef};
pub use query::{Filter, QueryParameter};
pub use storage::{Backend, Dialect, SqlBackend, SqliteDialect, TableSchema};
pub use registry::SchemaRegistry;
pub use report::{FailureKind, SaveFailure, SaveReport};
pub use database::{ObjectDatabase, Selection};
pub use config::{DatabaseConfig, RetryPolicy};

/// Result type alias for Rowbind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Rowbind operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Table {table} is already registered for {existing}, cannot register {requested}")]
    RegistrationConflict {
        table: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("Record type not registered: {0}")]
    UnregisteredType(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Table {0} has no primary key")]
    MissingPrimaryKey(String),

    #[error("Cannot convert '{value}' to {target}")]
    Conversion { value: String, target: ValueType },

    #[error("Relation error: {0}")]
    Relation(String),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}
