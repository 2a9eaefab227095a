//! Schema registry
//!
//! Maps table names (and record types) to their [`TableSchema`]. Reads take a
//! shared lock and hand out `Arc`s, so saves and selects never hold the lock
//! while talking to the backend. Registration takes the exclusive lock.

use crate::storage::schema::TableSchema;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    by_table: HashMap<String, Arc<TableSchema>>,
    by_type: HashMap<TypeId, String>,
}

/// Registered table schemas, keyed by table name.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<Inner>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema registered under `table`.
    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.inner.read().by_table.get(table).cloned()
    }

    /// Schema registered for a record type.
    pub fn get_by_type(&self, type_id: TypeId) -> Option<Arc<TableSchema>> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(&type_id)
            .and_then(|table| inner.by_table.get(table))
            .cloned()
    }

    /// Check whether `table` may be registered for `type_id`.
    ///
    /// Returns the existing schema when the same type is already registered.
    pub fn check(&self, table: &str, type_id: TypeId, type_name: &'static str) -> Result<Option<Arc<TableSchema>>> {
        let inner = self.inner.read();
        Self::check_locked(&inner, table, type_id, type_name)
    }

    fn check_locked(
        inner: &Inner,
        table: &str,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Option<Arc<TableSchema>>> {
        match inner.by_table.get(table) {
            Some(existing) if existing.type_id() == type_id => Ok(Some(Arc::clone(existing))),
            Some(existing) => Err(Error::RegistrationConflict {
                table: table.to_string(),
                existing: existing.type_name(),
                requested: type_name,
            }),
            None => Ok(None),
        }
    }

    /// Store a schema.
    ///
    /// The conflict check is repeated under the write lock; a concurrent
    /// registration of the same type wins and its schema is returned.
    pub fn insert(&self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        let mut inner = self.inner.write();
        if let Some(existing) =
            Self::check_locked(&inner, schema.table_name(), schema.type_id(), schema.type_name())?
        {
            return Ok(existing);
        }

        let schema = Arc::new(schema);
        inner
            .by_type
            .insert(schema.type_id(), schema.table_name().to_string());
        inner
            .by_table
            .insert(schema.table_name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered schema, sorted by table name.
    pub fn schemas(&self) -> Vec<Arc<TableSchema>> {
        let mut schemas: Vec<Arc<TableSchema>> = self.inner.read().by_table.values().cloned().collect();
        schemas.sort_by(|a, b| a.table_name().cmp(b.table_name()));
        schemas
    }
}
