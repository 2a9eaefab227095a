//! Object database
//!
//! [`ObjectDatabase`] is the public entry point: it registers record types,
//! saves records grouped by type (cascading into their relations), selects
//! whole tables and populates relations. Physical work goes through a
//! [`Backend`].

use crate::binding::{Cardinality, RelationBinding};
use crate::config::DatabaseConfig;
use crate::metadata::resolve_table_name;
use crate::query::Filter;
use crate::record::{Entity, Record, RelationValue, downcast};
use crate::registry::SchemaRegistry;
use crate::report::{FailureKind, SaveReport};
use crate::storage::schema::TableSchema;
use crate::storage::{Backend, SqlBackend, SqliteDialect};
use crate::value::Value;
use crate::{Error, Result};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Records of one table together with relation population diagnostics.
#[derive(Debug)]
pub struct Selection<T> {
    pub records: Vec<T>,
    /// Relations that could not be populated. The affected relation members
    /// are left as they were.
    pub relation_errors: Vec<Error>,
}

/// (table, record id) of every record from a top-level record down to the
/// owner of a fetched record.
type Ancestry = Vec<(String, String)>;

pub struct ObjectDatabase<B: Backend> {
    backend: B,
    registry: SchemaRegistry,
}

impl ObjectDatabase<SqlBackend<SqliteDialect>> {
    /// SQLite database described by `config`.
    pub fn open_sqlite(config: &DatabaseConfig) -> Result<Self> {
        let dialect = SqliteDialect::from_config(&config.connection)?;
        Ok(Self::new(SqlBackend::from_config(dialect, config)))
    }
}

impl<B: Backend> ObjectDatabase<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registry: SchemaRegistry::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Schema registered for `T`.
    pub fn schema_of<T: Entity>(&self) -> Result<Arc<TableSchema>> {
        self.registry
            .get_by_type(TypeId::of::<T>())
            .ok_or_else(|| Error::UnregisteredType(std::any::type_name::<T>().to_string()))
    }

    /// Register a record type, creating or extending its table.
    ///
    /// Registering the same type again is a no-op. A table name already taken by
    /// another type fails with [`Error::RegistrationConflict`] and leaves the
    /// existing registration in place.
    pub fn register<T: Entity>(&self) -> Result<Arc<TableSchema>> {
        let descriptor = T::descriptor();
        let table = resolve_table_name(descriptor);
        if let Some(existing) = self.registry.check(&table, descriptor.type_id(), descriptor.type_name())? {
            return Ok(existing);
        }

        let schema = TableSchema::build(descriptor)?;
        self.backend.check_or_create_table(&schema)?;
        let schema = self.registry.insert(schema)?;
        info!(table = schema.table_name(), record = schema.type_name(), "registered table");
        Ok(schema)
    }

    /// Save dirty records, grouped by concrete type, then cascade into relations.
    ///
    /// Only UPDATEs are issued for the records themselves; unpersisted related
    /// records are inserted by the cascade. Per-record failures land in the
    /// report; only backend failures of a whole batch are returned as `Err`.
    pub fn save(&self, records: &mut [&mut dyn Record]) -> Result<SaveReport> {
        let mut report = SaveReport::new();

        let mut types: Vec<(TypeId, &'static str)> = Vec::new();
        for record in records.iter() {
            let record_type = record.record_type();
            if !types.iter().any(|(t, _)| *t == record_type) {
                types.push((record_type, record.record_type_name()));
            }
        }

        for (record_type, type_name) in types {
            let mut group: Vec<&mut dyn Record> = records
                .iter_mut()
                .filter(|r| r.record_type() == record_type)
                .map(|r| &mut **r)
                .collect();

            let Some(schema) = self.registry.get_by_type(record_type) else {
                error!(record = type_name, "save: record type not registered");
                for record in &group {
                    report.record_failure(type_name, record.state().id(), FailureKind::UnregisteredType);
                }
                continue;
            };

            let mut dirty: Vec<&mut dyn Record> = group
                .iter_mut()
                .filter(|r| r.state().is_dirty())
                .map(|r| &mut **r)
                .collect();
            if !dirty.is_empty() {
                let outcomes = self.backend.save_objects(&schema, &mut dirty)?;
                collect_outcomes(&mut report, &schema, &dirty, outcomes, "save");
            }
            drop(dirty);

            if schema.has_relations() {
                report.merge(self.save_relations(&schema, &mut group)?);
            }
        }

        Ok(report)
    }

    pub fn save_one(&self, record: &mut dyn Record) -> Result<SaveReport> {
        self.save(&mut [record])
    }

    pub fn save_all<T: Entity>(&self, records: &mut [T]) -> Result<SaveReport> {
        let mut records: Vec<&mut dyn Record> = records.iter_mut().map(|r| r as &mut dyn Record).collect();
        self.save(&mut records)
    }

    /// Cascade a save into the related records of `group`.
    fn save_relations(&self, schema: &TableSchema, group: &mut [&mut dyn Record]) -> Result<SaveReport> {
        let mut report = SaveReport::new();

        for relation in schema.relations() {
            let Some(remote) = self.registry.get_by_type(relation.target_type()) else {
                error!(
                    table = schema.table_name(),
                    relation = relation.name(),
                    target = relation.target_type_name(),
                    "save: relation target not registered"
                );
                report.record_failure(
                    resolve_table_name(relation.target()),
                    format!("{}.{}", schema.table_name(), relation.name()),
                    FailureKind::RelationTargetUnregistered,
                );
                continue;
            };

            let related: Vec<&mut dyn Record> = group
                .iter_mut()
                .flat_map(|record| record.relation_records(relation.name()))
                .collect();

            let mut updates: Vec<&mut dyn Record> = Vec::new();
            let mut inserts: Vec<&mut dyn Record> = Vec::new();
            for record in related {
                let state = record.state();
                if state.is_persisted() {
                    if state.is_dirty() {
                        updates.push(record);
                    }
                } else if state.allow_add() {
                    inserts.push(record);
                } else {
                    warn!(table = remote.table_name(), record = %&*record, "save: record not allowed to be added");
                    report.record_failure(remote.table_name(), record.state().id(), FailureKind::InsertNotAllowed);
                }
            }

            if !updates.is_empty() {
                let outcomes = self.backend.save_objects(&remote, &mut updates)?;
                collect_outcomes(&mut report, &remote, &updates, outcomes, "save relation");
            }
            if !inserts.is_empty() {
                let outcomes = self.backend.add_objects(&remote, &mut inserts)?;
                collect_outcomes(&mut report, &remote, &inserts, outcomes, "add relation");
            }
        }

        Ok(report)
    }

    /// Every record of `T`'s table, with autoload relations populated.
    pub fn select_all<T: Entity>(&self) -> Result<Vec<T>> {
        Ok(self.select_all_report::<T>()?.records)
    }

    /// Like [`select_all`](Self::select_all), also returning relation errors.
    pub fn select_all_report<T: Entity>(&self) -> Result<Selection<T>> {
        let schema = self.schema_of::<T>().inspect_err(|_| {
            error!(record = std::any::type_name::<T>(), "select: record type not registered");
        })?;

        let rows = self
            .backend
            .select_objects(&schema, &[Filter::empty()])?
            .into_iter()
            .next()
            .unwrap_or_default();
        let mut records = rows.into_iter().map(downcast::<T>).collect::<Result<Vec<T>>>()?;
        debug!(table = schema.table_name(), count = records.len(), "selected records");

        let relation_errors = self.populate_relations(&mut records, false);
        Ok(Selection {
            records,
            relation_errors,
        })
    }

    /// Populate relation members of `records`.
    ///
    /// Autoload relations are always populated, others only with `force`.
    /// Failures are logged and returned; the affected members are untouched.
    pub fn populate_relations<T: Entity>(&self, records: &mut [T], force: bool) -> Vec<Error> {
        let mut records: Vec<&mut dyn Record> = records.iter_mut().map(|r| r as &mut dyn Record).collect();
        let ancestry = vec![Ancestry::new(); records.len()];
        let mut errors = Vec::new();
        self.fill_relations(&mut records, &ancestry, force, &mut errors);
        errors
    }

    /// `ancestry[i]` lists the records above `records[i]`. A record that is its
    /// own ancestor closes a cycle and is not descended into.
    fn fill_relations(
        &self,
        records: &mut [&mut dyn Record],
        ancestry: &[Ancestry],
        force: bool,
        errors: &mut Vec<Error>,
    ) {
        let mut types: Vec<(TypeId, &'static str)> = Vec::new();
        for record in records.iter() {
            let record_type = record.record_type();
            if !types.iter().any(|(t, _)| *t == record_type) {
                types.push((record_type, record.record_type_name()));
            }
        }

        for (record_type, type_name) in types {
            let Some(schema) = self.registry.get_by_type(record_type) else {
                error!(record = type_name, "could not resolve relations, record type not registered");
                errors.push(Error::UnregisteredType(type_name.to_string()));
                continue;
            };
            if !schema.has_relations() {
                continue;
            }

            let mut group: Vec<&mut dyn Record> = Vec::new();
            let mut lineage: Vec<Ancestry> = Vec::new();
            for (record, ancestors) in records.iter_mut().zip(ancestry) {
                if record.record_type() != record_type {
                    continue;
                }
                let key = (schema.table_name().to_string(), record.state().id().to_string());
                if ancestors.contains(&key) {
                    debug!(table = schema.table_name(), record = %&**record, "relation cycle, not descending");
                    continue;
                }
                let mut path = ancestors.clone();
                path.push(key);
                group.push(&mut **record);
                lineage.push(path);
            }
            if group.is_empty() {
                continue;
            }

            for relation in schema.relations() {
                if !(relation.autoload() || force) {
                    continue;
                }
                if let Err(e) = self.fill_relation(&schema, relation, &mut group, &lineage, force, errors) {
                    error!(
                        table = schema.table_name(),
                        relation = relation.name(),
                        local = relation.local_field(),
                        remote = relation.remote_field(),
                        error = %e,
                        "could not retrieve related records"
                    );
                    errors.push(e);
                }
            }
        }
    }

    fn fill_relation(
        &self,
        schema: &TableSchema,
        relation: &RelationBinding,
        group: &mut [&mut dyn Record],
        lineage: &[Ancestry],
        force: bool,
        errors: &mut Vec<Error>,
    ) -> Result<()> {
        let remote = self.registry.get_by_type(relation.target_type()).ok_or_else(|| {
            Error::UnregisteredType(relation.target_type_name().to_string())
        })?;
        let local_field = schema.field(relation.local_field()).ok_or_else(|| {
            Error::Relation(format!("{} has no column {}", schema.table_name(), relation.local_field()))
        })?;
        let remote_field = remote.field(relation.remote_field()).ok_or_else(|| {
            Error::Relation(format!("{} has no column {}", remote.table_name(), relation.remote_field()))
        })?;

        // A NULL local value equals nothing, so its owner gets no query.
        let keys: Vec<Value> = group.iter().map(|record| local_field.get_value(&**record)).collect();
        let filters: Vec<Filter> = keys
            .iter()
            .filter(|key| !key.is_null())
            .map(|key| Filter::column(remote_field.column()).is_equal_to(key.clone()))
            .collect();
        let mut fetched = self.backend.select_objects(&remote, &filters)?.into_iter();
        let mut results: Vec<Vec<Box<dyn Record>>> = keys
            .iter()
            .map(|key| if key.is_null() { Vec::new() } else { fetched.next().unwrap_or_default() })
            .collect();

        // Nested relations are filled before the results move into their owners.
        let mut nested: Vec<&mut dyn Record> = Vec::new();
        let mut nested_ancestry: Vec<Ancestry> = Vec::new();
        for (matches, path) in results.iter_mut().zip(lineage) {
            for record in matches.iter_mut() {
                nested.push(&mut **record);
                nested_ancestry.push(path.clone());
            }
        }
        self.fill_relations(&mut nested, &nested_ancestry, force, errors);
        drop(nested);

        for (record, mut matches) in group.iter_mut().zip(results) {
            let value = match relation.cardinality() {
                Cardinality::Collection if matches.is_empty() => RelationValue::Collection(None),
                Cardinality::Collection => RelationValue::Collection(Some(matches)),
                Cardinality::Single => match matches.len() {
                    0 => RelationValue::Single(None),
                    1 => RelationValue::Single(matches.pop()),
                    count => {
                        let e = Error::Relation(format!(
                            "{} of {} matched {} {} records, expected at most one",
                            relation.name(),
                            &**record,
                            count,
                            remote.table_name()
                        ));
                        error!(error = %e, "ambiguous single relation");
                        errors.push(e);
                        continue;
                    }
                },
            };

            if let Err(e) = record.assign_relation(relation.name(), value) {
                error!(relation = relation.name(), record = %&**record, error = %e, "could not assign relation");
                errors.push(e);
            }
        }

        Ok(())
    }
}

/// Record per-item outcomes of one backend batch in the report.
fn collect_outcomes(
    report: &mut SaveReport,
    schema: &TableSchema,
    records: &[&mut dyn Record],
    outcomes: Vec<crate::report::RecordOutcome>,
    operation: &str,
) {
    for (record, outcome) in records.iter().zip(outcomes) {
        match outcome {
            Ok(()) => report.record_success(),
            Err(kind) => {
                error!(
                    table = schema.table_name(),
                    record = %&**record,
                    kind = %kind,
                    "{}: record could not be written",
                    operation
                );
                report.record_failure(schema.table_name(), record.state().id(), kind);
            }
        }
    }
}
