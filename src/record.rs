//! Persistent records
//!
//! A record is a plain Rust struct that carries a [`RecordState`] and exposes its
//! mapped members by name through the [`Record`] trait. Concrete record types
//! additionally implement [`Entity`], which ties the type to its static
//! [`RecordDescriptor`].

use crate::id::generate_id;
use crate::metadata::RecordDescriptor;
use crate::value::Value;
use crate::{Error, Result};
use std::any::{Any, TypeId};
use std::fmt;

/// Persistence bookkeeping carried by every record.
#[derive(Debug)]
pub struct RecordState {
    id: String,
    persisted: bool,
    dirty: bool,
    deleted: bool,
    allow_add: bool,
    allow_delete: bool,
}

impl RecordState {
    /// Fresh state: new identifier, not persisted, dirty.
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            persisted: false,
            dirty: true,
            deleted: false,
            allow_add: true,
            allow_delete: true,
        }
    }

    /// Record identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Is this record also in the database?
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn set_persisted(&mut self, persisted: bool) {
        self.persisted = persisted;
    }

    /// Does the record differ from its stored row?
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    /// May a relation cascade insert this record?
    pub fn allow_add(&self) -> bool {
        self.allow_add
    }

    pub fn set_allow_add(&mut self, allow: bool) {
        self.allow_add = allow;
    }

    /// May a relation cascade remove this record?
    pub fn allow_delete(&self) -> bool {
        self.allow_delete
    }

    pub fn set_allow_delete(&mut self, allow: bool) {
        self.allow_delete = allow;
    }

    /// Mark as written: persisted, clean and not deleted.
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
        self.dirty = false;
        self.deleted = false;
    }
}

impl Default for RecordState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clones receive a fresh identifier; everything else is copied.
impl Clone for RecordState {
    fn clone(&self) -> Self {
        Self {
            id: generate_id(),
            ..*self
        }
    }
}

/// Upcast helper so boxed records can be downcast to their concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Object-safe access to a record's state, mapped members and relations.
///
/// Members are addressed by the names declared in the type's
/// [`RecordDescriptor`].
pub trait Record: AsAny + fmt::Debug + Send + 'static {
    fn state(&self) -> &RecordState;

    fn state_mut(&mut self) -> &mut RecordState;

    /// Current value of a mapped member, `None` if the record has no such member.
    fn get_value(&self, member: &str) -> Option<Value>;

    /// Assign a mapped member. The value already has the member's declared type.
    fn set_value(&mut self, member: &str, value: Value) -> Result<()>;

    /// Related records currently held by a relation member.
    ///
    /// Types declaring relations must override this; the default holds
    /// nothing, so a save cascade into such a relation writes no records.
    fn relation_records(&mut self, _relation: &str) -> Vec<&mut dyn Record> {
        Vec::new()
    }

    /// Replace the contents of a relation member.
    ///
    /// Must be overridden together with [`relation_records`](Record::relation_records).
    fn assign_relation(&mut self, relation: &str, _value: RelationValue) -> Result<()> {
        Err(unknown_member(self.record_type_name(), relation))
    }

    fn record_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    fn record_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A concrete record type with a static mapping descriptor.
pub trait Entity: Record + Default {
    fn descriptor() -> &'static RecordDescriptor;
}

/// Records fetched for a relation member.
#[derive(Debug)]
pub enum RelationValue {
    Single(Option<Box<dyn Record>>),
    Collection(Option<Vec<Box<dyn Record>>>),
}

impl RelationValue {
    /// Unwrap a single-valued relation into its concrete type.
    pub fn into_single<T: Record>(self) -> Result<Option<T>> {
        match self {
            RelationValue::Single(record) => record.map(downcast::<T>).transpose(),
            RelationValue::Collection(_) => Err(Error::Relation(format!(
                "expected a single {} but got a collection",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Unwrap a collection relation into its concrete element type.
    pub fn into_collection<T: Record>(self) -> Result<Option<Vec<T>>> {
        match self {
            RelationValue::Collection(records) => records
                .map(|records| records.into_iter().map(downcast::<T>).collect())
                .transpose(),
            RelationValue::Single(_) => Err(Error::Relation(format!(
                "expected a collection of {} but got a single record",
                std::any::type_name::<T>()
            ))),
        }
    }
}

/// Downcast a boxed record into its concrete type.
pub fn downcast<T: Record>(record: Box<dyn Record>) -> Result<T> {
    let actual = record.record_type_name();
    record
        .into_any()
        .downcast::<T>()
        .map(|record| *record)
        .map_err(|_| {
            Error::Relation(format!(
                "record of type {} is not a {}",
                actual,
                std::any::type_name::<T>()
            ))
        })
}

/// Error for a member name the record does not map.
pub fn unknown_member(type_name: &str, member: &str) -> Error {
    Error::Schema(format!("{} has no mapped member '{}'", type_name, member))
}

impl fmt::Display for dyn Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.record_type_name();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{} {{{}}}", short, self.state().id())
    }
}
