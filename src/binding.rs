//! Field and relation bindings
//!
//! A binding links one record member to one physical column ([`FieldBinding`])
//! or to a reference to another record type ([`RelationBinding`]).

use crate::metadata::RecordDescriptor;
use crate::record::Record;
use crate::value::{Value, ValueType};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::any::TypeId;
use std::fmt;

/// Where a column's value lives on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// A declared member, addressed by name.
    Member(&'static str),
    /// The record identifier (synthetic `<Table>_ID` column).
    RecordId,
    /// The implicit last-updated timestamp every record carries.
    LastUpdated,
}

/// Unique constraint or index participation of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    #[default]
    None,
    /// Single-column constraint.
    Single,
    /// Part of a named composite constraint.
    Group(&'static str),
}

impl Membership {
    pub fn is_none(&self) -> bool {
        matches!(self, Membership::None)
    }
}

/// Primary key marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrimaryKey {
    pub auto_increment: bool,
}

/// Binding of one member to one column.
#[derive(Debug, Clone, Serialize)]
pub struct FieldBinding {
    pub(crate) column: String,
    pub(crate) source: FieldSource,
    pub(crate) value_type: ValueType,
    pub(crate) nullable: bool,
    pub(crate) unique: Membership,
    pub(crate) index: Membership,
    pub(crate) varchar: Option<u32>,
    pub(crate) primary_key: Option<PrimaryKey>,
    pub(crate) read_only: bool,
}

impl FieldBinding {
    /// Column bound to the record identifier.
    pub fn record_id(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            source: FieldSource::RecordId,
            value_type: ValueType::Text,
            nullable: false,
            unique: Membership::Single,
            index: Membership::None,
            varchar: Some(255),
            primary_key: None,
            read_only: false,
        }
    }

    /// Column bound to the implicit last-updated timestamp.
    pub fn last_updated() -> Self {
        Self {
            column: LAST_UPDATED_COLUMN.to_string(),
            source: FieldSource::LastUpdated,
            value_type: ValueType::Timestamp,
            nullable: false,
            unique: Membership::None,
            index: Membership::None,
            varchar: None,
            primary_key: None,
            read_only: false,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn source(&self) -> FieldSource {
        self.source
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn unique(&self) -> Membership {
        self.unique
    }

    pub fn index(&self) -> Membership {
        self.index
    }

    /// Maximum text length hint
    pub fn varchar(&self) -> Option<u32> {
        self.varchar
    }

    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.primary_key
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    pub fn is_auto_increment(&self) -> bool {
        self.primary_key.is_some_and(|pk| pk.auto_increment)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Case-insensitive column name match.
    pub fn matches(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }

    /// Read the bound value from a record.
    pub fn get_value(&self, record: &dyn Record) -> Value {
        match self.source {
            FieldSource::Member(member) => record.get_value(member).unwrap_or(Value::Null),
            FieldSource::RecordId => Value::Text(record.state().id().to_string()),
            FieldSource::LastUpdated => Value::Timestamp(Utc::now()),
        }
    }

    /// Write an already converted value into the record.
    pub fn set_value(&self, record: &mut dyn Record, value: Value) -> Result<()> {
        match self.source {
            FieldSource::Member(member) => record.set_value(member, value),
            FieldSource::RecordId => {
                record.state_mut().set_id(value.to_string());
                Ok(())
            }
            FieldSource::LastUpdated => {
                record.state_mut().mark_dirty();
                Ok(())
            }
        }
    }
}

/// Name of the implicit last-updated column.
pub const LAST_UPDATED_COLUMN: &str = "LastTimeRowUpdated";

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Collection,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Single => write!(f, "single"),
            Cardinality::Collection => write!(f, "collection"),
        }
    }
}

/// Binding of a relation member to another record type.
#[derive(Clone, Serialize)]
pub struct RelationBinding {
    pub(crate) name: &'static str,
    #[serde(skip)]
    pub(crate) target_type: TypeId,
    #[serde(rename = "target")]
    pub(crate) target_type_name: &'static str,
    #[serde(skip)]
    pub(crate) target: fn() -> &'static RecordDescriptor,
    pub(crate) local_field: &'static str,
    pub(crate) remote_field: &'static str,
    pub(crate) autoload: bool,
    pub(crate) cardinality: Cardinality,
}

impl RelationBinding {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    pub fn target_type_name(&self) -> &'static str {
        self.target_type_name
    }

    /// Descriptor of the related record type
    pub fn target(&self) -> &'static RecordDescriptor {
        (self.target)()
    }

    pub fn local_field(&self) -> &'static str {
        self.local_field
    }

    pub fn remote_field(&self) -> &'static str {
        self.remote_field
    }

    pub fn autoload(&self) -> bool {
        self.autoload
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
}

impl fmt::Debug for RelationBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationBinding")
            .field("name", &self.name)
            .field("target", &self.target_type_name)
            .field("local_field", &self.local_field)
            .field("remote_field", &self.remote_field)
            .field("autoload", &self.autoload)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// One resolved member binding, in declaration order.
#[derive(Debug, Clone)]
pub enum Binding {
    Field(FieldBinding),
    Relation(RelationBinding),
}

impl Binding {
    pub fn as_field(&self) -> Option<&FieldBinding> {
        match self {
            Binding::Field(field) => Some(field),
            Binding::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationBinding> {
        match self {
            Binding::Relation(relation) => Some(relation),
            Binding::Field(_) => None,
        }
    }
}
