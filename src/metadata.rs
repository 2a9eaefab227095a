//! Record metadata and binding resolution
//!
//! Each record type declares its mapping once, as a static [`RecordDescriptor`]
//! (usually behind a `LazyLock`). Resolution turns a descriptor into the ordered
//! list of [`Binding`]s the schema builder consumes:
//!
//! ```rust,ignore
//! static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
//!     RecordDescriptor::of::<Account>()
//!         .table("account")
//!         .field(FieldDef::new("Name", ValueType::Text).nullable(false).unique())
//!         .field(FieldDef::new("Level", ValueType::I32))
//!         .relation(RelationDef::collection::<Character>("Characters", "Account_ID", "AccountId").autoload())
//! });
//! ```

use crate::binding::{Binding, Cardinality, FieldBinding, FieldSource, Membership, PrimaryKey, RelationBinding};
use crate::record::{Entity, Record};
use crate::value::ValueType;
use std::any::TypeId;

/// Declared metadata of one column member.
#[derive(Debug, Clone)]
pub struct FieldDef {
    member: &'static str,
    column: Option<&'static str>,
    value_type: ValueType,
    nullable: bool,
    unique: Membership,
    index: Membership,
    varchar: Option<u32>,
    primary_key: Option<PrimaryKey>,
    read_only: bool,
}

impl FieldDef {
    /// A nullable column named after the member.
    pub fn new(member: &'static str, value_type: ValueType) -> Self {
        Self {
            member,
            column: None,
            value_type,
            nullable: true,
            unique: Membership::None,
            index: Membership::None,
            varchar: None,
            primary_key: None,
            read_only: false,
        }
    }

    /// Override the column name
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = Some(PrimaryKey { auto_increment: false });
        self.nullable = false;
        self
    }

    /// Primary key generated by the backend.
    pub fn auto_increment(mut self) -> Self {
        self.primary_key = Some(PrimaryKey { auto_increment: true });
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Membership::Single;
        self
    }

    /// Join the composite unique constraint `group`.
    pub fn unique_group(mut self, group: &'static str) -> Self {
        self.unique = Membership::Group(group);
        self
    }

    pub fn index(mut self) -> Self {
        self.index = Membership::Single;
        self
    }

    /// Join the composite index `group`.
    pub fn index_group(mut self, group: &'static str) -> Self {
        self.index = Membership::Group(group);
        self
    }

    pub fn varchar(mut self, length: u32) -> Self {
        self.varchar = Some(length);
        self
    }

    /// Excluded from UPDATE statements.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn member(&self) -> &'static str {
        self.member
    }

    fn bind(&self) -> FieldBinding {
        FieldBinding {
            column: self.column.unwrap_or(self.member).to_string(),
            source: FieldSource::Member(self.member),
            value_type: self.value_type,
            nullable: self.nullable,
            unique: self.unique,
            index: self.index,
            varchar: self.varchar,
            primary_key: self.primary_key,
            read_only: self.read_only,
        }
    }
}

/// Declared metadata of one relation member.
#[derive(Debug, Clone)]
pub struct RelationDef {
    member: &'static str,
    target_type: TypeId,
    target_type_name: &'static str,
    target: fn() -> &'static RecordDescriptor,
    local_field: &'static str,
    remote_field: &'static str,
    autoload: bool,
    cardinality: Cardinality,
}

impl RelationDef {
    /// Relation holding at most one `T`, matched on `remote == local`.
    pub fn single<T: Entity>(member: &'static str, local_field: &'static str, remote_field: &'static str) -> Self {
        Self::with_cardinality::<T>(member, local_field, remote_field, Cardinality::Single)
    }

    /// Relation holding every matching `T`.
    pub fn collection<T: Entity>(member: &'static str, local_field: &'static str, remote_field: &'static str) -> Self {
        Self::with_cardinality::<T>(member, local_field, remote_field, Cardinality::Collection)
    }

    fn with_cardinality<T: Entity>(
        member: &'static str,
        local_field: &'static str,
        remote_field: &'static str,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            member,
            target_type: TypeId::of::<T>(),
            target_type_name: std::any::type_name::<T>(),
            target: T::descriptor,
            local_field,
            remote_field,
            autoload: false,
            cardinality,
        }
    }

    /// Populate this relation whenever the owner is loaded.
    pub fn autoload(mut self) -> Self {
        self.autoload = true;
        self
    }

    fn bind(&self) -> RelationBinding {
        RelationBinding {
            name: self.member,
            target_type: self.target_type,
            target_type_name: self.target_type_name,
            target: self.target,
            local_field: self.local_field,
            remote_field: self.remote_field,
            autoload: self.autoload,
            cardinality: self.cardinality,
        }
    }
}

#[derive(Debug, Clone)]
enum MemberDef {
    Field(FieldDef),
    Relation(RelationDef),
}

/// Static mapping of one record type.
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    table: Option<&'static str>,
    members: Vec<MemberDef>,
    factory: fn() -> Box<dyn Record>,
}

fn create<T: Entity>() -> Box<dyn Record> {
    Box::new(T::default())
}

impl RecordDescriptor {
    /// Start describing `T`.
    pub fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            table: None,
            members: Vec::new(),
            factory: create::<T>,
        }
    }

    /// Override the table name (defaults to the type's short name)
    pub fn table(mut self, name: &'static str) -> Self {
        self.table = Some(name);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.members.push(MemberDef::Field(field));
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.members.push(MemberDef::Relation(relation));
        self
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn declared_table(&self) -> Option<&'static str> {
        self.table
    }

    /// Construct an empty record of the described type.
    pub fn create(&self) -> Box<dyn Record> {
        (self.factory)()
    }

    pub(crate) fn factory(&self) -> fn() -> Box<dyn Record> {
        self.factory
    }
}

/// Table name of a descriptor: the declared name, else the type's short name.
pub fn resolve_table_name(descriptor: &RecordDescriptor) -> String {
    match descriptor.table {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => short_type_name(descriptor.type_name),
    }
}

/// Short name of a Rust type path.
///
/// Collection and wrapper types resolve to their element type, so
/// `alloc::vec::Vec<game::Character>` and `[game::Character]` both give `Character`.
pub fn short_type_name(type_name: &str) -> String {
    let mut name = type_name.trim();
    loop {
        if let Some(inner) = name.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            name = inner.split(';').next().unwrap_or(inner).trim();
            continue;
        }
        if let Some(inner) = name.strip_prefix('&') {
            name = inner.trim_start_matches("mut ").trim();
            continue;
        }
        if let Some(open) = name.find('<') {
            if name.ends_with('>') {
                let generic_args = &name[open + 1..name.len() - 1];
                // Element type of single-parameter wrappers.
                if !generic_args.contains(',') {
                    name = generic_args.trim();
                    continue;
                }
            }
            name = &name[..open];
        }
        break;
    }
    name.rsplit("::").next().unwrap_or(name).to_string()
}

/// Resolve the ordered bindings of a descriptor.
///
/// Declared members come first, in declaration order, followed by the
/// implicit last-updated column. Resolution is pure: the same descriptor always
/// yields the same bindings.
pub fn resolve_bindings(descriptor: &RecordDescriptor) -> Vec<Binding> {
    descriptor
        .members
        .iter()
        .map(|member| match member {
            MemberDef::Field(field) => Binding::Field(field.bind()),
            MemberDef::Relation(relation) => Binding::Relation(relation.bind()),
        })
        .chain(std::iter::once(Binding::Field(FieldBinding::last_updated())))
        .collect()
}
