//! Table schema derivation
//!
//! Builds a [`TableSchema`] from a record type's resolved bindings: one column
//! per field binding, exactly one primary key, single and composite unique
//! constraints, and single and composite indexes.

use crate::binding::{Binding, FieldBinding, Membership, PrimaryKey, RelationBinding};
use crate::metadata::{RecordDescriptor, resolve_bindings, resolve_table_name};
use crate::record::Record;
use crate::{Error, Result};
use serde::Serialize;
use std::any::TypeId;
use std::fmt;

/// A named unique constraint or index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraint {
    pub name: String,
    pub columns: Vec<String>,
}

/// Physical structure derived for one record type.
#[derive(Clone, Serialize)]
pub struct TableSchema {
    table_name: String,
    #[serde(skip)]
    type_id: TypeId,
    #[serde(rename = "type")]
    type_name: &'static str,
    #[serde(skip)]
    factory: fn() -> Box<dyn Record>,
    fields: Vec<FieldBinding>,
    relations: Vec<RelationBinding>,
    primary_key: Vec<String>,
    unique_constraints: Vec<Constraint>,
    indexes: Vec<Constraint>,
}

impl TableSchema {
    /// Derive the schema of a described record type.
    pub fn build(descriptor: &RecordDescriptor) -> Result<Self> {
        let table_name = resolve_table_name(descriptor);
        let bindings = resolve_bindings(descriptor);

        let mut fields: Vec<FieldBinding> = Vec::new();
        let mut relations = Vec::new();
        for binding in bindings {
            match binding {
                Binding::Relation(relation) => relations.push(relation),
                Binding::Field(field) => {
                    if fields.iter().any(|existing| existing.matches(field.column())) {
                        return Err(Error::Schema(format!(
                            "duplicate column '{}' in table {}",
                            field.column(),
                            table_name
                        )));
                    }
                    fields.push(field);
                }
            }
        }

        let declared_keys = fields.iter().filter(|f| f.is_primary_key()).count();
        if declared_keys > 1 {
            return Err(Error::Schema(format!(
                "table {} declares {} primary keys, expected at most one",
                table_name, declared_keys
            )));
        }

        // Without a declared key, the record identifier becomes the key.
        if declared_keys == 0 {
            let column = synthetic_key_column(&table_name);
            if fields.iter().any(|f| f.matches(&column)) {
                return Err(Error::Schema(format!(
                    "column '{}' is reserved for the identity key of table {}",
                    column, table_name
                )));
            }
            let mut identity = FieldBinding::record_id(column);
            identity.primary_key = Some(PrimaryKey { auto_increment: false });
            fields.push(identity);
        }

        let mut schema = Self {
            table_name,
            type_id: descriptor.type_id(),
            type_name: descriptor.type_name(),
            factory: descriptor.factory(),
            fields,
            relations,
            primary_key: Vec::new(),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
        };
        schema.build_keys_and_constraints();
        schema.validate_relations()?;
        Ok(schema)
    }

    fn build_keys_and_constraints(&mut self) {
        let mut unique_groups: Vec<(&'static str, Vec<String>)> = Vec::new();
        let mut index_groups: Vec<(&'static str, Vec<String>)> = Vec::new();

        for field in &self.fields {
            let column = field.column().to_string();

            if field.is_primary_key() {
                self.primary_key = vec![column.clone()];
            }

            match field.unique() {
                Membership::None => {}
                Membership::Single => self.unique_constraints.push(Constraint {
                    name: format!("U_{}_{}", self.table_name, column),
                    columns: vec![column.clone()],
                }),
                Membership::Group(group) => push_group(&mut unique_groups, group, column.clone()),
            }

            match field.index() {
                Membership::None => {}
                Membership::Single => self.indexes.push(Constraint {
                    name: format!("I_{}_{}", self.table_name, column),
                    columns: vec![column],
                }),
                Membership::Group(group) => push_group(&mut index_groups, group, column),
            }
        }

        // Composite constraints once every column exists.
        for (group, columns) in unique_groups {
            self.unique_constraints.push(Constraint {
                name: format!("U_{}_{}", self.table_name, group),
                columns,
            });
        }
        for (group, columns) in index_groups {
            self.indexes.push(Constraint {
                name: format!("I_{}_{}", self.table_name, group),
                columns,
            });
        }
    }

    fn validate_relations(&self) -> Result<()> {
        for relation in &self.relations {
            if self.field(relation.local_field()).is_none() {
                return Err(Error::Schema(format!(
                    "relation {}.{} uses unknown local field '{}'",
                    self.table_name,
                    relation.name(),
                    relation.local_field()
                )));
            }
        }
        Ok(())
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Column bindings, in column order
    pub fn fields(&self) -> &[FieldBinding] {
        &self.fields
    }

    pub fn relations(&self) -> &[RelationBinding] {
        &self.relations
    }

    pub fn has_relations(&self) -> bool {
        !self.relations.is_empty()
    }

    /// Find a column binding, ignoring case.
    pub fn field(&self, column: &str) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.matches(column))
    }

    /// Every primary key binding
    pub fn primary_keys(&self) -> Vec<&FieldBinding> {
        self.primary_key
            .iter()
            .filter_map(|column| self.field(column))
            .collect()
    }

    /// The single primary key binding
    pub fn primary_key(&self) -> Option<&FieldBinding> {
        self.primary_keys().into_iter().next()
    }

    pub fn auto_increment_key(&self) -> Option<&FieldBinding> {
        self.fields.iter().find(|f| f.is_auto_increment())
    }

    /// Name of the synthetic identity column of this table.
    pub fn identity_column(&self) -> String {
        synthetic_key_column(&self.table_name)
    }

    pub fn unique_constraints(&self) -> &[Constraint] {
        &self.unique_constraints
    }

    pub fn indexes(&self) -> &[Constraint] {
        &self.indexes
    }

    /// Construct an empty record of this table's type.
    pub fn create_record(&self) -> Box<dyn Record> {
        (self.factory)()
    }

    #[cfg(test)]
    pub(crate) fn clear_primary_key(&mut self) {
        self.primary_key.clear();
        for field in &mut self.fields {
            field.primary_key = None;
        }
    }
}

fn push_group(groups: &mut Vec<(&'static str, Vec<String>)>, group: &'static str, column: String) {
    match groups.iter_mut().find(|(name, _)| *name == group) {
        Some((_, columns)) => columns.push(column),
        None => groups.push((group, vec![column])),
    }
}

fn synthetic_key_column(table_name: &str) -> String {
    format!("{}_ID", table_name)
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("table_name", &self.table_name)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("primary_key", &self.primary_key)
            .field("unique_constraints", &self.unique_constraints)
            .field("indexes", &self.indexes)
            .finish()
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table {} ({})", self.table_name, self.type_name)?;
        for field in &self.fields {
            let mut flags = Vec::new();
            if field.is_auto_increment() {
                flags.push("primary key auto_increment".to_string());
            } else if field.is_primary_key() {
                flags.push("primary key".to_string());
            }
            if !field.nullable() {
                flags.push("not null".to_string());
            }
            if field.is_read_only() {
                flags.push("read only".to_string());
            }
            if let Some(length) = field.varchar() {
                flags.push(format!("varchar({})", length));
            }
            writeln!(f, "  {} {} {}", field.column(), field.value_type(), flags.join(", "))?;
        }
        for relation in &self.relations {
            writeln!(
                f,
                "  -> {} [{}] {}.{} = {}{}",
                relation.name(),
                relation.cardinality(),
                relation.target_type_name(),
                relation.remote_field(),
                relation.local_field(),
                if relation.autoload() { " (autoload)" } else { "" }
            )?;
        }
        for constraint in &self.unique_constraints {
            writeln!(f, "  unique {} ({})", constraint.name, constraint.columns.join(", "))?;
        }
        for index in &self.indexes {
            writeln!(f, "  index {} ({})", index.name, index.columns.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::FieldSource;
    use crate::record::Entity;
    use crate::testing::{Account, Character, Clashing, Guild, Item, Shadowed};

    #[test]
    fn test_synthetic_primary_key_without_declared_key() {
        let schema = TableSchema::build(Account::descriptor()).unwrap();
        let keys = schema.primary_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].column(), "Account_ID");
        assert_eq!(keys[0].source(), FieldSource::RecordId);
        assert!(!keys[0].is_auto_increment());
        assert!(schema
            .unique_constraints()
            .iter()
            .any(|c| c.columns == vec!["Account_ID".to_string()]));
    }

    #[test]
    fn test_declared_key_adds_no_identity_column() {
        let schema = TableSchema::build(Item::descriptor()).unwrap();
        assert_eq!(schema.primary_key().unwrap().column(), "ItemKey");
        assert!(schema.field("Item_ID").is_none());
    }

    #[test]
    fn test_auto_increment_key() {
        let schema = TableSchema::build(Guild::descriptor()).unwrap();
        let key = schema.auto_increment_key().unwrap();
        assert_eq!(key.column(), "GuildId");
        assert_eq!(schema.primary_keys().len(), 1);
        assert!(schema.field("Guild_ID").is_none());
    }

    #[test]
    fn test_constraints_and_indexes() {
        let schema = TableSchema::build(Character::descriptor()).unwrap();
        assert_eq!(schema.table_name(), "Character");

        let composite = schema
            .unique_constraints()
            .iter()
            .find(|c| c.name == "U_Character_ident")
            .unwrap();
        assert_eq!(composite.columns, vec!["Name", "Realm"]);

        let account_index = schema
            .indexes()
            .iter()
            .find(|c| c.name == "I_Character_AccountId")
            .unwrap();
        assert_eq!(account_index.columns, vec!["AccountId"]);

        assert_eq!(schema.relations().len(), 1);
        assert!(schema.field("Guild").is_none());
        assert!(schema.field("lasttimerowupdated").is_some());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = TableSchema::build(Clashing::descriptor()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_reserved_identity_column_rejected() {
        assert!(TableSchema::build(Shadowed::descriptor()).is_err());
    }

    #[test]
    fn test_schema_serializes() {
        let schema = TableSchema::build(Account::descriptor()).unwrap();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["table_name"], "Account");
        assert_eq!(json["primary_key"][0], "Account_ID");
    }
}
