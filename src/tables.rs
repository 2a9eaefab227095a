//! Built-in tables

use crate::database::ObjectDatabase;
use crate::metadata::{FieldDef, RecordDescriptor};
use crate::record::{Entity, Record, RecordState, unknown_member};
use crate::storage::{Backend, TableSchema};
use crate::value::{Value, ValueType};
use crate::Result;
use std::sync::LazyLock;

/// A category of server properties, optionally nested under a parent category.
#[derive(Debug, Default)]
pub struct ServerPropertyCategory {
    state: RecordState,
    pub base_category: String,
    pub parent_category: Option<String>,
    pub display_name: String,
}

impl ServerPropertyCategory {
    pub fn new(base_category: impl Into<String>, parent_category: Option<String>, display_name: impl Into<String>) -> Self {
        Self {
            base_category: base_category.into(),
            parent_category,
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_category.as_deref().is_none_or(str::is_empty)
    }
}

impl Record for ServerPropertyCategory {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "BaseCategory" => Some(self.base_category.clone().into()),
            "ParentCategory" => Some(self.parent_category.clone().into()),
            "DisplayName" => Some(self.display_name.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "BaseCategory" => self.base_category = value.extract()?,
            "ParentCategory" => self.parent_category = value.extract()?,
            "DisplayName" => self.display_name = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }
}

impl Entity for ServerPropertyCategory {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<ServerPropertyCategory>()
                .table("serverproperty_category")
                .field(FieldDef::new("BaseCategory", ValueType::Text).nullable(false))
                .field(FieldDef::new("ParentCategory", ValueType::Text))
                .field(FieldDef::new("DisplayName", ValueType::Text).nullable(false))
        });
        &DESCRIPTOR
    }
}

/// Schemas of every built-in table.
pub fn builtin_schemas() -> Result<Vec<TableSchema>> {
    Ok(vec![TableSchema::build(ServerPropertyCategory::descriptor())?])
}

/// Register every built-in table with `db`.
pub fn register_builtin<B: Backend>(db: &ObjectDatabase<B>) -> Result<()> {
    db.register::<ServerPropertyCategory>()?;
    Ok(())
}
