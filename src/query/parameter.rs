//! Query parameters

use crate::value::{Value, ValueType};

/// One named, typed parameter of a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    /// Placeholder as it appears in the statement text (e.g. `@Name`).
    pub name: String,
    pub value: Value,
    /// Declared type of the bound column.
    pub value_type: ValueType,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: Value, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value,
            value_type,
        }
    }

    /// Parameter whose type is taken from the value itself (text for null).
    pub fn from_value(name: impl Into<String>, value: Value) -> Self {
        let value_type = value.value_type().unwrap_or(ValueType::Text);
        Self::new(name, value, value_type)
    }
}
