use crate::storage::TableSchema;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct ColumnRow {
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Type")]
    pub value_type: String,
    #[tabled(rename = "Null")]
    pub nullable: String,
    #[tabled(rename = "Key")]
    pub key: String,
}

/// One row per column of a table schema.
pub struct ColumnTable {
    rows: Vec<ColumnRow>,
}

impl ColumnTable {
    pub fn from_schema(schema: &TableSchema) -> Self {
        let rows = schema
            .fields()
            .iter()
            .map(|field| ColumnRow {
                column: field.column().to_string(),
                value_type: match field.varchar() {
                    Some(length) => format!("{}({})", field.value_type(), length),
                    None => field.value_type().to_string(),
                },
                nullable: if field.nullable() { "yes" } else { "no" }.to_string(),
                key: if field.is_auto_increment() {
                    "primary, auto".to_string()
                } else if field.is_primary_key() {
                    "primary".to_string()
                } else {
                    String::new()
                },
            })
            .collect();
        Self { rows }
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

#[derive(Tabled)]
pub struct CountRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Rows")]
    pub rows: i64,
}

/// Row counts per table.
pub struct CountTable {
    rows: Vec<CountRow>,
}

impl CountTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, table: &str, rows: i64) {
        self.rows.push(CountRow {
            table: table.to_string(),
            rows,
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for CountTable {
    fn default() -> Self {
        Self::new()
    }
}
