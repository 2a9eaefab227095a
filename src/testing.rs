//! Record types and a scripted dialect shared by the unit tests.

use crate::config::RetryPolicy;
use crate::database::ObjectDatabase;
use crate::metadata::{FieldDef, RecordDescriptor, RelationDef};
use crate::query::QueryParameter;
use crate::record::{Entity, Record, RecordState, RelationValue, unknown_member};
use crate::storage::schema::TableSchema;
use crate::storage::{Dialect, SqlBackend, SqliteDialect};
use crate::value::{Value, ValueType};
use crate::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Account {
    state: RecordState,
    pub name: String,
    pub email: Option<String>,
    pub level: i32,
    pub characters: Option<Vec<Character>>,
}

impl Account {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Account {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "Name" => Some(self.name.clone().into()),
            "Email" => Some(self.email.clone().into()),
            "Level" => Some(self.level.into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "Name" => self.name = value.extract()?,
            "Email" => self.email = value.extract()?,
            "Level" => self.level = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }

    fn relation_records(&mut self, relation: &str) -> Vec<&mut dyn Record> {
        match relation {
            "Characters" => self
                .characters
                .iter_mut()
                .flatten()
                .map(|c| c as &mut dyn Record)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn assign_relation(&mut self, relation: &str, value: RelationValue) -> Result<()> {
        match relation {
            "Characters" => self.characters = value.into_collection()?,
            _ => return Err(unknown_member(self.record_type_name(), relation)),
        }
        Ok(())
    }
}

impl Entity for Account {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Account>()
                .field(FieldDef::new("Name", ValueType::Text).nullable(false).unique())
                .field(FieldDef::new("Email", ValueType::Text).varchar(200).index())
                .field(FieldDef::new("Level", ValueType::I32).nullable(false))
                .relation(RelationDef::collection::<Character>("Characters", "Account_ID", "AccountId").autoload())
        });
        &DESCRIPTOR
    }
}

#[derive(Debug, Default)]
pub struct Character {
    state: RecordState,
    pub name: String,
    pub realm: u8,
    pub account_id: Option<String>,
    pub score: f64,
    pub guild_id: Option<i64>,
    pub guild: Option<Guild>,
}

impl Character {
    pub fn named(name: &str, realm: u8) -> Self {
        Self {
            name: name.to_string(),
            realm,
            ..Default::default()
        }
    }
}

impl Record for Character {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "Name" => Some(self.name.clone().into()),
            "Realm" => Some(self.realm.into()),
            "AccountId" => Some(self.account_id.clone().into()),
            "Score" => Some(self.score.into()),
            "GuildId" => Some(self.guild_id.into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "Name" => self.name = value.extract()?,
            "Realm" => self.realm = value.extract()?,
            "AccountId" => self.account_id = value.extract()?,
            "Score" => self.score = value.extract()?,
            "GuildId" => self.guild_id = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }

    fn relation_records(&mut self, relation: &str) -> Vec<&mut dyn Record> {
        match relation {
            "Guild" => self.guild.iter_mut().map(|g| g as &mut dyn Record).collect(),
            _ => Vec::new(),
        }
    }

    fn assign_relation(&mut self, relation: &str, value: RelationValue) -> Result<()> {
        match relation {
            "Guild" => self.guild = value.into_single()?,
            _ => return Err(unknown_member(self.record_type_name(), relation)),
        }
        Ok(())
    }
}

impl Entity for Character {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Character>()
                .field(FieldDef::new("Name", ValueType::Text).nullable(false).unique_group("ident"))
                .field(FieldDef::new("Realm", ValueType::U8).nullable(false).unique_group("ident"))
                .field(FieldDef::new("AccountId", ValueType::Text).index())
                .field(FieldDef::new("Score", ValueType::F64))
                .field(FieldDef::new("GuildId", ValueType::I64))
                .relation(RelationDef::single::<Guild>("Guild", "GuildId", "GuildId"))
        });
        &DESCRIPTOR
    }
}

#[derive(Debug, Default)]
pub struct Guild {
    state: RecordState,
    pub guild_id: i64,
    pub name: String,
}

impl Guild {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Guild {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "GuildId" => Some(self.guild_id.into()),
            "Name" => Some(self.name.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "GuildId" => self.guild_id = value.extract()?,
            "Name" => self.name = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }
}

impl Entity for Guild {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Guild>()
                .field(FieldDef::new("GuildId", ValueType::I64).auto_increment())
                .field(FieldDef::new("Name", ValueType::Text))
        });
        &DESCRIPTOR
    }
}

/// Declares its own key column.
#[derive(Debug, Default)]
pub struct Item {
    state: RecordState,
    pub item_key: String,
    pub label: Option<String>,
}

impl Record for Item {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "ItemKey" => Some(self.item_key.clone().into()),
            "Label" => Some(self.label.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "ItemKey" => self.item_key = value.extract()?,
            "Label" => self.label = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }
}

impl Entity for Item {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Item>()
                .field(FieldDef::new("ItemKey", ValueType::Text).primary_key())
                .field(FieldDef::new("Label", ValueType::Text))
        });
        &DESCRIPTOR
    }
}

/// A second type claiming the `Account` table.
#[derive(Debug, Default)]
pub struct Renamed {
    state: RecordState,
    pub name: String,
}

impl Record for Renamed {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        (member == "Name").then(|| self.name.clone().into())
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        if member != "Name" {
            return Err(unknown_member(self.record_type_name(), member));
        }
        self.name = value.extract()?;
        Ok(())
    }
}

impl Entity for Renamed {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Renamed>()
                .table("Account")
                .field(FieldDef::new("Name", ValueType::Text))
        });
        &DESCRIPTOR
    }
}

/// Self-referencing record for cycle tests.
#[derive(Debug, Default)]
pub struct Node {
    state: RecordState,
    pub label: String,
    pub parent_id: Option<String>,
    pub parent: Option<Box<Node>>,
}

impl Node {
    pub fn labelled(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Default::default()
        }
    }
}

impl Record for Node {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "Label" => Some(self.label.clone().into()),
            "ParentId" => Some(self.parent_id.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "Label" => self.label = value.extract()?,
            "ParentId" => self.parent_id = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }

    fn relation_records(&mut self, relation: &str) -> Vec<&mut dyn Record> {
        match relation {
            "Parent" => self.parent.iter_mut().map(|p| &mut **p as &mut dyn Record).collect(),
            _ => Vec::new(),
        }
    }

    fn assign_relation(&mut self, relation: &str, value: RelationValue) -> Result<()> {
        match relation {
            "Parent" => self.parent = value.into_single::<Node>()?.map(Box::new),
            _ => return Err(unknown_member(self.record_type_name(), relation)),
        }
        Ok(())
    }
}

impl Entity for Node {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Node>()
                .field(FieldDef::new("Label", ValueType::Text))
                .field(FieldDef::new("ParentId", ValueType::Text))
                .relation(RelationDef::single::<Node>("Parent", "ParentId", "Node_ID").autoload())
        });
        &DESCRIPTOR
    }
}

/// Two members mapped to the same column, differing only in case.
#[derive(Debug, Default)]
pub struct Clashing {
    state: RecordState,
    pub name: String,
    pub alias: String,
}

impl Record for Clashing {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        match member {
            "Name" => Some(self.name.clone().into()),
            "Alias" => Some(self.alias.clone().into()),
            _ => None,
        }
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        match member {
            "Name" => self.name = value.extract()?,
            "Alias" => self.alias = value.extract()?,
            _ => return Err(unknown_member(self.record_type_name(), member)),
        }
        Ok(())
    }
}

impl Entity for Clashing {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Clashing>()
                .field(FieldDef::new("Name", ValueType::Text))
                .field(FieldDef::new("Alias", ValueType::Text).column("NAME"))
        });
        &DESCRIPTOR
    }
}

/// Declares a column named like its own identity key.
#[derive(Debug, Default)]
pub struct Shadowed {
    state: RecordState,
    pub shadowed_id: String,
}

impl Record for Shadowed {
    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn get_value(&self, member: &str) -> Option<Value> {
        (member == "Shadowed_ID").then(|| self.shadowed_id.clone().into())
    }

    fn set_value(&mut self, member: &str, value: Value) -> Result<()> {
        if member != "Shadowed_ID" {
            return Err(unknown_member(self.record_type_name(), member));
        }
        self.shadowed_id = value.extract()?;
        Ok(())
    }
}

impl Entity for Shadowed {
    fn descriptor() -> &'static RecordDescriptor {
        static DESCRIPTOR: LazyLock<RecordDescriptor> = LazyLock::new(|| {
            RecordDescriptor::of::<Shadowed>().field(FieldDef::new("Shadowed_ID", ValueType::Text))
        });
        &DESCRIPTOR
    }
}

/// Scripted outcome of the next statement.
#[derive(Debug)]
pub enum Step {
    Affected(i64),
    Id(i64),
    Rows(Vec<Vec<Value>>),
    /// Connection reset by peer
    Transient,
    Constraint,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("connection dropped")]
    Transient(#[source] io::Error),

    #[error("constraint failed")]
    Constraint,

    #[error("statement failed")]
    Fatal,
}

/// One statement seen by the scripted dialect.
#[derive(Debug, Clone)]
pub struct Call {
    pub sql: String,
    pub params: Vec<QueryParameter>,
}

/// Dialect that plays back scripted outcomes and records every statement.
///
/// Once the script runs out, statements succeed: one affected row, increasing
/// generated keys and no rows.
#[derive(Debug, Default)]
pub struct ScriptedDialect {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    created_tables: Mutex<Vec<String>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    next_id: AtomicI64,
}

impl ScriptedDialect {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn created_tables(&self) -> Vec<String> {
        self.created_tables.lock().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn next_step(&self, sql: &str, params: &[QueryParameter]) -> Option<Step> {
        self.calls.lock().push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.steps.lock().pop_front()
    }
}

fn failure(step: Step) -> std::result::Result<Step, ScriptError> {
    match step {
        Step::Transient => Err(ScriptError::Transient(io::Error::from(io::ErrorKind::ConnectionReset))),
        Step::Constraint => Err(ScriptError::Constraint),
        Step::Fatal => Err(ScriptError::Fatal),
        other => Ok(other),
    }
}

impl Dialect for ScriptedDialect {
    type Connection = usize;
    type Param = QueryParameter;
    type Error = ScriptError;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self) -> std::result::Result<usize, ScriptError> {
        Ok(self.opens.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn close(&self, _connection: usize) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn check_or_create_table(&self, _connection: &mut usize, schema: &TableSchema) -> std::result::Result<(), ScriptError> {
        self.created_tables.lock().push(schema.table_name().to_string());
        Ok(())
    }

    fn convert_parameter(&self, parameter: &QueryParameter) -> QueryParameter {
        parameter.clone()
    }

    fn is_constraint_violation(&self, error: &ScriptError) -> bool {
        matches!(error, ScriptError::Constraint)
    }

    fn execute(&self, _connection: &mut usize, sql: &str, params: &[QueryParameter]) -> std::result::Result<i64, ScriptError> {
        match self.next_step(sql, params).map(failure).transpose()? {
            Some(Step::Affected(n)) | Some(Step::Id(n)) => Ok(n),
            Some(Step::Rows(rows)) => Ok(rows.len() as i64),
            _ => Ok(1),
        }
    }

    fn execute_returning_id(
        &self,
        _connection: &mut usize,
        sql: &str,
        params: &[QueryParameter],
    ) -> std::result::Result<i64, ScriptError> {
        match self.next_step(sql, params).map(failure).transpose()? {
            Some(Step::Id(id)) | Some(Step::Affected(id)) => Ok(id),
            _ => Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }

    fn query(
        &self,
        _connection: &mut usize,
        sql: &str,
        params: &[QueryParameter],
    ) -> std::result::Result<Vec<Vec<Value>>, ScriptError> {
        match self.next_step(sql, params).map(failure).transpose()? {
            Some(Step::Rows(rows)) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }
}

/// Backend over a [`ScriptedDialect`] that retries without sleeping.
pub fn scripted_backend(steps: Vec<Step>) -> SqlBackend<ScriptedDialect> {
    SqlBackend::new(ScriptedDialect::new(steps)).with_retry(RetryPolicy::immediate(Some(5)))
}

/// Object database over a private in-memory SQLite database.
pub fn memory_database() -> ObjectDatabase<SqlBackend<SqliteDialect>> {
    let dialect = SqliteDialect::in_memory().unwrap();
    ObjectDatabase::new(SqlBackend::new(dialect).with_retry(RetryPolicy::immediate(Some(3))))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("rowbind=debug"))
        .with_test_writer()
        .try_init();
}
