//! Per-record save outcomes

use serde::Serialize;
use std::fmt;

/// Why one record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The record's type was never registered.
    UnregisteredType,
    /// The statement matched no row, usually a stale primary key.
    NoRowsAffected,
    /// The backend rejected the row on a constraint.
    ConstraintViolation,
    /// The backend returned a non-positive generated key.
    InvalidGeneratedId,
    /// Unpersisted related record that does not allow insertion.
    InsertNotAllowed,
    /// Relation target type was never registered.
    RelationTargetUnregistered,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnregisteredType => "unregistered_type",
            FailureKind::NoRowsAffected => "no_rows_affected",
            FailureKind::ConstraintViolation => "constraint_violation",
            FailureKind::InvalidGeneratedId => "invalid_generated_id",
            FailureKind::InsertNotAllowed => "insert_not_allowed",
            FailureKind::RelationTargetUnregistered => "relation_target_unregistered",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one record inside a backend batch, in input order.
pub type RecordOutcome = std::result::Result<(), FailureKind>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveFailure {
    pub table: String,
    pub record_id: String,
    pub kind: FailureKind,
}

/// Aggregated result of a save call, relation cascades included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// Records written successfully
    pub saved: usize,
    pub failures: Vec<SaveFailure>,
}

impl SaveReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every record of the call, cascades included, was written.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record_success(&mut self) {
        self.saved += 1;
    }

    pub fn record_failure(&mut self, table: impl Into<String>, record_id: impl Into<String>, kind: FailureKind) {
        self.failures.push(SaveFailure {
            table: table.into(),
            record_id: record_id.into(),
            kind,
        });
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: SaveReport) {
        self.saved += other.saved;
        self.failures.extend(other.failures);
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &SaveFailure> {
        self.failures.iter().filter(move |failure| failure.kind == kind)
    }
}

impl fmt::Display for SaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Save Report:")?;
        writeln!(f, "  Saved: {}", self.saved)?;
        write!(f, "  Failed: {}", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n    {} {{{}}}: {}", failure.table, failure.record_id, failure.kind)?;
        }
        Ok(())
    }
}
