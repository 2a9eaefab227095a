//! Filter expressions
//!
//! A [`Filter`] is a small, backend-agnostic predicate tree. Rendering turns it
//! into a parameterized `WHERE` suffix plus the parameters it references, using
//! the dialect's identifier quoting and placeholder conventions.

use super::parameter::QueryParameter;
use crate::value::Value;
use std::ops::{BitAnd, BitOr};

/// Predicate over the columns of one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    Empty,
    Equals { column: String, value: Value },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

/// Builder handle for predicates on one column.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    column: String,
}

impl ColumnFilter {
    /// `column = value`; a null value renders as `IS NULL`.
    pub fn is_equal_to(self, value: impl Into<Value>) -> Filter {
        Filter::Equals {
            column: self.column,
            value: value.into(),
        }
    }

    pub fn is_null(self) -> Filter {
        Filter::Equals {
            column: self.column,
            value: Value::Null,
        }
    }
}

/// Rendered filter: statement suffix and its parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedFilter {
    /// Empty, or ` WHERE ...`
    pub text: String,
    pub parameters: Vec<QueryParameter>,
}

impl Filter {
    pub fn empty() -> Self {
        Filter::Empty
    }

    pub fn column(column: impl Into<String>) -> ColumnFilter {
        ColumnFilter {
            column: column.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Empty => true,
            Filter::Equals { .. } => false,
            Filter::And(parts) | Filter::Or(parts) => parts.iter().all(Filter::is_empty),
        }
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::Empty => other,
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            _ if other.is_empty() => self,
            _ => Filter::And(vec![self, other]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Empty => other,
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            _ if other.is_empty() => self,
            _ => Filter::Or(vec![self, other]),
        }
    }

    /// Render to a `WHERE` suffix.
    ///
    /// `quote` quotes identifiers and `placeholder` turns a bare parameter name
    /// into its placeholder text. Parameters are named `whereparam1`,
    /// `whereparam2`, ... in rendering order.
    pub fn render(&self, quote: impl Fn(&str) -> String, placeholder: impl Fn(&str) -> String) -> RenderedFilter {
        let mut parameters = Vec::new();
        let mut text = String::new();
        self.render_into(&mut text, &mut parameters, &quote, &placeholder);
        if text.is_empty() {
            return RenderedFilter::default();
        }
        RenderedFilter {
            text: format!(" WHERE {}", text),
            parameters,
        }
    }

    fn render_into(
        &self,
        out: &mut String,
        parameters: &mut Vec<QueryParameter>,
        quote: &dyn Fn(&str) -> String,
        placeholder: &dyn Fn(&str) -> String,
    ) {
        match self {
            Filter::Empty => {}
            Filter::Equals { column, value } if value.is_null() => {
                out.push_str(&format!("{} IS NULL", quote(column)));
            }
            Filter::Equals { column, value } => {
                let name = placeholder(&format!("whereparam{}", parameters.len() + 1));
                out.push_str(&format!("{} = {}", quote(column), name));
                parameters.push(QueryParameter::from_value(name, value.clone()));
            }
            Filter::And(parts) => render_group(parts, " AND ", out, parameters, quote, placeholder),
            Filter::Or(parts) => render_group(parts, " OR ", out, parameters, quote, placeholder),
        }
    }
}

fn render_group(
    parts: &[Filter],
    separator: &str,
    out: &mut String,
    parameters: &mut Vec<QueryParameter>,
    quote: &dyn Fn(&str) -> String,
    placeholder: &dyn Fn(&str) -> String,
) {
    let rendered: Vec<String> = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut text = String::new();
            part.render_into(&mut text, parameters, quote, placeholder);
            text
        })
        .collect();

    match rendered.len() {
        0 => {}
        1 => out.push_str(&rendered[0]),
        _ => {
            out.push('(');
            out.push_str(&rendered.join(separator));
            out.push(')');
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Empty
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}
