//! Query building blocks shared by every backend

pub mod filter;
pub mod parameter;

pub use filter::{ColumnFilter, Filter, RenderedFilter};
pub use parameter::QueryParameter;
