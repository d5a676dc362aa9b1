//! SQL generation.
//!
//! - [`Statement`]: SQL with bound parameters plus a literal debug rendering
//! - [`QueryBuilder`]: chainable SELECT over an entity schema
//! - `insert` / `update_by_primary_key`: write statements for records

pub mod builder;
pub mod statement;

pub use builder::QueryBuilder;
pub use statement::{Statement, insert, update_by_primary_key};
