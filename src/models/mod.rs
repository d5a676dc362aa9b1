//! Data models for minorm.
//!
//! This module re-exports the value and record types shared by the pool and
//! the query builder.

pub mod record;
pub mod value;

// Re-export commonly used types
pub use record::{Entity, Record};
pub use value::{DATETIME_FORMAT, Row, Value, parse_datetime, truncate_to_seconds};
