//! Declarative table metadata.
//!
//! This module provides:
//! - Field descriptors with predicate and literal serialization
//! - Entity schemas binding attribute names to columns

pub mod entity;
pub mod field;

pub use entity::{EntitySchema, EntitySchemaBuilder};
pub use field::{
    Direction, FieldDescriptor, FieldType, Operator, OrderBy, Predicate, quote_identifier,
    quote_literal,
};
