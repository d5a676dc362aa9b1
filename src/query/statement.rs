//! Bound SQL statements.
//!
//! A [`Statement`] carries SQL text with `?` placeholders, the values bound to
//! them, and an escaped literal rendering of the same statement that is only
//! used for logs and `Display`.

use crate::error::{DbError, DbResult};
use crate::models::{Record, Value};
use crate::schema::{EntitySchema, FieldDescriptor, Predicate};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    rendered: String,
}

impl Statement {
    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            rendered: sql.clone(),
            sql,
            params: Vec::new(),
        }
    }

    /// SQL with `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// SQL with escaped literals in place of placeholders.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered)
    }
}

/// Accumulates the bound and rendered forms side by side.
#[derive(Debug, Default)]
pub(crate) struct StatementBuilder {
    sql: String,
    params: Vec<Value>,
    rendered: String,
}

impl StatementBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self.rendered.push_str(text);
        self
    }

    pub(crate) fn push_value(&mut self, field: &FieldDescriptor, value: &Value) -> &mut Self {
        self.sql.push('?');
        self.rendered.push_str(&field.serialize(value));
        self.params.push(field.normalize(value));
        self
    }

    pub(crate) fn push_predicate(&mut self, predicate: &Predicate) -> &mut Self {
        self.sql.push_str(&predicate.placeholder_sql());
        self.rendered.push_str(&predicate.fragment());
        self.params.push(predicate.value().clone());
        self
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
            rendered: self.rendered,
        }
    }
}

/// `INSERT INTO <table> (<populated columns>) VALUES (...)`.
///
/// Attributes without a descriptor are skipped with a warning.
pub fn insert(schema: &EntitySchema, record: &Record) -> DbResult<Statement> {
    let mut columns = Vec::with_capacity(record.len());
    for (attr, value) in record.iter() {
        match schema.field(attr) {
            Some(field) => columns.push((field, value)),
            None => warn!(
                table = %schema.table(),
                attribute = %attr,
                "Record has no field named '{}', skipping it",
                attr
            ),
        }
    }

    if columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "record has no columns to insert into '{}'",
            schema.table()
        )));
    }

    let mut b = StatementBuilder::new();
    b.push("INSERT INTO ").push(&schema.quoted_table()).push(" (");
    for (i, (field, _)) in columns.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push(&field.quoted_name());
    }
    b.push(") VALUES (");
    for (i, (field, value)) in columns.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push_value(field, value);
    }
    b.push(")");
    Ok(b.finish())
}

/// `UPDATE <table> SET ... WHERE <primary key>`, keyed by the record's
/// current primary-key values. `None` when there is nothing to change.
pub fn update_by_primary_key(
    schema: &EntitySchema,
    record: &Record,
    changes: &Record,
) -> DbResult<Option<Statement>> {
    let mut sets = Vec::with_capacity(changes.len());
    for (attr, value) in changes.iter() {
        match schema.field(attr) {
            Some(field) => sets.push((field, value)),
            None => warn!(
                table = %schema.table(),
                attribute = %attr,
                "Update names unknown field '{}', skipping it",
                attr
            ),
        }
    }
    if sets.is_empty() {
        return Ok(None);
    }

    let mut keys = Vec::with_capacity(schema.primary_key().len());
    for (attr, field) in schema.primary_key_fields() {
        let value = record.get(attr).ok_or_else(|| {
            DbError::invalid_input(format!(
                "record is missing primary key '{}' of '{}'",
                attr,
                schema.table()
            ))
        })?;
        keys.push(field.eq(value.clone()));
    }

    let mut b = StatementBuilder::new();
    b.push("UPDATE ").push(&schema.quoted_table()).push(" SET ");
    for (i, (field, value)) in sets.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push(&field.quoted_name()).push(" = ").push_value(field, value);
    }
    b.push(" WHERE ");
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            b.push(" AND ");
        }
        b.push_predicate(key);
    }
    Ok(Some(b.finish()))
}
