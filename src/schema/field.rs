//! Field descriptors and the predicates they build.
//!
//! A [`FieldDescriptor`] knows one column's name and type. Its comparison
//! methods return [`Predicate`] values that carry the column, operator and a
//! normalized value. Predicates are executed with the value bound as a driver
//! parameter; [`Predicate::fragment`] renders an escaped literal form for
//! logging and debugging only.

use crate::error::{DbError, DbResult};
use crate::models::{DATETIME_FORMAT, Value, parse_datetime, truncate_to_seconds};
use std::fmt;

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Float,
    String,
    DateTime,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Default value used when a descriptor does not declare one.
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Integer => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::Text(String::new()),
            Self::DateTime => Value::Null,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
        };
        write!(f, "{}", name)
    }
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

/// Sort direction of an ORDER BY item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Per-column metadata.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    doc: String,
    default: Option<Value>,
    primary_key: bool,
    field_type: FieldType,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
            default: None,
            primary_key: false,
            field_type,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    /// Mark this column as (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn documentation(&self) -> &str {
        &self.doc
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Declared default, or the type's zero value.
    pub fn default(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.field_type.zero_value())
    }

    /// Backtick-quoted column name.
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }

    pub fn eq(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Eq, value.into())
    }

    pub fn ne(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Ne, value.into())
    }

    pub fn lt(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Lt, value.into())
    }

    pub fn gt(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Gt, value.into())
    }

    pub fn le(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Le, value.into())
    }

    pub fn ge(&self, value: impl Into<Value>) -> Predicate {
        self.predicate(Operator::Ge, value.into())
    }

    /// LIKE pattern match. Only string columns support it.
    pub fn like(&self, pattern: impl Into<String>) -> DbResult<Predicate> {
        if self.field_type != FieldType::String {
            return Err(DbError::invalid_input(format!(
                "LIKE requires a string column, '{}' is {}",
                self.name, self.field_type
            )));
        }
        Ok(self.predicate(Operator::Like, Value::Text(pattern.into())))
    }

    pub fn asc(&self) -> OrderBy {
        OrderBy {
            column: self.quoted_name(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(&self) -> OrderBy {
        OrderBy {
            column: self.quoted_name(),
            direction: Direction::Desc,
        }
    }

    /// Value in the form it is bound to a statement.
    ///
    /// Datetimes become `YYYY-MM-DD HH:MM:SS` text so both backends store and
    /// compare them at second precision.
    pub fn normalize(&self, value: &Value) -> Value {
        match (self.field_type, value) {
            (FieldType::DateTime, Value::DateTime(dt)) => {
                Value::Text(truncate_to_seconds(*dt).format(DATETIME_FORMAT).to_string())
            }
            (FieldType::DateTime, Value::Text(s)) => match parse_datetime(s) {
                Some(dt) => Value::Text(truncate_to_seconds(dt).format(DATETIME_FORMAT).to_string()),
                None => value.clone(),
            },
            _ => value.clone(),
        }
    }

    /// Escaped SQL literal for this column's type.
    pub fn serialize(&self, value: &Value) -> String {
        match self.normalize(value) {
            Value::Null => "NULL".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) if v.is_finite() => v.to_string(),
            // NaN and infinities have no SQL literal
            Value::Float(_) => "NULL".to_string(),
            Value::Text(s) if self.field_type.is_numeric() && is_numeric_literal(&s) => s,
            Value::Text(s) => quote_literal(&s),
            Value::DateTime(dt) => quote_literal(&dt.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Convert a fetched value into this column's type where possible.
    pub fn coerce(&self, value: Value) -> Value {
        match (self.field_type, value) {
            (FieldType::DateTime, Value::Text(s)) => match parse_datetime(&s) {
                Some(dt) => Value::DateTime(truncate_to_seconds(dt)),
                None => Value::Text(s),
            },
            (FieldType::DateTime, Value::DateTime(dt)) => Value::DateTime(truncate_to_seconds(dt)),
            (FieldType::Float, Value::Int(v)) => Value::Float(v as f64),
            (FieldType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Text(s),
            },
            (FieldType::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(v) => Value::Float(v),
                Err(_) => Value::Text(s),
            },
            (FieldType::String, Value::Int(v)) => Value::Text(v.to_string()),
            (_, other) => other,
        }
    }

    fn predicate(&self, op: Operator, value: Value) -> Predicate {
        Predicate {
            column: self.quoted_name(),
            op,
            literal: self.serialize(&value),
            value: self.normalize(&value),
        }
    }
}

/// A single column comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    op: Operator,
    value: Value,
    literal: String,
}

impl Predicate {
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// The bound value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// `<column> <op> <literal>` with the literal escaped.
    pub fn fragment(&self) -> String {
        format!("{} {} {}", self.column, self.op.as_sql(), self.literal)
    }

    /// `<column> <op> ?` for bound execution.
    pub fn placeholder_sql(&self) -> String {
        format!("{} {} ?", self.column, self.op.as_sql())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fragment())
    }
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: String,
    direction: Direction,
}

impl OrderBy {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn fragment(&self) -> String {
        match self.direction {
            Direction::Asc => format!("{} ASC", self.column),
            Direction::Desc => format!("{} DESC", self.column),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fragment())
    }
}

/// Quote an identifier with backticks; `db.table` quotes each segment.
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Single-quote a string literal, doubling quotes and backslashes.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn is_numeric_literal(s: &str) -> bool {
    !s.is_empty() && s.parse::<f64>().map(|v| v.is_finite()).unwrap_or(false)
        && s.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
}
