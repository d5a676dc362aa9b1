//! Schema-agnostic records and the typed `Entity` bridge.

use crate::db::{ConnectionPool, PooledConnection};
use crate::error::DbResult;
use crate::models::Value;
use crate::query::QueryBuilder;
use crate::schema::EntitySchema;
use serde::{Serialize, Serializer};
use serde::ser::SerializeMap;
use std::collections::HashMap;
use std::future::Future;

/// One row's worth of attribute values.
///
/// Attributes keep the order in which they were first set; that order drives
/// the column list of an INSERT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Value>,
    populated: Vec<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attr, value);
        self
    }

    /// Set an attribute. New attributes are appended to the populated list.
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<Value>) {
        let attr = attr.into();
        if !self.values.contains_key(&attr) {
            self.populated.push(attr.clone());
        }
        self.values.insert(attr, value.into());
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.values.get(attr)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.values.contains_key(attr)
    }

    /// Populated attribute names in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.populated.iter().map(String::as_str)
    }

    /// Attribute/value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.populated
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.populated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.populated.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

/// A typed struct mapped to one table through a registered schema.
///
/// Implementors usually keep the schema in a `OnceLock` so it is built and
/// validated once.
pub trait Entity: Sized {
    fn schema() -> &'static EntitySchema;

    fn from_record(record: &Record) -> DbResult<Self>;

    fn to_record(&self) -> Record;

    /// Start a query over this entity's table.
    fn query(pool: &ConnectionPool) -> QueryBuilder<'_> {
        QueryBuilder::new(Self::schema(), pool)
    }

    /// Fetch one entity by its single-column primary key.
    fn get(
        pool: &ConnectionPool,
        key: impl Into<Value> + Send,
    ) -> impl Future<Output = DbResult<Self>> + Send
    where
        Self: Send,
    {
        let key = key.into();
        async move {
            let record = Self::schema().get(pool, key).await?;
            Self::from_record(&record)
        }
    }

    /// Insert this entity on `conn`.
    fn insert(&self, conn: &mut PooledConnection) -> impl Future<Output = DbResult<u64>> + Send {
        let record = self.to_record();
        async move { conn.insert(Self::schema(), &record).await }
    }
}
