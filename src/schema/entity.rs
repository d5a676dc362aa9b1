//! Entity schemas: the descriptor registry for one record type.

use crate::db::ConnectionPool;
use crate::error::{DbError, DbResult};
use crate::models::{Record, Value};
use crate::query::QueryBuilder;
use crate::schema::field::{FieldDescriptor, quote_identifier};
use std::collections::HashMap;
use tracing::debug;

/// Immutable mapping between a table and a record type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    table: String,
    /// (attribute, descriptor) in declaration order
    fields: Vec<(String, FieldDescriptor)>,
    by_attribute: HashMap<String, usize>,
    /// column name -> attribute name
    by_column: HashMap<String, String>,
    primary_key: Vec<String>,
}

impl EntitySchema {
    /// Start declaring the schema for `table`.
    pub fn builder(table: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn quoted_table(&self) -> String {
        quote_identifier(&self.table)
    }

    /// Descriptors in declaration order, with their attribute names.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(attr, f)| (attr.as_str(), f))
    }

    pub fn field(&self, attr: &str) -> Option<&FieldDescriptor> {
        self.by_attribute.get(attr).map(|&idx| &self.fields[idx].1)
    }

    /// Attribute name bound to a column.
    pub fn attribute_for_column(&self, column: &str) -> Option<&str> {
        self.by_column.get(column).map(String::as_str)
    }

    /// Column name bound to an attribute.
    pub fn column_for_attribute(&self, attr: &str) -> Option<&str> {
        self.field(attr).map(FieldDescriptor::name)
    }

    /// Primary-key column names.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Primary-key (attribute, descriptor) pairs.
    pub fn primary_key_fields(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields().filter(|(_, f)| f.is_primary_key())
    }

    /// The record's value for `attr`, falling back to the descriptor default.
    pub fn value_or_default(&self, record: &Record, attr: &str) -> Option<Value> {
        let field = self.field(attr)?;
        Some(record.get(attr).cloned().unwrap_or_else(|| field.default()))
    }

    /// Start a SELECT over every column of this schema.
    pub fn query<'a>(&'a self, pool: &'a ConnectionPool) -> QueryBuilder<'a> {
        QueryBuilder::new(self, pool)
    }

    /// Fetch one record by its single-column primary key.
    pub async fn get(&self, pool: &ConnectionPool, key: impl Into<Value>) -> DbResult<Record> {
        let (_, pk) = self.single_primary_key()?;
        self.query(pool).filter([pk.eq(key)]).first().await
    }

    fn single_primary_key(&self) -> DbResult<(&str, &FieldDescriptor)> {
        if self.primary_key.len() != 1 {
            return Err(DbError::schema(
                format!(
                    "get() needs exactly one primary key column, found {}",
                    self.primary_key.len()
                ),
                &self.table,
            ));
        }
        self.primary_key_fields()
            .next()
            .ok_or_else(|| DbError::internal("primary key descriptor missing"))
    }
}

/// Collects field declarations and validates them into an [`EntitySchema`].
#[derive(Debug)]
pub struct EntitySchemaBuilder {
    table: String,
    fields: Vec<(String, FieldDescriptor)>,
}

impl EntitySchemaBuilder {
    /// Declare an attribute and its column descriptor.
    pub fn field(mut self, attr: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((attr.into(), descriptor));
        self
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> DbResult<EntitySchema> {
        let table = self.table.trim().to_string();
        if table.is_empty() {
            return Err(DbError::schema("table name cannot be empty", "<unnamed>"));
        }

        let mut by_attribute = HashMap::with_capacity(self.fields.len());
        let mut by_column = HashMap::with_capacity(self.fields.len());
        let mut primary_key = Vec::new();

        for (idx, (attr, field)) in self.fields.iter().enumerate() {
            if field.name().is_empty() {
                return Err(DbError::schema(
                    format!("attribute '{}' has an empty column name", attr),
                    &table,
                ));
            }
            if by_attribute.insert(attr.clone(), idx).is_some() {
                return Err(DbError::schema(
                    format!("duplicate attribute '{}'", attr),
                    &table,
                ));
            }
            if by_column
                .insert(field.name().to_string(), attr.clone())
                .is_some()
            {
                return Err(DbError::schema(
                    format!("duplicate column '{}'", field.name()),
                    &table,
                ));
            }
            if field.is_primary_key() {
                primary_key.push(field.name().to_string());
            }
        }

        if primary_key.is_empty() {
            return Err(DbError::schema(
                "a table needs at least one primary key field",
                &table,
            ));
        }

        debug!(
            table = %table,
            fields = self.fields.len(),
            primary_key = ?primary_key,
            "Registered entity schema"
        );

        Ok(EntitySchema {
            table,
            fields: self.fields,
            by_attribute,
            by_column,
            primary_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> EntitySchema {
        EntitySchema::builder("tt.user")
            .field("id_", FieldDescriptor::int("id").primary_key())
            .field("name", FieldDescriptor::string("name").default_value("nobody"))
            .field("create_time", FieldDescriptor::datetime("create_time"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_attribute_column_translation() {
        let schema = user_schema();
        assert_eq!(schema.table(), "tt.user");
        assert_eq!(schema.quoted_table(), "`tt`.`user`");
        assert_eq!(schema.attribute_for_column("id"), Some("id_"));
        assert_eq!(schema.column_for_attribute("id_"), Some("id"));
        assert_eq!(schema.attribute_for_column("missing"), None);
        assert_eq!(schema.primary_key(), ["id".to_string()]);

        let attrs: Vec<&str> = schema.fields().map(|(a, _)| a).collect();
        assert_eq!(attrs, vec!["id_", "name", "create_time"]);
    }

    #[test]
    fn test_missing_primary_key_fails() {
        let result = EntitySchema::builder("log")
            .field("message", FieldDescriptor::string("message"))
            .build();
        match result {
            Err(DbError::Schema { object, .. }) => assert_eq!(object, "log"),
            other => panic!("expected schema error, got {:?}", other),
        }

        assert!(EntitySchema::builder("empty").build().is_err());
    }

    #[test]
    fn test_duplicate_names_fail() {
        let dup_attr = EntitySchema::builder("t")
            .field("id", FieldDescriptor::int("id").primary_key())
            .field("id", FieldDescriptor::int("other"))
            .build();
        assert!(matches!(dup_attr, Err(DbError::Schema { .. })));

        let dup_column = EntitySchema::builder("t")
            .field("id", FieldDescriptor::int("id").primary_key())
            .field("alias", FieldDescriptor::int("id"))
            .build();
        assert!(matches!(dup_column, Err(DbError::Schema { .. })));
    }

    #[test]
    fn test_empty_table_name_fails() {
        let result = EntitySchema::builder("  ")
            .field("id", FieldDescriptor::int("id").primary_key())
            .build();
        assert!(matches!(result, Err(DbError::Schema { .. })));
    }

    #[test]
    fn test_composite_key() {
        let schema = EntitySchema::builder("membership")
            .field("user_id", FieldDescriptor::int("user_id").primary_key())
            .field("group_id", FieldDescriptor::int("group_id").primary_key())
            .build()
            .unwrap();
        assert_eq!(schema.primary_key().len(), 2);
        assert!(matches!(
            schema.single_primary_key(),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn test_value_or_default() {
        let schema = user_schema();
        let record = Record::new().with("id_", 1);
        assert_eq!(schema.value_or_default(&record, "id_"), Some(Value::Int(1)));
        assert_eq!(
            schema.value_or_default(&record, "name"),
            Some(Value::from("nobody"))
        );
        assert_eq!(schema.value_or_default(&record, "nope"), None);
    }
}
