//! Chainable SELECT construction over an [`EntitySchema`].

use crate::db::{ConnectionPool, PooledConnection};
use crate::error::{DbError, DbResult};
use crate::models::{Entity, Record, Row, Value};
use crate::query::statement::{Statement, StatementBuilder};
use crate::schema::{EntitySchema, OrderBy, Predicate};
use tracing::debug;

/// Emitted for OFFSET without LIMIT; both MySQL and SQLite accept it.
const UNBOUNDED_LIMIT: u64 = i64::MAX as u64;

/// A SELECT under construction.
///
/// Nothing touches the database until [`all`](Self::all),
/// [`first`](Self::first) or [`count`](Self::count) consumes the builder.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    schema: &'a EntitySchema,
    pool: &'a ConnectionPool,
    predicates: Vec<Predicate>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a EntitySchema, pool: &'a ConnectionPool) -> Self {
        Self {
            schema,
            pool,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// AND the predicates onto any earlier filter.
    pub fn filter(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// Append sort keys after any earlier ones.
    pub fn order_by(mut self, orders: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order.extend(orders);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn schema(&self) -> &'a EntitySchema {
        self.schema
    }

    /// The bound SELECT this builder will run.
    pub fn statement(&self) -> Statement {
        let mut b = StatementBuilder::new();
        b.push("SELECT ");
        for (i, (_, field)) in self.schema.fields().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push(&field.quoted_name());
        }
        b.push(" FROM ").push(&self.schema.quoted_table());
        self.push_where(&mut b);

        if !self.order.is_empty() {
            let order: Vec<String> = self.order.iter().map(OrderBy::fragment).collect();
            b.push(" ORDER BY ").push(&order.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                b.push(&format!(" LIMIT {}", limit));
                if let Some(offset) = offset {
                    b.push(&format!(" OFFSET {}", offset));
                }
            }
            (None, Some(offset)) => {
                b.push(&format!(" LIMIT {} OFFSET {}", UNBOUNDED_LIMIT, offset));
            }
            (None, None) => {}
        }
        b.finish()
    }

    /// Literal rendering of the SELECT, for logs and debugging.
    pub fn to_sql(&self) -> String {
        self.statement().rendered().to_string()
    }

    /// Run the query and map every row onto a [`Record`].
    pub async fn all(self) -> DbResult<Vec<Record>> {
        let stmt = self.statement();
        debug!(table = %self.schema.table(), sql = %stmt, "Running query");

        let conn = self.pool.acquire().await?;
        let rows = fetch(conn, stmt).await?;
        Ok(rows.into_iter().map(|row| self.materialize(row)).collect())
    }

    /// The first matching record, or `NotFound`.
    pub async fn first(self) -> DbResult<Record> {
        let table = self.schema.table().to_string();
        self.limit(1)
            .all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(table))
    }

    pub async fn all_as<E: Entity>(self) -> DbResult<Vec<E>> {
        self.all().await?.iter().map(E::from_record).collect()
    }

    pub async fn first_as<E: Entity>(self) -> DbResult<E> {
        E::from_record(&self.first().await?)
    }

    /// Number of rows matching the filter. Ordering and paging are ignored.
    pub async fn count(self) -> DbResult<u64> {
        let mut b = StatementBuilder::new();
        b.push("SELECT COUNT(*) AS `count` FROM ")
            .push(&self.schema.quoted_table());
        self.push_where(&mut b);
        let stmt = b.finish();

        let conn = self.pool.acquire().await?;
        let rows = fetch(conn, stmt).await?;
        match rows.first().and_then(|row| row.get("count")) {
            Some(Value::Int(n)) => Ok((*n).max(0) as u64),
            Some(Value::Float(n)) => Ok(n.max(0.0) as u64),
            other => Err(DbError::internal(format!(
                "COUNT(*) returned unexpected value {:?}",
                other
            ))),
        }
    }

    fn push_where(&self, b: &mut StatementBuilder) {
        for (i, predicate) in self.predicates.iter().enumerate() {
            b.push(if i == 0 { " WHERE " } else { " AND " });
            b.push_predicate(predicate);
        }
    }

    fn materialize(&self, mut row: Row) -> Record {
        let mut record = Record::new();
        for (attr, field) in self.schema.fields() {
            if let Some(value) = row.remove(field.name()) {
                record.set(attr, field.coerce(value));
            }
        }
        record
    }
}

async fn fetch(conn: PooledConnection, stmt: Statement) -> DbResult<Vec<Row>> {
    conn.scoped(move |c| Box::pin(async move { c.select_statement(&stmt).await }))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::schema::FieldDescriptor;

    fn schema() -> EntitySchema {
        EntitySchema::builder("user")
            .field("id_", FieldDescriptor::int("id").primary_key())
            .field("name", FieldDescriptor::string("name"))
            .build()
            .unwrap()
    }

    fn pool() -> ConnectionPool {
        ConnectionPool::new(PoolConfig::sqlite(":memory:"))
    }

    #[test]
    fn test_select_all_columns() {
        let (schema, pool) = (schema(), pool());
        assert_eq!(
            schema.query(&pool).to_sql(),
            "SELECT `id`, `name` FROM `user`"
        );
    }

    #[test]
    fn test_clause_order_is_fixed() {
        let (schema, pool) = (schema(), pool());
        let id = schema.field("id_").unwrap();
        let stmt = schema
            .query(&pool)
            .offset(5)
            .limit(10)
            .order_by([id.desc()])
            .filter([id.gt(1)])
            .statement();
        assert_eq!(
            stmt.sql(),
            "SELECT `id`, `name` FROM `user` WHERE `id` > ? ORDER BY `id` DESC LIMIT 10 OFFSET 5"
        );
        assert_eq!(stmt.params(), [Value::Int(1)]);
    }

    #[test]
    fn test_filters_merge_into_one_where() {
        let (schema, pool) = (schema(), pool());
        let id = schema.field("id_").unwrap();
        let name = schema.field("name").unwrap();
        let sql = schema
            .query(&pool)
            .filter([id.eq(1)])
            .filter([name.like("a%").unwrap()])
            .to_sql();
        assert_eq!(
            sql,
            "SELECT `id`, `name` FROM `user` WHERE `id` = 1 AND `name` LIKE 'a%'"
        );
        assert_eq!(sql.matches("WHERE").count(), 1);
    }

    #[test]
    fn test_order_by_accumulates_and_limit_last_wins() {
        let (schema, pool) = (schema(), pool());
        let id = schema.field("id_").unwrap();
        let name = schema.field("name").unwrap();
        let sql = schema
            .query(&pool)
            .order_by([name.asc()])
            .order_by([id.desc()])
            .limit(3)
            .limit(1)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT `id`, `name` FROM `user` ORDER BY `name` ASC, `id` DESC LIMIT 1"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let (schema, pool) = (schema(), pool());
        assert_eq!(
            schema.query(&pool).offset(2).to_sql(),
            "SELECT `id`, `name` FROM `user` LIMIT 9223372036854775807 OFFSET 2"
        );
    }

    #[test]
    fn test_injection_is_bound_not_spliced() {
        let (schema, pool) = (schema(), pool());
        let name = schema.field("name").unwrap();
        let q = schema.query(&pool).filter([name.eq("x' OR '1'='1")]);
        assert_eq!(
            q.statement().sql(),
            "SELECT `id`, `name` FROM `user` WHERE `name` = ?"
        );
        assert!(q.to_sql().ends_with("WHERE `name` = 'x'' OR ''1''=''1'"));
    }

    #[test]
    fn test_materialize_ignores_unknown_columns() {
        let (schema, pool) = (schema(), pool());
        let q = schema.query(&pool);
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(7));
        row.insert("extra".to_string(), Value::from("ignored"));
        let record = q.materialize(row);
        assert_eq!(record.get("id_"), Some(&Value::Int(7)));
        assert_eq!(record.len(), 1);
    }
}
