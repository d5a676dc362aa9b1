//! Pooled connections.
//!
//! A [`PooledConnection`] exclusively owns one driver connection until it is
//! released. Dropping it without `release()` returns it through the same
//! policy, minus the graceful close.

use crate::db::DatabaseType;
use crate::db::driver::DriverConnection;
use crate::db::pool::{Idle, SharedPool, close_quietly};
use crate::error::{DbError, DbResult};
use crate::models::{Record, Row};
use crate::query::{self, Statement};
use crate::schema::EntitySchema;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct PooledConnection {
    /// `None` only once returned to the pool.
    raw: Option<DriverConnection>,
    id: u64,
    created: Instant,
    pool: Arc<SharedPool>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("age", &self.age())
            .field("released", &self.raw.is_none())
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub(crate) fn from_idle(idle: Idle, pool: Arc<SharedPool>) -> Self {
        Self {
            raw: Some(idle.raw),
            id: idle.id,
            created: idle.created,
            pool,
        }
    }

    /// Pool-unique identifier, stable across reuse.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// True once the connection has outlived the pool's TTL.
    pub fn is_dead(&self) -> bool {
        self.age() >= self.pool.ttl()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.driver()
    }

    fn raw(&mut self) -> DbResult<&mut DriverConnection> {
        self.raw
            .as_mut()
            .ok_or_else(|| DbError::internal("connection already returned to the pool"))
    }

    /// Run a query and return every row.
    pub async fn select(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        self.select_statement(&Statement::raw(sql)).await
    }

    pub async fn select_statement(&mut self, stmt: &Statement) -> DbResult<Vec<Row>> {
        debug!(connection_id = self.id, sql = %stmt, "select");
        self.raw()?.fetch_all(stmt).await
    }

    /// Run a statement and return the affected row count.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        self.execute_statement(&Statement::raw(sql)).await
    }

    pub async fn execute_statement(&mut self, stmt: &Statement) -> DbResult<u64> {
        debug!(connection_id = self.id, sql = %stmt, "execute");
        self.raw()?.execute(stmt).await
    }

    /// Insert the attributes the record has set.
    pub async fn insert(&mut self, schema: &EntitySchema, record: &Record) -> DbResult<u64> {
        let stmt = query::insert(schema, record)?;
        self.execute_statement(&stmt).await
    }

    /// Update the row identified by the record's current primary key.
    ///
    /// Returns `None` without touching the database when `changes` names no
    /// known field. When a row was updated the changes are applied to `record`.
    pub async fn update_by_primary_key(
        &mut self,
        schema: &EntitySchema,
        record: &mut Record,
        changes: &Record,
    ) -> DbResult<Option<u64>> {
        let Some(stmt) = query::update_by_primary_key(schema, record, changes)? else {
            debug!(table = %schema.table(), "Nothing to update");
            return Ok(None);
        };
        let affected = self.execute_statement(&stmt).await?;
        if affected == 0 {
            debug!(table = %schema.table(), "No row matched the primary key");
            return Ok(Some(0));
        }
        for (attr, value) in changes.iter() {
            if schema.field(attr).is_some() {
                record.set(attr, value.clone());
            }
        }
        Ok(Some(affected))
    }

    pub async fn ping(&mut self) -> DbResult<()> {
        self.raw()?.ping().await
    }

    /// Issue a bare `ROLLBACK` on the connection.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.raw()?.rollback().await
    }

    /// Run `f` against this connection, then return it to the pool.
    ///
    /// No transaction is opened on entry. When `f` fails a `ROLLBACK` is
    /// issued first and `f`'s error is returned.
    ///
    /// ```ignore
    /// let rows = pool
    ///     .acquire()
    ///     .await?
    ///     .scoped(|conn| Box::pin(async move { conn.select("SELECT 1").await }))
    ///     .await?;
    /// ```
    pub async fn scoped<T, F>(mut self, f: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut PooledConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        let result = f(&mut self).await;
        if let Err(e) = &result {
            debug!(connection_id = self.id, error = %e, "Scoped block failed, rolling back");
            if let Err(rollback_err) = self.rollback().await {
                debug!(connection_id = self.id, error = %rollback_err, "Rollback failed");
            }
        }
        let released = self.release().await;
        match (result, released) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Return the connection to the pool, closing it when expired or when the
    /// idle queue is full.
    pub async fn release(mut self) -> DbResult<()> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let idle = Idle {
            raw,
            id: self.id,
            created: self.created,
        };
        if let Some(idle) = self.pool.try_enqueue(idle)? {
            close_quietly(idle.raw, idle.id).await;
        }
        Ok(())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        let idle = Idle {
            raw,
            id: self.id,
            created: self.created,
        };
        match self.pool.try_enqueue(idle) {
            Ok(None) => debug!(
                connection_id = self.id,
                "Connection returned via Drop - consider using explicit release()"
            ),
            // dropping the driver connection closes the socket
            Ok(Some(_closed)) => {}
            Err(e) => warn!(connection_id = self.id, error = %e, "Failed to return connection"),
        }
    }
}
