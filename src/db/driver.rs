//! Raw driver connections.
//!
//! One concrete sqlx connection per backend, dispatched through
//! [`impl_db_dispatch!`](crate::impl_db_dispatch). Every statement runs inside
//! its own driver transaction which is committed before returning.

use crate::config::PoolConfig;
use crate::db::DatabaseType;
use crate::db::types::RowToValues;
use crate::error::DbResult;
use crate::models::Row;
use crate::query::Statement;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use tracing::debug;

/// A single open connection to either backend.
#[derive(Debug)]
pub enum DriverConnection {
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

impl DriverConnection {
    /// Open a new connection from the pool configuration.
    pub async fn open(config: &PoolConfig) -> DbResult<Self> {
        match config.driver {
            DatabaseType::MySql => {
                let mut options = MySqlConnectOptions::new()
                    .host(&config.host)
                    .port(config.port)
                    .username(&config.user)
                    .password(&config.password)
                    .charset(&config.charset);
                if !config.database.is_empty() {
                    options = options.database(&config.database);
                }
                let conn = options.connect().await?;
                Ok(Self::MySql(conn))
            }
            DatabaseType::SQLite => {
                let options = if config.database.is_empty() || config.database == ":memory:" {
                    SqliteConnectOptions::from_str("sqlite::memory:")?
                } else {
                    SqliteConnectOptions::new()
                        .filename(&config.database)
                        .create_if_missing(true)
                };
                let conn = options.connect().await?;
                Ok(Self::SQLite(conn))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        impl_db_dispatch!(self, {
            MySql(_c) => DatabaseType::MySql,
            SQLite(_c) => DatabaseType::SQLite,
        })
    }

    /// Fetch every row of a statement and commit.
    pub async fn fetch_all(&mut self, stmt: &Statement) -> DbResult<Vec<Row>> {
        debug!(sql = %stmt.sql(), params = stmt.params().len(), "fetch_all");
        impl_db_dispatch!(self, {
            MySql(c) => mysql::fetch_all(c, stmt).await,
            SQLite(c) => sqlite::fetch_all(c, stmt).await,
        })
    }

    /// Execute a statement, commit, and return the affected row count.
    pub async fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        debug!(sql = %stmt.sql(), params = stmt.params().len(), "execute");
        impl_db_dispatch!(self, {
            MySql(c) => mysql::execute(c, stmt).await,
            SQLite(c) => sqlite::execute(c, stmt).await,
        })
    }

    /// Issue a bare `ROLLBACK`.
    pub async fn rollback(&mut self) -> DbResult<()> {
        use sqlx::Executor;
        impl_db_dispatch!(self, {
            MySql(c) => c.execute("ROLLBACK").await.map(|_| ())?,
            SQLite(c) => c.execute("ROLLBACK").await.map(|_| ())?,
        });
        Ok(())
    }

    pub async fn ping(&mut self) -> DbResult<()> {
        impl_db_dispatch!(self, {
            MySql(c) => c.ping().await?,
            SQLite(c) => c.ping().await?,
        });
        Ok(())
    }

    /// Gracefully close the connection.
    pub async fn close(self) -> DbResult<()> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await?,
            SQLite(c) => c.close().await?,
        });
        Ok(())
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// The two modules are kept parallel so differences stand out.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_value;

    pub async fn fetch_all(conn: &mut MySqlConnection, stmt: &Statement) -> DbResult<Vec<Row>> {
        let mut tx = conn.begin().await?;
        // Without params, run raw SQL to avoid prepared statement issues
        let rows = if stmt.params().is_empty() {
            use sqlx::Executor;
            (&mut *tx).fetch_all(stmt.sql()).await?
        } else {
            let mut query = sqlx::query(stmt.sql());
            for value in stmt.params() {
                query = bind_mysql_value(query, value);
            }
            query.fetch_all(&mut *tx).await?
        };
        tx.commit().await?;
        Ok(rows.iter().map(RowToValues::to_value_map).collect())
    }

    pub async fn execute(conn: &mut MySqlConnection, stmt: &Statement) -> DbResult<u64> {
        let mut tx = conn.begin().await?;
        let result = if stmt.params().is_empty() {
            use sqlx::Executor;
            (&mut *tx).execute(stmt.sql()).await?
        } else {
            let mut query = sqlx::query(stmt.sql());
            for value in stmt.params() {
                query = bind_mysql_value(query, value);
            }
            query.execute(&mut *tx).await?
        };
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_value;

    pub async fn fetch_all(conn: &mut SqliteConnection, stmt: &Statement) -> DbResult<Vec<Row>> {
        let mut tx = conn.begin().await?;
        let rows = if stmt.params().is_empty() {
            use sqlx::Executor;
            (&mut *tx).fetch_all(stmt.sql()).await?
        } else {
            let mut query = sqlx::query(stmt.sql());
            for value in stmt.params() {
                query = bind_sqlite_value(query, value);
            }
            query.fetch_all(&mut *tx).await?
        };
        tx.commit().await?;
        Ok(rows.iter().map(RowToValues::to_value_map).collect())
    }

    pub async fn execute(conn: &mut SqliteConnection, stmt: &Statement) -> DbResult<u64> {
        let mut tx = conn.begin().await?;
        let result = if stmt.params().is_empty() {
            use sqlx::Executor;
            (&mut *tx).execute(stmt.sql()).await?
        } else {
            let mut query = sqlx::query(stmt.sql());
            for value in stmt.params() {
                query = bind_sqlite_value(query, value);
            }
            query.execute(&mut *tx).await?
        };
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
