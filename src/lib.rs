//! minorm
//!
//! A small data-access layer for MySQL and SQLite: a bounded pool of expiring
//! connections plus a schema-driven query builder.
//!
//! ```ignore
//! let pool = ConnectionPool::new(PoolConfig::sqlite("app.db"));
//! let user = EntitySchema::builder("user")
//!     .field("id_", FieldDescriptor::int("id").primary_key())
//!     .field("name", FieldDescriptor::string("name"))
//!     .build()?;
//! let id = user.field("id_").unwrap();
//! let row = user.query(&pool).filter([id.eq(1)]).first().await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod schema;

pub use config::{Config, PoolConfig};
pub use db::{ConnectionPool, Database, DatabaseType, PooledConnection};
pub use error::{DbError, DbResult};
pub use models::{Entity, Record, Row, Value};
pub use query::{QueryBuilder, Statement};
pub use schema::{Direction, EntitySchema, FieldDescriptor, FieldType, Operator, OrderBy, Predicate};
