//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Driver connections for MySQL and SQLite
//! - The bounded, expiring connection pool
//! - Pooled connections with scoped execution
//! - Type mappings and parameter binding
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod connection;
pub mod database;
pub mod driver;
pub mod params;
pub mod pool;
pub mod types;

pub use connection::PooledConnection;
pub use database::Database;
pub use driver::DriverConnection;
pub use macros::DatabaseType;
pub use pool::{ConnectionPool, MIN_ACQUIRE_ATTEMPTS};
