//! Process-level entry point holding the configured pool, if any.

use crate::config::{DEFAULT_ENV_FILE, PoolConfig};
use crate::db::connection::PooledConnection;
use crate::db::pool::ConnectionPool;
use crate::error::{DbError, DbResult};
use std::path::Path;
use tracing::{info, warn};

/// Owns the pool built from configuration.
///
/// Resolution may find nothing; such a `Database` exists but every
/// [`session`](Self::session) fails until [`setup`](Self::setup) is used.
#[derive(Debug, Clone, Default)]
pub struct Database {
    pool: Option<ConnectionPool>,
}

impl Database {
    /// Resolve from `MINORM_*` variables, falling back to `./.env`.
    pub fn from_env() -> DbResult<Self> {
        Self::from_env_or_file(Path::new(DEFAULT_ENV_FILE))
    }

    pub fn from_env_or_file(env_file: &Path) -> DbResult<Self> {
        Self::from_lookup_or_file(|key| std::env::var(key).ok(), env_file)
    }

    /// Same as [`from_env_or_file`](Self::from_env_or_file) over an arbitrary
    /// key lookup.
    pub fn from_lookup_or_file<F>(lookup: F, env_file: &Path) -> DbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match PoolConfig::resolve_with(lookup, env_file)? {
            Some(config) => Ok(Self::setup(config)),
            None => {
                warn!(
                    env_file = %env_file.display(),
                    "No database configuration found, sessions are unavailable until setup"
                );
                Ok(Self::default())
            }
        }
    }

    /// Build a pool from explicit configuration.
    pub fn setup(config: PoolConfig) -> Self {
        info!(target_db = %config.masked_url(), "Database configured");
        Self {
            pool: Some(ConnectionPool::new(config)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    pub fn pool(&self) -> DbResult<&ConnectionPool> {
        self.pool.as_ref().ok_or_else(|| {
            DbError::configuration("no database configured; set MINORM_* variables or call setup")
        })
    }

    /// Acquire a connection from the configured pool.
    pub async fn session(&self) -> DbResult<PooledConnection> {
        self.pool()?.acquire().await
    }
}
