//! Connection pool management.
//!
//! A bounded queue of idle driver connections with a maximum lifetime.
//!
//! # Design
//!
//! - **No waiting**: `acquire` pops an idle connection or opens a new one; it
//!   never blocks on another caller. Concurrency is bounded by the database.
//! - **Lazy expiry**: TTL is checked when a connection is popped and when it
//!   is returned. There is no background reaper.
//! - **`std::sync::Mutex` for the queue**: `Drop` of a `PooledConnection` can
//!   return it synchronously.
//! - **One retry budget**: popping an expired connection and failing to open a
//!   new one both consume an attempt. The last attempt always opens a fresh
//!   connection, so a queue full of expired connections cannot exhaust it.

use crate::config::PoolConfig;
use crate::db::DatabaseType;
use crate::db::connection::PooledConnection;
use crate::db::driver::DriverConnection;
use crate::error::{DbError, DbResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lower bound on acquisition attempts, whatever `try_times` says.
pub const MIN_ACQUIRE_ATTEMPTS: u32 = 2;

/// A connection parked in the idle queue.
#[derive(Debug)]
pub(crate) struct Idle {
    pub(crate) raw: DriverConnection,
    pub(crate) id: u64,
    pub(crate) created: Instant,
}

impl Idle {
    pub(crate) fn is_dead(&self, ttl: Duration) -> bool {
        self.created.elapsed() >= ttl
    }
}

/// State shared by every clone of a [`ConnectionPool`] and every connection
/// it hands out.
pub(crate) struct SharedPool {
    config: PoolConfig,
    idle: Mutex<VecDeque<Idle>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SharedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPool")
            .field("config", &self.config)
            .field("idle", &self.idle_count())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl SharedPool {
    pub(crate) fn driver(&self) -> DatabaseType {
        self.config.driver
    }

    pub(crate) fn ttl(&self) -> Duration {
        self.config.max_life_time
    }

    fn idle_count(&self) -> usize {
        match self.idle.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn pop_idle(&self) -> DbResult<Option<Idle>> {
        let mut queue = self
            .idle
            .lock()
            .map_err(|_| DbError::internal("idle queue lock poisoned"))?;
        Ok(queue.pop_front())
    }

    /// Queue a returned connection.
    ///
    /// Hands the connection back when it must be closed instead: expired, or
    /// the queue is full.
    pub(crate) fn try_enqueue(&self, idle: Idle) -> DbResult<Option<Idle>> {
        if idle.is_dead(self.ttl()) {
            debug!(connection_id = idle.id, "Connection expired, closing");
            return Ok(Some(idle));
        }
        let mut queue = self.idle.lock().map_err(|_| {
            DbError::put_back(format!(
                "idle queue lock poisoned, connection {} lost",
                idle.id
            ))
        })?;
        if queue.len() >= self.config.max_pool_size {
            debug!(connection_id = idle.id, "Idle queue full, closing");
            return Ok(Some(idle));
        }
        queue.push_back(idle);
        Ok(None)
    }
}

#[cfg(test)]
impl SharedPool {
    /// Panic while holding the idle queue lock.
    pub(crate) fn poison_idle_queue(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.idle.lock();
            panic!("poisoning idle queue");
        }));
    }
}

/// Close a driver connection, logging instead of failing.
pub(crate) async fn close_quietly(raw: DriverConnection, id: u64) {
    if let Err(e) = raw.close().await {
        debug!(connection_id = id, error = %e, "Error while closing connection");
    }
}

/// A bounded pool of expiring connections.
///
/// Cloning is cheap; clones share the same idle queue.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    shared: Arc<SharedPool>,
}

impl ConnectionPool {
    /// Create an empty pool. No connection is opened until `acquire`.
    pub fn new(config: PoolConfig) -> Self {
        info!(
            target_db = %config.masked_url(),
            max_pool_size = config.max_pool_size,
            max_life_time_secs = config.max_life_time.as_secs(),
            try_times = config.try_times,
            "Created connection pool"
        );
        let capacity = config.max_pool_size;
        Self {
            shared: Arc::new(SharedPool {
                config,
                idle: Mutex::new(VecDeque::with_capacity(capacity)),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_pool_size
    }

    /// Connections currently parked in the idle queue.
    pub fn idle_count(&self) -> usize {
        self.shared.idle_count()
    }

    /// Hand out a live connection.
    ///
    /// Reuses an idle connection when one is alive, otherwise opens a new one.
    /// Gives up with `Acquisition` after `max(try_times, 2)` attempts; the
    /// final attempt skips the idle queue and goes straight to opening.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let budget = self.shared.config.try_times.max(MIN_ACQUIRE_ATTEMPTS);
        let mut last_error: Option<String> = None;

        for attempt in 1..=budget {
            let popped = if attempt < budget {
                self.shared.pop_idle()
            } else {
                Ok(None)
            };
            match popped {
                Ok(Some(idle)) => {
                    if idle.is_dead(self.shared.ttl()) {
                        debug!(
                            connection_id = idle.id,
                            attempt, "Discarding expired idle connection"
                        );
                        close_quietly(idle.raw, idle.id).await;
                        last_error = Some("idle connection had expired".to_string());
                        continue;
                    }
                    debug!(connection_id = idle.id, "Reusing idle connection");
                    return Ok(PooledConnection::from_idle(idle, Arc::clone(&self.shared)));
                }
                Ok(None) => match DriverConnection::open(&self.shared.config).await {
                    Ok(raw) => {
                        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
                        info!(
                            connection_id = id,
                            driver = %raw.database_type(),
                            "Opened new connection"
                        );
                        return Ok(PooledConnection::from_idle(
                            Idle {
                                raw,
                                id,
                                created: Instant::now(),
                            },
                            Arc::clone(&self.shared),
                        ));
                    }
                    Err(e) => {
                        warn!(attempt, budget, error = %e, "Failed to open connection");
                        last_error = Some(e.to_string());
                    }
                },
                Err(e) => {
                    warn!(attempt, budget, error = %e, "Failed to pop idle connection");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(DbError::acquisition(
            budget,
            last_error.unwrap_or_else(|| "no attempt was made".to_string()),
        ))
    }

    /// Return a connection. Same as [`PooledConnection::release`].
    pub async fn release(&self, conn: PooledConnection) -> DbResult<()> {
        conn.release().await
    }

    /// Drain the idle queue and close every connection in it.
    ///
    /// Connections currently handed out are returned normally later.
    pub async fn close(&self) {
        let drained: Vec<Idle> = match self.shared.idle.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        info!(count = drained.len(), "Closing idle connections");
        for idle in drained {
            close_quietly(idle.raw, idle.id).await;
        }
    }
}
