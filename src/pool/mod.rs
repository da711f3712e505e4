//! Bounded connection pool.
//!
//! [`ConnectionPool`] hands out [`PooledConnection`] guards. A guard returns
//! its connection to the idle queue when dropped, unless it was discarded
//! (after a timeout or a failed transaction). The number of live checkouts is
//! bounded by a semaphore sized `max_pool_size`; idle connections older than
//! `max_inactive_connection_lifetime` are closed instead of reused.
//!
//! [`PoolManager`] owns the pool as explicit process state: it creates the
//! pool on first use, memoizes it, and tears it down in `close_all`.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{Connection, Connector};
use crate::config::DatabaseSettings;
use crate::error::{ExecError, ExecResult};

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently open (idle plus checked out).
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Connections opened since the pool was created.
    pub created: u64,
    /// Connections closed because they idled too long, timed out or were discarded.
    pub recycled: u64,
    pub closed: bool,
}

struct IdleConnection {
    id: Uuid,
    conn: Box<dyn Connection>,
    idle_since: Instant,
}

struct PoolInner {
    connector: Arc<dyn Connector>,
    settings: DatabaseSettings,
    idle: Mutex<VecDeque<IdleConnection>>,
    slots: Arc<Semaphore>,
    closed: AtomicBool,
    created: AtomicU64,
    recycled: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open(&self) -> ExecResult<(Uuid, Box<dyn Connection>)> {
        let limit = self.settings.connect_timeout();
        let conn = match tokio::time::timeout(limit, self.connector.connect(&self.settings)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(ExecError::ConnectionFailure(message))) => {
                return Err(ExecError::ConnectionFailure(message))
            }
            Ok(Err(other)) => return Err(ExecError::ConnectionFailure(other.to_string())),
            Err(_) => {
                return Err(ExecError::ConnectionFailure(format!(
                    "connect to {} timed out after {:?}",
                    self.settings.redacted_dsn(),
                    limit
                )))
            }
        };

        let id = Uuid::new_v4();
        let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(tag = %self.settings.application_tag, conn_id = %id, total, "opened pooled connection");
        Ok((id, conn))
    }

    /// Pop the oldest idle connection that is still within its lifetime.
    fn take_idle(&self) -> Option<(Uuid, Box<dyn Connection>)> {
        let max_idle = self.settings.max_inactive_lifetime();
        let mut idle = self.idle();
        while let Some(entry) = idle.pop_front() {
            if entry.idle_since.elapsed() < max_idle {
                return Some((entry.id, entry.conn));
            }
            self.recycled.fetch_add(1, Ordering::Relaxed);
            debug!(
                tag = %self.settings.application_tag,
                conn_id = %entry.id,
                idle_for = ?entry.idle_since.elapsed(),
                "closing connection past its inactivity lifetime"
            );
        }
        None
    }

    fn release(&self, id: Uuid, conn: Box<dyn Connection>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.idle().push_back(IdleConnection {
            id,
            conn,
            idle_since: Instant::now(),
        });
    }
}

/// A bounded, reusable set of connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create the pool and open `min_pool_size` connections up front.
    ///
    /// Any failure here is returned as `ConnectionFailure`; nothing is retried.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        settings: DatabaseSettings,
    ) -> ExecResult<Self> {
        if settings.max_pool_size == 0 {
            return Err(ExecError::InvalidArgument(
                "max_pool_size must be at least 1".to_string(),
            ));
        }

        let pool = Self {
            inner: Arc::new(PoolInner {
                connector,
                slots: Arc::new(Semaphore::new(settings.max_pool_size as usize)),
                settings,
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                created: AtomicU64::new(0),
                recycled: AtomicU64::new(0),
            }),
        };

        let warm = pool.inner.settings.min_pool_size.min(pool.inner.settings.max_pool_size);
        for _ in 0..warm {
            let (id, conn) = pool.inner.open().await?;
            pool.inner.release(id, conn);
        }

        info!(
            dsn = %pool.inner.settings.redacted_dsn(),
            min = pool.inner.settings.min_pool_size,
            max = pool.inner.settings.max_pool_size,
            "connection pool established"
        );
        Ok(pool)
    }

    /// Check out a connection, waiting up to `connect_timeout` for a free slot.
    pub async fn acquire(&self) -> ExecResult<PooledConnection> {
        if self.is_closed() {
            return Err(ExecError::ConnectionFailure(
                "connection pool is closed".to_string(),
            ));
        }

        let limit = self.inner.settings.connect_timeout();
        let permit = match tokio::time::timeout(limit, Arc::clone(&self.inner.slots).acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ExecError::ConnectionFailure(
                    "connection pool is closed".to_string(),
                ))
            }
            Err(_) => {
                return Err(ExecError::Timeout {
                    operation: "connection acquire".to_string(),
                    after: limit,
                })
            }
        };

        let (id, conn) = match self.inner.take_idle() {
            Some(idle) => idle,
            None => self.inner.open().await?,
        };

        Ok(PooledConnection {
            id,
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Close idle connections and refuse new checkouts. Idempotent.
    ///
    /// Connections still checked out are closed when their guards drop.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.slots.close();
        let drained = self.inner.idle().drain(..).count();
        info!(
            tag = %self.inner.settings.application_tag,
            closed_idle = drained,
            "connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.inner.idle().len();
        let in_use = if self.is_closed() {
            0
        } else {
            (self.inner.settings.max_pool_size as usize)
                .saturating_sub(self.inner.slots.available_permits())
        };
        PoolStats {
            size: idle + in_use,
            idle,
            in_use,
            created: self.inner.created.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.inner.settings
    }
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledConnection {
    id: Uuid,
    conn: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
    discard: bool,
    // Dropped after `conn` is handed back, so a waiter finds it idle.
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Stable id of the underlying connection, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Close this connection on drop instead of returning it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.discard {
            self.pool.recycled.fetch_add(1, Ordering::Relaxed);
            debug!(tag = %self.pool.settings.application_tag, conn_id = %self.id, "discarding connection");
            drop(conn);
        } else {
            self.pool.release(self.id, conn);
        }
    }
}

/// Owner of the process-wide pool.
///
/// Construct one at startup and share it by reference; the pool itself is
/// created lazily on the first `acquire` and reused afterwards.
pub struct PoolManager {
    connector: Arc<dyn Connector>,
    settings: DatabaseSettings,
    pool: tokio::sync::Mutex<Option<ConnectionPool>>,
}

impl PoolManager {
    pub fn new(connector: Arc<dyn Connector>, settings: DatabaseSettings) -> Self {
        Self {
            connector,
            settings,
            pool: tokio::sync::Mutex::new(None),
        }
    }

    /// Get the pool, creating it on first use.
    pub async fn pool(&self) -> ExecResult<ConnectionPool> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = ConnectionPool::connect(Arc::clone(&self.connector), self.settings.clone()).await?;
        *slot = Some(pool.clone());
        Ok(pool)
    }

    pub async fn acquire(&self) -> ExecResult<PooledConnection> {
        self.pool().await?.acquire().await
    }

    /// Close the pool if one exists. Safe to call repeatedly.
    pub async fn close_all(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close();
        }
    }

    /// Stats of the current pool, if it has been created.
    pub async fn stats(&self) -> Option<PoolStats> {
        self.pool.lock().await.as_ref().map(ConnectionPool::stats)
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }
}
