use anyhow::{Context, Result, anyhow, bail};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::migrations;

pub const DEFAULT_POOL_SIZE: usize = 10;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A fixed-size set of SQLite connections.
///
/// Every connection is opened up front. Callers beyond `size` wait on a FIFO
/// semaphore; the wait queue is unbounded and has no timeout, so sustained
/// overload grows the queue rather than shedding requests.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    pub closed: bool,
}

impl Pool {
    pub fn open(path: &Path, size: usize) -> Result<Self> {
        if size == 0 {
            bail!("Connection pool size must be at least 1");
        }

        let first = open_connection(path)?;
        migrations::run(&first)?;

        let mut conns = Vec::with_capacity(size);
        conns.push(first);
        for _ in 1..size {
            conns.push(open_connection(path)?);
        }

        info!(
            "Connection pool opened at {} ({} connections)",
            path.display(),
            size
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(conns),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        })
    }

    /// Wait for a free connection. Fails only once the pool has been closed.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("Connection pool is closed"))?;

        let conn = self
            .inner
            .idle
            .lock()
            .map_err(|e| anyhow!("Pool lock poisoned: {}", e))?
            .pop()
            .ok_or_else(|| anyhow!("Connection pool exhausted despite holding a permit"))?;

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Run `f` against a pooled connection on the blocking thread pool.
    /// The connection goes back to the pool when `f` returns.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || f(&mut *conn))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }

    /// Stop handing out connections and drop the idle ones. Connections still
    /// checked out are dropped when their guards are.
    pub fn close(&self) {
        self.inner.permits.close();
        let drained = match self.inner.idle.lock() {
            Ok(mut idle) => idle.drain(..).count(),
            Err(_) => 0,
        };
        info!("Connection pool closed ({} idle connections dropped)", drained);
    }

    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0);
        PoolStatus {
            size: self.inner.size,
            idle,
            closed: self.inner.permits.is_closed(),
        }
    }
}

/// A connection checked out of a [`Pool`]; returned to it on drop.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.pool.permits.is_closed() {
            debug!("Dropping connection returned to a closed pool");
            return;
        }
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(conn);
        }
        // permit is released after the connection is back in the idle set
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}
