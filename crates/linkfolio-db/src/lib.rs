pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

use anyhow::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

pub use models::{CheckOutcome, LinkColumn, NewAccount, ProfileUpdate, Step, UpdateOutcome};
pub use pool::{DEFAULT_POOL_SIZE, Pool, PoolStatus, PooledConnection};

/// The account store. Cheap to clone; all clones share one [`Pool`].
///
/// Multi-step operations run as separate statements by default, so two
/// requests racing on the same email can both insert, or overwrite each
/// other's profile update. Transactional mode runs those steps inside one
/// `BEGIN IMMEDIATE` transaction instead.
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    transactional: bool,
}

impl Database {
    pub fn open(path: &Path, pool_size: usize) -> Result<Self> {
        Ok(Self::from_pool(Pool::open(path, pool_size)?))
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            transactional: false,
        }
    }

    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn close(&self) {
        self.pool.close();
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.with_conn(f).await
    }

    /// Run `f` inside an immediate (write-locking) transaction, committing
    /// on success and rolling back on error.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })
            .await
    }
}
