//! Lazily established connection pool
//!
//! The pool is an explicitly owned handle: it is created at startup with a
//! connector and shared by reference. The first caller of [`LazyPool::get`]
//! establishes the pool; callers arriving while that is in flight wait for the
//! same establishment instead of opening a second pool. If establishment fails
//! the cell stays empty and the next caller tries again.

use crate::config::DatabaseConfig;
use crate::{Error, Result};
use futures::future::BoxFuture;
use sqlx::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::info;

type Connector<P> = Box<dyn Fn() -> BoxFuture<'static, Result<P>> + Send + Sync>;

/// Connection pool created at most once, on first use
pub struct LazyPool<P> {
    cell: OnceCell<P>,
    connector: Connector<P>,
}

impl<P: Send + Sync> LazyPool<P> {
    /// Create a handle that will establish the pool with `connect` on first use
    pub fn new<F, Fut>(connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            connector: Box::new(move || Box::pin(connect())),
        }
    }

    /// Wrap a pool that is already open
    pub fn established(pool: P) -> Self {
        Self {
            cell: OnceCell::from(pool),
            connector: Box::new(|| {
                Box::pin(async { Err(Error::Internal("pool was supplied pre-established".to_string())) })
            }),
        }
    }

    /// Return the pool, establishing it if this is the first call
    pub async fn get(&self) -> Result<&P> {
        self.cell.get_or_try_init(|| (self.connector)()).await
    }

    /// Return the pool only if it has already been established
    pub fn try_get(&self) -> Option<&P> {
        self.cell.get()
    }

    pub fn is_established(&self) -> bool {
        self.cell.initialized()
    }
}

impl LazyPool<SqlitePool> {
    /// Lazily open the SQLite database at `db_path` and initialize its schema
    pub fn sqlite(db_path: PathBuf, config: DatabaseConfig) -> Self {
        Self::new(move || {
            let db_path = db_path.clone();
            let config = config.clone();
            async move {
                let pool = super::init::init_database(&db_path, &config).await?;
                info!(
                    "Connection pool established (max {} connections)",
                    config.max_connections
                );
                Ok(pool)
            }
        })
    }

    /// Close the pool if it was ever established
    pub async fn close(&self) {
        if let Some(pool) = self.cell.get() {
            pool.close().await;
            info!("Connection pool closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pool_not_established_until_first_get() {
        let pool = LazyPool::new(|| async { Ok(42u32) });
        assert!(!pool.is_established());
        assert!(pool.try_get().is_none());

        assert_eq!(*pool.get().await.unwrap(), 42);
        assert!(pool.is_established());
        assert_eq!(pool.try_get(), Some(&42));
    }

    #[tokio::test]
    async fn test_failed_establishment_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let pool = LazyPool::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(Error::Config("database unavailable".to_string()))
                } else {
                    Ok("pool")
                }
            }
        });

        assert!(pool.get().await.is_err());
        assert!(!pool.is_established());
        assert_eq!(*pool.get().await.unwrap(), "pool");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_established_pool_never_connects() {
        let pool = LazyPool::established(7u8);
        assert!(pool.is_established());
        assert_eq!(*pool.get().await.unwrap(), 7);
    }
}
