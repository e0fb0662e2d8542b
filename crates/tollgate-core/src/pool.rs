//! Bounded pool for CPU-bound credential work.
//!
//! Password hashing is deliberately slow, so it runs on tokio's blocking
//! threads behind two semaphores: `workers` bounds how many jobs run at
//! once, and `workers + queue_depth` bounds how many are admitted at all.
//! Jobs beyond that fail immediately with [`AuthError::Busy`].

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::PoolConfig;
use crate::error::{AuthError, AuthResult};

/// Admission-controlled blocking worker pool.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    capacity: usize,
    config: PoolConfig,
}

impl BlockingPool {
    /// Create a pool.
    pub fn new(config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let capacity = workers + config.queue_depth;
        Self {
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            capacity,
            config,
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Jobs admitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    /// Run a job on a blocking thread.
    ///
    /// Both permits move into the job, so they are released when the job
    /// finishes even if the caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> AuthResult<T>
    where
        F: FnOnce() -> AuthResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let admitted = Arc::clone(&self.admission)
            .try_acquire_owned()
            .map_err(|_| {
                tracing::warn!(in_flight = self.in_flight(), "credential pool saturated");
                AuthError::Busy
            })?;

        let worker = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| AuthError::Internal("credential pool closed".into()))?;

        tokio::task::spawn_blocking(move || {
            let _permits = (admitted, worker);
            job()
        })
        .await
        .map_err(|e| AuthError::Internal(format!("credential job failed: {}", e)))?
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
