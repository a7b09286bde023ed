//! Bounded pool that keeps proof-of-work off the async executor.
//!
//! Jobs run on a dedicated rayon pool. A semaphore caps how many jobs may be queued or
//! running at once, so a burst of appends waits for admission instead of piling up CPU
//! work. Results come back over a oneshot channel. Dropping the awaiting future (the
//! client went away) or hitting the optional deadline raises the job's [`CancelFlag`].
//!
//! The deadline bounds mining, not persistence. Once it fires the pool waits for the job
//! to settle: a job that still succeeds (its block was already being written) is
//! delivered, and only a job that gave up is reported as [`PoolError::DeadlineExceeded`].

use anyhow::{ensure, Result};
use ledger_core::mine::CancelFlag;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("mining pool is shut down")]
    Closed,

    #[error("mining took longer than {0:?}")]
    DeadlineExceeded(Duration),

    #[error("mining worker stopped without a result")]
    WorkerLost,
}

pub struct MiningPool {
    workers: ThreadPool,
    admission: Arc<Semaphore>,
    deadline: Option<Duration>,
}

/// Raises the flag when the awaiting side goes away, whatever the reason.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl MiningPool {
    pub fn new(threads: usize, max_pending: usize, deadline: Option<Duration>) -> Result<Self> {
        ensure!(threads > 0, "mining pool needs at least one thread");
        ensure!(max_pending > 0, "mining pool needs room for at least one job");
        let workers = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("miner-{i}"))
            .panic_handler(|_| error!("mining job panicked"))
            .build()?;
        debug!(threads, max_pending, ?deadline, "mining pool ready");
        Ok(Self {
            workers,
            admission: Arc::new(Semaphore::new(max_pending)),
            deadline,
        })
    }

    /// Free admission slots.
    pub fn available_slots(&self) -> usize {
        self.admission.available_permits()
    }

    /// Stop admitting jobs. Jobs already admitted run to completion.
    pub fn close(&self) {
        self.admission.close();
        debug!("mining pool closed");
    }

    /// Run `job` on a mining thread and wait for its result. The slot stays taken until
    /// the job itself returns, even if the caller stopped waiting earlier.
    pub async fn run<T, E, F>(&self, job: F) -> Result<Result<T, E>, PoolError>
    where
        F: FnOnce(&CancelFlag) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        let cancel = CancelFlag::new();
        let _guard = CancelOnDrop(cancel.clone());
        let (tx, mut rx) = oneshot::channel();
        let flag = cancel.clone();
        self.workers.spawn(move || {
            let _permit = permit;
            let _ = tx.send(job(&flag));
        });

        let Some(limit) = self.deadline else {
            return rx.await.map_err(|_| PoolError::WorkerLost);
        };
        match tokio::time::timeout(limit, &mut rx).await {
            Ok(received) => received.map_err(|_| PoolError::WorkerLost),
            Err(_) => {
                warn!(?limit, "mining deadline exceeded, cancelling");
                cancel.cancel();
                match rx.await {
                    Ok(Ok(value)) => {
                        warn!(?limit, "job finished past its deadline, keeping its result");
                        Ok(Ok(value))
                    }
                    Ok(Err(_)) => Err(PoolError::DeadlineExceeded(limit)),
                    Err(_) => Err(PoolError::WorkerLost),
                }
            }
        }
    }
}
