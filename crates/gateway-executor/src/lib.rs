//! Background fan-out for work that must not hold up a response: the
//! conversion dispatcher's outbound beacons, click-side bookkeeping.
//!
//! Replaces the original `GlobalThreadsStorage`: a daemon thread per job
//! plus a 60-second watcher that swept finished threads from a list. Here
//! a bounded channel plus a semaphore caps concurrency instead of running
//! every job as an unmanaged thread, and a periodic sweep publishes queue
//! depth/in-flight gauges instead of just dropping completed handles.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::interval;
use tracing::{debug, warn};

pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor queue is full")]
    QueueFull,
    #[error("executor is shutting down")]
    ShuttingDown,
}

pub struct ExecutorConfig {
    pub capacity: usize,
    pub queue_depth: usize,
    pub sweep_interval: Duration,
}

impl From<&gateway_core::config::ExecutorConfig> for ExecutorConfig {
    fn from(cfg: &gateway_core::config::ExecutorConfig) -> Self {
        Self {
            capacity: cfg.capacity,
            queue_depth: cfg.queue_depth,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct Shared {
    in_flight: AtomicU64,
    queued: AtomicU64,
}

/// A bounded pool of background workers. `submit` never blocks: it either
/// enqueues the job or rejects it immediately when the queue is full.
pub struct BackgroundExecutor {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
}

impl BackgroundExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_depth);
        let shared = Arc::new(Shared {
            in_flight: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        });

        tokio::spawn(dispatch_loop(rx, Arc::new(Semaphore::new(config.capacity)), shared.clone()));
        tokio::spawn(sweep_loop(shared.clone(), config.sweep_interval));

        Self { tx, shared }
    }

    /// Enqueue a fire-and-forget job. Non-blocking: returns
    /// `ExecutorError::QueueFull` immediately rather than waiting for
    /// room, since a caller on the request path cannot afford to block.
    pub fn submit(&self, job: Job) -> Result<(), ExecutorError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.shared.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(ExecutorError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ExecutorError::ShuttingDown),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    /// Wait up to `deadline` for in-flight jobs to drain. Does not close
    /// the submit channel — callers are expected to have already stopped
    /// accepting new requests by the time this runs. Queued-but-not-
    /// started jobs are abandoned once the deadline passes.
    pub async fn shutdown(&self, deadline: Duration) {
        let shared = &self.shared;
        let wait = async {
            while shared.in_flight.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            warn!(
                in_flight = shared.in_flight.load(Ordering::Relaxed),
                "executor shutdown deadline reached with jobs still in flight"
            );
        }
    }
}

async fn dispatch_loop(mut rx: mpsc::Receiver<Job>, semaphore: Arc<Semaphore>, shared: Arc<Shared>) {
    while let Some(job) = rx.recv().await {
        shared.queued.fetch_sub(1, Ordering::Relaxed);
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        shared.in_flight.fetch_add(1, Ordering::Relaxed);
        let shared = shared.clone();
        tokio::spawn(async move {
            job.await;
            drop(permit);
            shared.in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

async fn sweep_loop(shared: Arc<Shared>, interval_duration: Duration) {
    let mut ticker = interval(interval_duration);
    loop {
        ticker.tick().await;
        let in_flight = shared.in_flight.load(Ordering::Relaxed);
        let queued = shared.queued.load(Ordering::Relaxed);
        metrics::gauge!("executor.in_flight").set(in_flight as f64);
        metrics::gauge!("executor.queued").set(queued as f64);
        debug!(in_flight, queued, "executor sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration as StdDuration;

    fn small_executor() -> BackgroundExecutor {
        BackgroundExecutor::new(ExecutorConfig {
            capacity: 2,
            queue_depth: 4,
            sweep_interval: StdDuration::from_secs(3600),
        })
    }

    #[tokio::test]
    async fn submitted_job_runs() {
        let executor = small_executor();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        executor
            .submit(Box::pin(async move {
                ran_clone.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        for _ in 0..50 {
            if ran.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn full_queue_rejects_submit() {
        let executor = BackgroundExecutor::new(ExecutorConfig {
            capacity: 1,
            queue_depth: 1,
            sweep_interval: StdDuration::from_secs(3600),
        });
        // Occupy the single worker slot with a job that blocks until released.
        let (block_tx, block_rx) = tokio::sync::oneshot::channel::<()>();
        executor
            .submit(Box::pin(async move {
                let _ = block_rx.await;
            }))
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        executor.submit(Box::pin(async {})).unwrap();
        let result = executor.submit(Box::pin(async {}));
        assert!(matches!(result, Err(ExecutorError::QueueFull)));
        let _ = block_tx.send(());
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_job() {
        let executor = small_executor();
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = done.clone();
        executor
            .submit(Box::pin(async move {
                tokio::time::sleep(StdDuration::from_millis(30)).await;
                done_clone.store(true, Ordering::SeqCst);
            }))
            .unwrap();
        executor.shutdown(StdDuration::from_millis(500)).await;
        assert!(done.load(Ordering::SeqCst));
    }
}
