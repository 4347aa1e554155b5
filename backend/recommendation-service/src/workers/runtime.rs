//! Worker runtime.
//!
//! One `QueueWorker` per named queue: fetch up to `concurrency` jobs into
//! flight, dispatch each on its own task, log the outcome, and delete
//! completed jobs from the queue store. Shutdown is cooperative - stop
//! fetching, let in-flight jobs finish, release the connection.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::workers::dispatch::JobDispatcher;
use crate::workers::queue::JobQueue;

/// Delay before retrying after a queue fetch error.
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<dyn JobDispatcher>,
    concurrency: usize,
    shutdown_rx: watch::Receiver<bool>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dispatcher: Arc<dyn JobDispatcher>,
        concurrency: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            concurrency,
            shutdown_rx,
        }
    }

    /// Drive the queue until shutdown.
    pub async fn run(mut self) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            queue = self.queue.name(),
            concurrency = self.concurrency,
            "worker started and listening for jobs"
        );

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            // A permit is held before fetching so at most `concurrency` jobs
            // are in flight, fetch included.
            let permit = tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    drop(permit);
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                fetched = self.queue.next_job() => match fetched {
                    Ok(Some(job)) => job,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(queue = self.queue.name(), error = %e, "job fetch failed");
                        sleep(FETCH_RETRY_DELAY).await;
                        continue;
                    }
                },
            };

            let queue = Arc::clone(&self.queue);
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let _permit = permit;
                let job_id = job.id.clone();
                let job_type = job.job_type.clone();

                // Defensive second layer: the dispatcher already folds
                // handler errors into outcomes, but a panic must not take
                // the pool down - and its job stays queued for the external
                // retry policy.
                match AssertUnwindSafe(dispatcher.dispatch(&job)).catch_unwind().await {
                    Ok(outcome) => {
                        info!(
                            job_id = %job_id,
                            job_type = %job_type,
                            status = outcome.status(),
                            "job completed"
                        );
                        // Completed jobs are deleted to bound queue memory;
                        // a failed delete cannot rewrite the outcome above.
                        if let Err(e) = queue.remove(&job_id).await {
                            warn!(job_id = %job_id, error = %e, "failed to remove completed job");
                        }
                    }
                    Err(_) => {
                        error!(
                            job_id = %job_id,
                            job_type = %job_type,
                            "job handler panicked; leaving job for queue retry"
                        );
                    }
                }
            });
        }

        // Drain: every permit back means every in-flight job finished.
        let _ = semaphore.acquire_many(self.concurrency as u32).await;
        self.queue.close().await;

        info!(queue = self.queue.name(), "worker shut down");
    }
}
