use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::JobRunner;
use crate::queue::{ClaimedJob, QueueError, Scheduler};

/// Fixed set of symmetric workers draining the scheduler
pub struct WorkerPool {
    workers: JoinSet<Result<(), QueueError>>,
    scheduler: Arc<Scheduler>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn start(
        scheduler: Arc<Scheduler>,
        runner: Arc<JobRunner>,
        size: usize,
        shutdown: CancellationToken,
    ) -> Self {
        info!(size, "Starting worker pool");

        let mut workers = JoinSet::new();
        for worker_id in 0..size.max(1) {
            workers.spawn(worker_loop(
                worker_id,
                scheduler.clone(),
                runner.clone(),
                shutdown.clone(),
            ));
        }

        Self {
            workers,
            scheduler,
            shutdown,
        }
    }

    /// Wait for every worker to stop
    ///
    /// The first scheduler failure stops the whole pool and is returned.
    pub async fn wait(&mut self) -> Result<(), QueueError> {
        let mut result = Ok(());

        while let Some(joined) = self.workers.join_next().await {
            let outcome = joined
                .map_err(|e| QueueError::PoolFatal(format!("worker task failed: {e}")))
                .and_then(|r| r);
            if let Err(e) = outcome {
                error!(error = %e, "Worker pool failure, stopping all workers");
                self.shutdown.cancel();
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    /// Stop claiming, ask running jobs to stop at their next bundle and wait
    pub async fn shutdown(mut self) -> Result<(), QueueError> {
        info!("Shutting down worker pool");
        self.shutdown.cancel();
        let signalled = self.scheduler.signal_all()?;
        if signalled > 0 {
            info!(signalled, "Asked running jobs to stop");
        }
        self.wait().await
    }
}

async fn worker_loop(
    worker_id: usize,
    scheduler: Arc<Scheduler>,
    runner: Arc<JobRunner>,
    shutdown: CancellationToken,
) -> Result<(), QueueError> {
    info!(worker_id, "Worker started");

    while let Some(ClaimedJob { request, cancel }) = scheduler.claim(&shutdown).await? {
        let request_id = request.request_id;
        let destination = request.destination.clone();
        info!(worker_id, %request_id, "Worker picked up request");

        // Own task so a panic inside the job cannot take the worker down
        let job_runner = runner.clone();
        let job = tokio::spawn(async move { job_runner.run(&request, &cancel).await });

        if let Err(e) = job.await {
            runner
                .report_crash(request_id, &destination, &e.to_string())
                .await;
        }

        scheduler.finish(request_id)?;
    }

    info!(worker_id, "Worker stopped");
    Ok(())
}
