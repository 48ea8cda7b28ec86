use std::sync::Arc;

use chrono::Utc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::error::SummaryError;
use crate::models::{StageJob, StageJobStatus, WorkerConfig};
use crate::services::cascade::{QueuedExecutor, StageRunner};
use crate::services::queue::RedisSummaryQueue;

/// Queue consumer: N concurrent loops pulling stage jobs and running them
/// through the shared `StageRunner`. Follow-on stages go back through the
/// queue, so the causal chain for one entity survives worker restarts.
pub struct SummaryWorkerService {
    worker_id: String,
    config: WorkerConfig,
    queue: Arc<RedisSummaryQueue>,
    runner: Arc<StageRunner>,
    is_shutdown: Arc<tokio::sync::RwLock<bool>>,
}

impl SummaryWorkerService {
    pub fn new(config: WorkerConfig, queue: Arc<RedisSummaryQueue>, runner: Arc<StageRunner>) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            config,
            queue,
            runner,
            is_shutdown: Arc::new(tokio::sync::RwLock::new(false)),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SummaryError> {
        info!("Starting summary worker {}", self.worker_id);

        let mut handles = Vec::new();

        for i in 0..self.config.max_concurrent_jobs {
            let worker_clone = self.clone_for_worker();
            let worker_name = format!("{}-{}", self.worker_id, i);

            let handle = tokio::spawn(async move { worker_clone.worker_loop(worker_name).await });
            handles.push(handle);
        }

        let cleanup_worker = self.clone_for_worker();
        let cleanup_handle = tokio::spawn(async move { cleanup_worker.cleanup_loop().await });
        handles.push(cleanup_handle);

        let shutdown_signal = self.wait_for_shutdown();

        tokio::select! {
            _ = shutdown_signal => {
                info!("Shutdown signal received, stopping worker {}", self.worker_id);
            }
            _ = futures::future::try_join_all(handles) => {
                warn!("All worker loops completed unexpectedly");
            }
        }

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown for worker {}", self.worker_id);
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }

    async fn worker_loop(&self, worker_name: String) -> Result<(), SummaryError> {
        debug!("Worker loop started: {}", worker_name);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Worker {} received shutdown signal", worker_name);
                break;
            }

            match self.queue.dequeue(&worker_name).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job, &worker_name).await {
                        error!("Worker {} failed to process job: {}", worker_name, e);
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, stage = %job.stage))]
    async fn process_job(&self, job: StageJob, worker_name: &str) -> Result<(), SummaryError> {
        info!(
            "Processing {} stage for entity {} with worker {}",
            job.stage, job.entity_id, worker_name
        );

        let next = QueuedExecutor::new(Arc::clone(&self.queue));
        let job_timeout = Duration::from_secs(self.config.job_timeout_seconds);

        // The clock is read here, at execution time. A job that waited in the
        // queue while an appointment's date went past still gates correctly.
        let result = timeout(job_timeout, self.runner.run(&job, Utc::now(), &next)).await;

        match result {
            Ok(Ok(())) => {
                self.queue
                    .update_status(job.job_id, StageJobStatus::Completed, None)
                    .await?;
                info!(job_id = %job.job_id, "Stage job completed");
            }
            Ok(Err(e)) => {
                let error_msg = e.to_string();
                self.queue
                    .update_status(job.job_id, StageJobStatus::Failed, Some(error_msg.clone()))
                    .await?;

                error!(
                    job_id = %job.job_id,
                    entity_id = %job.entity_id,
                    "Stage job failed: {}",
                    error_msg
                );

                if job.can_retry_after_failure() {
                    warn!(
                        "Job {} will be retried (attempt {}/{})",
                        job.job_id,
                        job.retry_count + 1,
                        job.max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    self.queue.retry(job.job_id).await?;
                }
            }
            Err(_) => {
                let error_msg = format!(
                    "Job timed out after {} seconds",
                    self.config.job_timeout_seconds
                );
                self.queue
                    .update_status(job.job_id, StageJobStatus::Failed, Some(error_msg))
                    .await?;
                error!(job_id = %job.job_id, "Stage job timed out");
            }
        }

        Ok(())
    }

    async fn cleanup_loop(&self) -> Result<(), SummaryError> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_seconds));

        loop {
            interval.tick().await;

            if *self.is_shutdown.read().await {
                break;
            }

            if let Err(e) = self.queue.cleanup_expired().await {
                warn!("Failed to clean up expired jobs: {}", e);
            }
        }

        Ok(())
    }

    async fn wait_for_shutdown(&self) {
        loop {
            if *self.is_shutdown.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            config: self.config.clone(),
            queue: Arc::clone(&self.queue),
            runner: Arc::clone(&self.runner),
            is_shutdown: Arc::clone(&self.is_shutdown),
        }
    }
}
