use chrono::Utc;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::SummaryError;
use crate::models::{StageJob, StageJobStatus};

const PENDING_QUEUE: &str = "summary_queue:pending";
const PROCESSING_QUEUE: &str = "summary_queue:processing";

// Job records expire after 7 days.
const JOB_TTL_SECONDS: i64 = 604_800;

fn job_key(job_id: Uuid) -> String {
    format!("summary_job:{}", job_id)
}

fn redis_error(context: &'static str, detail: String) -> SummaryError {
    SummaryError::RedisError(redis::RedisError::from((
        redis::ErrorKind::IoError,
        context,
        detail,
    )))
}

/// Redis-backed stage-job queue: a pending list feeding workers through
/// BRPOPLPUSH, with per-job hashes for status tracking and retries.
/// Delivery is at least once; nothing orders jobs across entities.
pub struct RedisSummaryQueue {
    pool: Pool,
}

impl RedisSummaryQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, SummaryError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| redis_error("Failed to create Redis pool", e.to_string()))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e.to_string()))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Summary queue initialized");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, SummaryError> {
        self.pool
            .get()
            .await
            .map_err(|e| redis_error("Failed to get Redis connection", e.to_string()))
    }

    async fn store_job(&self, conn: &mut Connection, job: &StageJob) -> Result<(), SummaryError> {
        let job_data = serde_json::to_string(job)?;

        let _: () = conn
            .hset_multiple(
                job_key(job.job_id),
                &[
                    ("data", job_data.as_str()),
                    ("status", &serde_json::to_string(&job.status)?),
                    ("stage", job.stage.as_str()),
                    ("entity_id", &job.entity_id.to_string()),
                    ("updated_at", &job.updated_at.to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    async fn load_job(
        &self,
        conn: &mut Connection,
        job_id: Uuid,
    ) -> Result<Option<StageJob>, SummaryError> {
        let job_data: Option<String> = conn.hget(job_key(job_id), "data").await?;

        match job_data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn enqueue(&self, job: &StageJob) -> Result<(), SummaryError> {
        let mut conn = self.get_connection().await?;

        self.store_job(&mut conn, job).await?;
        let _: () = conn.expire(job_key(job.job_id), JOB_TTL_SECONDS).await?;
        let _: () = conn
            .lpush(PENDING_QUEUE, job.job_id.to_string())
            .await?;

        debug!(
            job_id = %job.job_id,
            stage = %job.stage,
            entity_id = %job.entity_id,
            "Stage job enqueued"
        );
        Ok(())
    }

    pub async fn dequeue(&self, worker_id: &str) -> Result<Option<StageJob>, SummaryError> {
        let mut conn = self.get_connection().await?;

        let job_id: Option<String> = conn
            .brpoplpush(PENDING_QUEUE, PROCESSING_QUEUE, 1.0)
            .await?;

        let Some(job_id_str) = job_id else {
            return Ok(None);
        };

        let job_id = Uuid::parse_str(&job_id_str)
            .map_err(|e| SummaryError::QueueError(format!("Invalid job id in queue: {}", e)))?;

        let Some(mut job) = self.load_job(&mut conn, job_id).await? else {
            // The job hash expired while the id sat in the list; drop it.
            let _: () = conn.lrem(PROCESSING_QUEUE, 1, job_id_str).await?;
            return Ok(None);
        };

        job.worker_id = Some(worker_id.to_string());
        job.status = StageJobStatus::Processing;
        job.updated_at = Utc::now();

        self.store_job(&mut conn, &job).await?;

        debug!(job_id = %job.job_id, worker_id, "Stage job dequeued");
        Ok(Some(job))
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<StageJob>, SummaryError> {
        let mut conn = self.get_connection().await?;
        self.load_job(&mut conn, job_id).await
    }

    pub async fn update_status(
        &self,
        job_id: Uuid,
        status: StageJobStatus,
        error_message: Option<String>,
    ) -> Result<(), SummaryError> {
        let mut conn = self.get_connection().await?;

        let Some(mut job) = self.load_job(&mut conn, job_id).await? else {
            return Err(SummaryError::JobNotFound(job_id));
        };

        if !job.status.can_transition_to(&status) {
            return Err(SummaryError::InvalidStatusTransition {
                from: format!("{:?}", job.status),
                to: format!("{:?}", status),
            });
        }

        job.status = status.clone();
        job.updated_at = Utc::now();
        job.error_message = error_message;

        if status.is_terminal() {
            job.completed_at = Some(Utc::now());
            let _: () = conn.lrem(PROCESSING_QUEUE, 1, job_id.to_string()).await?;
        }

        self.store_job(&mut conn, &job).await?;

        debug!(job_id = %job_id, status = ?job.status, "Stage job status updated");
        Ok(())
    }

    pub async fn retry(&self, job_id: Uuid) -> Result<(), SummaryError> {
        let mut conn = self.get_connection().await?;

        let Some(mut job) = self.load_job(&mut conn, job_id).await? else {
            return Err(SummaryError::JobNotFound(job_id));
        };

        if !job.can_retry() {
            return Err(SummaryError::MaxRetriesExceeded {
                job_id,
                max_retries: job.max_retries,
            });
        }

        job.retry_count += 1;
        job.status = StageJobStatus::Retrying;
        job.updated_at = Utc::now();
        job.error_message = None;
        job.worker_id = None;

        self.store_job(&mut conn, &job).await?;
        let _: () = conn.lpush(PENDING_QUEUE, job_id.to_string()).await?;

        info!(
            job_id = %job_id,
            attempt = job.retry_count,
            max_retries = job.max_retries,
            "Stage job re-enqueued for retry"
        );
        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<u64, SummaryError> {
        let mut conn = self.get_connection().await?;

        let cutoff = Utc::now() - chrono::Duration::seconds(JOB_TTL_SECONDS);
        let keys: Vec<String> = conn.keys("summary_job:*").await?;
        let mut cleaned = 0;

        for key in keys {
            let updated_at: Option<String> = conn.hget(&key, "updated_at").await?;

            if let Some(updated_str) = updated_at {
                if let Ok(updated) = chrono::DateTime::parse_from_rfc3339(&updated_str) {
                    if updated.with_timezone(&Utc) < cutoff {
                        let _: () = conn.del(&key).await?;
                        cleaned += 1;
                    }
                }
            }
        }

        if cleaned > 0 {
            info!("Cleaned up {} expired stage jobs", cleaned);
        }
        Ok(cleaned)
    }
}
