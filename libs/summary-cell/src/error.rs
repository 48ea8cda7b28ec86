use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Summarization API request failed: {0}")]
    Api(String),

    #[error("Database operation failed: {0}")]
    Database(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Document storage error: {0}")]
    Storage(String),

    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Maximum retry attempts ({max_retries}) exceeded for job {job_id}")]
    MaxRetriesExceeded { job_id: Uuid, max_retries: u32 },
}
