use crate::types::{GradingJob, GradingOutcome};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics shared by the web layer, the CLI and the worker.
/// Keys are deterministic so every party derives the same names.

pub const QUEUE_KEY: &str = "grader:queue";
pub const RESULT_PREFIX: &str = "grader:result";
pub const STATUS_PREFIX: &str = "grader:status";

/// Generate result key for a job
pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

/// Generate status key for a job
pub fn status_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, job_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Push a grading job onto the queue (RPUSH for FIFO semantics)
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &GradingJob,
) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(serialization_error)?;
    conn.rpush(QUEUE_KEY, payload).await
}

/// Pop a grading job, blocking up to `timeout_seconds` so callers can observe shutdown
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<GradingJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: GradingJob = serde_json::from_str(&payload).map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
            })?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Store a grading outcome and its status for the web layer to pick up
pub async fn store_outcome(
    conn: &mut redis::aio::ConnectionManager,
    outcome: &GradingOutcome,
) -> RedisResult<()> {
    let payload = serde_json::to_string(outcome).map_err(serialization_error)?;

    // 24-hour TTL; the web layer persists what it needs before then
    let _: () = conn.set_ex(result_key(&outcome.job_id), payload, 86400).await?;

    // Status separately for cheap polling
    let status = serde_json::to_string(&outcome.status).map_err(serialization_error)?;
    let _: () = conn.set_ex(status_key(&outcome.job_id), status, 86400).await?;

    Ok(())
}

/// Retrieve a grading outcome
pub async fn get_outcome(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<GradingOutcome>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let outcome: GradingOutcome = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
            })?;
            Ok(Some(outcome))
        }
        None => Ok(None),
    }
}
