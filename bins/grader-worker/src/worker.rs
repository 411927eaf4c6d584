use grader_common::redis;
use grader_common::types::{GradingJob, GradingOutcome, GradingReport};
use grader_engine::{GradeError, Grader};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Grade one job. Never fails: store errors become a rejected outcome so the
/// web layer always gets an answer for a job it queued.
#[instrument(skip_all, fields(job_id = %job.id, exercise_id = job.exercise_id, mode = ?job.mode))]
pub async fn grade_job(grader: &Grader, job: &GradingJob) -> GradingOutcome {
    let start = Instant::now();

    let report = match grader.grade(job.exercise_id, &job.source_code).await {
        Ok(report) => report,
        Err(e @ (GradeError::ExerciseNotFound(_) | GradeError::LanguageMissing(_))) => {
            warn!(error = %e, "Job cannot be graded");
            GradingReport::failure(e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Fixture store failure");
            GradingReport::failure(format!("Grading unavailable: {}", e))
        }
    };

    let outcome = GradingOutcome::new(job, report);
    info!(
        status = ?outcome.status,
        passed = outcome.report.passed_count(),
        tests = outcome.report.results.len(),
        submission = outcome.submission.is_some(),
        execution_ms = start.elapsed().as_millis() as u64,
        "Job graded"
    );
    outcome
}

/// Pop jobs until the task is cancelled, grading up to `max_concurrent_jobs` at once
#[instrument(skip(redis_conn, grader, semaphore))]
pub async fn worker_loop(
    redis_conn: ::redis::aio::ConnectionManager,
    grader: Arc<Grader>,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
) {
    let mut conn = redis_conn;

    loop {
        // Wait for a free slot before taking a job off the queue
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "Semaphore closed");
                return;
            }
        };

        // BLPOP with 5 second timeout for graceful shutdown
        match redis::pop_job(&mut conn, 5.0).await {
            Ok(Some(job)) => {
                info!(
                    job_id = %job.id,
                    exercise_id = job.exercise_id,
                    source_size = job.source_code.len(),
                    in_flight = max_concurrent_jobs - semaphore.available_permits(),
                    "Received job"
                );

                let grader = grader.clone();
                let mut conn = conn.clone();
                tokio::spawn(async move {
                    let outcome = grade_job(&grader, &job).await;
                    match redis::store_outcome(&mut conn, &outcome).await {
                        Ok(()) => debug!(job_id = %job.id, "Outcome persisted to Redis"),
                        Err(e) => error!(job_id = %job.id, error = %e, "Failed to persist outcome"),
                    }
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::{JobMode, OutcomeStatus, TestCase};
    use grader_engine::config::RunnerKind;
    use grader_engine::{GraderConfig, MemoryFixtureStore};
    use uuid::Uuid;

    fn js_grader() -> Grader {
        let mut store = MemoryFixtureStore::new();
        store.insert(
            1,
            Some("JavaScript"),
            vec![TestCase::new("add(2, 3)", "5"), TestCase::new("add(-1, 1)", "0")],
        );
        store.insert(2, None, vec![]);

        let mut config = GraderConfig::default();
        config.languages.retain(|l| l.runner == RunnerKind::InProcess);
        Grader::new(&config, Arc::new(store)).unwrap()
    }

    fn job(exercise_id: i64, source: &str, mode: JobMode) -> GradingJob {
        GradingJob {
            id: Uuid::new_v4(),
            exercise_id,
            user_id: Some(7),
            source_code: source.to_string(),
            mode,
        }
    }

    #[tokio::test]
    async fn test_submit_of_passing_solution_yields_record() {
        let grader = js_grader();
        let outcome = grade_job(&grader, &job(1, "const add = (a, b) => a + b;", JobMode::Submit)).await;

        assert_eq!(outcome.status, OutcomeStatus::Passed);
        let record = outcome.submission.unwrap();
        assert_eq!(record.user_id, Some(7));
        assert_eq!(record.exercise_id, 1);
        assert_eq!(record.submission, "const add = (a, b) => a + b;");
    }

    #[tokio::test]
    async fn test_run_mode_never_yields_record() {
        let grader = js_grader();
        let outcome = grade_job(&grader, &job(1, "const add = (a, b) => a + b;", JobMode::Run)).await;
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert!(outcome.submission.is_none());
    }

    #[tokio::test]
    async fn test_failing_submission_is_not_recorded() {
        let grader = js_grader();
        let outcome = grade_job(&grader, &job(1, "const add = (a, b) => a - b;", JobMode::Submit)).await;
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.submission.is_none());
    }

    #[tokio::test]
    async fn test_store_errors_become_rejected_outcomes() {
        let grader = js_grader();

        let missing = grade_job(&grader, &job(42, "", JobMode::Run)).await;
        assert_eq!(missing.status, OutcomeStatus::Rejected);
        assert_eq!(missing.report.message.as_deref(), Some("Exercise not found: 42"));

        let no_language = grade_job(&grader, &job(2, "", JobMode::Run)).await;
        assert_eq!(no_language.status, OutcomeStatus::Rejected);
    }
}
