// CLI commands for the grading engine
use anyhow::{bail, Context, Result};
use grader_common::redis;
use grader_common::types::{GradingJob, GradingReport, JobMode, Language};
use grader_common::value::{coerce as coerce_literal, equals};
use grader_engine::{Grader, GraderConfig, MemoryFixtureStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Explicit path, else the default location, else built-in defaults
fn load_config(path: Option<&Path>) -> Result<GraderConfig> {
    match path {
        Some(path) => GraderConfig::load(path),
        None => match GraderConfig::load_default() {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("⚠ {:#}; using built-in defaults", e);
                Ok(GraderConfig::default())
            }
        },
    }
}

async fn connect_redis() -> Result<::redis::aio::ConnectionManager> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = ::redis::Client::open(redis_url.as_str())?;
    ::redis::aio::ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

pub async fn grade(config: Option<&Path>, fixtures: &Path, exercise_id: i64, source: &Path) -> Result<()> {
    let config = load_config(config)?;
    let store = MemoryFixtureStore::from_json_file(fixtures)
        .with_context(|| format!("Failed to load fixtures from {}", fixtures.display()))?;
    let source_code =
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source.display()))?;

    let grader = Grader::new(&config, Arc::new(store))?;
    let report = grader.grade(exercise_id, &source_code).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    print_summary(&report);

    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &GradingReport) {
    eprintln!();
    if !report.ok {
        eprintln!("✗ Run rejected: {}", report.message.as_deref().unwrap_or("unknown error"));
        return;
    }

    for (idx, result) in report.results.iter().enumerate() {
        let mark = if result.passed { "✓" } else { "✗" };
        match &result.error {
            Some(error) => eprintln!("  {} Test {}: {} ({})", mark, idx + 1, result.input, error),
            None => eprintln!("  {} Test {}: {}", mark, idx + 1, result.input),
        }
    }
    eprintln!();
    eprintln!("Passed {}/{}", report.passed_count(), report.results.len());
    if let Some(avg) = report.average_ram_usage {
        eprintln!("Average memory delta: {:.0} bytes", avg);
    }
}

pub fn coerce(literal: &str, against: Option<&str>) -> Result<()> {
    let value = coerce_literal(literal);
    println!("{:<10} {}", value.type_name(), serde_json::to_string(&value)?);

    if let Some(other) = against {
        let other_value = coerce_literal(other);
        println!("{:<10} {}", other_value.type_name(), serde_json::to_string(&other_value)?);
        println!("equal:     {}", equals(&value, &other_value));
    }
    Ok(())
}

pub fn list_languages(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;

    println!("{:<12} {:<12} {:<32} {:>8} {:>6} {:>10}", "LANGUAGE", "RUNNER", "IMAGE", "MEM(MB)", "CPU", "TIMEOUT");
    for language in Language::ALL {
        match config.get_config(language) {
            Some(lang) => println!(
                "{:<12} {:<12} {:<32} {:>8} {:>6} {:>8}ms",
                lang.name,
                format!("{:?}", lang.runner),
                lang.image.as_deref().unwrap_or("-"),
                lang.memory_limit_mb,
                lang.cpu_limit,
                lang.timeout_ms
            ),
            None => println!("{:<12} (not configured)", language.tag()),
        }
    }
    Ok(())
}

pub async fn enqueue(exercise_id: i64, source: &Path, user_id: Option<i64>, submit: bool) -> Result<()> {
    let source_code =
        fs::read_to_string(source).with_context(|| format!("Failed to read {}", source.display()))?;
    if source_code.trim().is_empty() {
        bail!("{} is empty", source.display());
    }

    let job = GradingJob {
        id: uuid::Uuid::new_v4(),
        exercise_id,
        user_id,
        source_code,
        mode: if submit { JobMode::Submit } else { JobMode::Run },
    };

    let mut conn = connect_redis().await?;
    redis::push_job(&mut conn, &job).await.context("Failed to enqueue job")?;

    println!("✓ Queued job {}", job.id);
    Ok(())
}

pub async fn fetch_result(job_id: &uuid::Uuid) -> Result<()> {
    let mut conn = connect_redis().await?;
    match redis::get_outcome(&mut conn, job_id).await? {
        Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
        None => bail!("No outcome for job {} (still queued, running, or expired)", job_id),
    }
    Ok(())
}
