mod worker;

use anyhow::Context;
use grader_engine::{Grader, GraderConfig, MemoryFixtureStore};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Grader worker booting...");

    let config = GraderConfig::load_default().map_err(|e| {
        error!("Failed to load grader configuration: {:#}", e);
        error!("Make sure config/grader.json exists or set GRADER_CONFIG");
        e
    })?;
    info!(languages = ?config.list_languages(), "Loaded grader configuration");

    let fixtures_path = config
        .fixtures_path
        .clone()
        .context("fixtures_path must be set for the worker")?;
    let store = MemoryFixtureStore::from_json_file(&fixtures_path)
        .with_context(|| format!("Failed to load fixtures from {}", fixtures_path.display()))?;
    info!(exercises = store.len(), path = %fixtures_path.display(), "Loaded exercise fixtures");

    let grader = Arc::new(Grader::new(&config, Arc::new(store))?);
    info!(languages = ?grader.languages(), "Runners ready");

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", redis_url);

    let max_jobs = config.max_concurrent_jobs;
    let semaphore = Arc::new(Semaphore::new(max_jobs));

    tokio::select! {
        _ = worker::worker_loop(redis_conn, grader, semaphore.clone(), max_jobs) => {},
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal, waiting for in-flight jobs...");
        },
    }

    // Every permit back means every spawned job has finished
    let _drained = semaphore.acquire_many(max_jobs as u32).await?;
    info!("Worker shutdown complete");
    Ok(())
}
