mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Grade submissions locally, inspect coercion, and drive the job queue", long_about = None)]
struct Cli {
    /// Grader config file (defaults to GRADER_CONFIG or config/grader.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a source file against an exercise from a fixtures file
    Grade {
        /// Fixtures JSON file
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Exercise id
        #[arg(short, long)]
        exercise: i64,

        /// Submission source file
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Show how an expected-output literal is coerced
    Coerce {
        /// Literal as stored in the fixtures, e.g. '"5"' or '[1, 2]'
        literal: String,

        /// Compare against a second literal
        #[arg(long)]
        against: Option<String>,
    },

    /// List configured languages and their runners
    Languages,

    /// Queue a grading job for the worker
    Enqueue {
        /// Exercise id
        #[arg(short, long)]
        exercise: i64,

        /// Submission source file
        #[arg(short, long)]
        source: PathBuf,

        /// Submitting user
        #[arg(short, long)]
        user: Option<i64>,

        /// Produce a submission record when every test passes
        #[arg(long, default_value = "false")]
        submit: bool,
    },

    /// Fetch the outcome of a queued job
    Status {
        /// Job id printed by `enqueue`
        job_id: uuid::Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            fixtures,
            exercise,
            source,
        } => {
            commands::grade(cli.config.as_deref(), &fixtures, exercise, &source).await?;
        }
        Commands::Coerce { literal, against } => {
            commands::coerce(&literal, against.as_deref())?;
        }
        Commands::Languages => {
            commands::list_languages(cli.config.as_deref())?;
        }
        Commands::Enqueue {
            exercise,
            source,
            user,
            submit,
        } => {
            commands::enqueue(exercise, &source, user, submit).await?;
        }
        Commands::Status { job_id } => {
            commands::fetch_result(&job_id).await?;
        }
    }

    Ok(())
}
