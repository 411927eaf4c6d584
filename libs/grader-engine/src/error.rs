use thiserror::Error;

/// Failures that prevent a grading run from starting at all.
///
/// Problems with the submission itself never surface here; they are reported
/// inside a `GradingReport` with `ok: false`.
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("Exercise not found: {0}")]
    ExerciseNotFound(i64),

    #[error("Exercise {0} has no declared language")]
    LanguageMissing(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fixture store error: {0}")]
    Fixtures(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GradeError>;
