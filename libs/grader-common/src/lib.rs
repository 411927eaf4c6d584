pub mod redis;
pub mod types;
pub mod value;

pub use types::{
    ExerciseFixtures, GradingJob, GradingOutcome, GradingReport, JobMode, Language,
    OutcomeStatus, SubmissionRecord, TestCase, TestResult,
};
pub use value::{coerce, equals, CoercedValue};
