pub mod config;
pub mod console;
pub mod docker;
pub mod error;
pub mod fixtures;
pub mod orchestrator;
pub mod runners;
pub mod scratch;
pub mod usage;


pub use config::{GraderConfig, LanguageConfig, RunnerKind};
pub use error::{GradeError, Result};
pub use fixtures::{FixtureStore, MemoryFixtureStore};
pub use orchestrator::Grader;
