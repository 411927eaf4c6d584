//! Harness generators for the containerized runner.
//!
//! A harness is a generated driver program that evaluates every test input
//! against the submission and prints one JSON array of result literals as the
//! last line of stdout. Anything the submission prints comes before it.

pub mod java;
pub mod python;

use grader_common::types::TestCase;

pub use java::JavaHarness;
pub use python::PythonHarness;

/// Container mount point of the scratch directory
pub const CODE_DIR: &str = "/code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessFile {
    pub name: String,
    pub contents: String,
}

/// Everything the container runner needs for one run
#[derive(Debug, Clone)]
pub struct HarnessPlan {
    pub files: Vec<HarnessFile>,
    pub command: Vec<String>,
    pub env: Vec<String>,
}

pub trait Harness: Send + Sync {
    /// Generate the harness for `source`.
    ///
    /// An `Err` is a user-facing message: the submission cannot be run at all.
    fn prepare(&self, source: &str, tests: &[TestCase]) -> Result<HarnessPlan, String>;
}
