/// Language Runners - one execution strategy per source language
///
/// A runner takes the test cases of an exercise plus the submitted source and
/// produces a complete `GradingReport`. Runners never return errors: every
/// failure of the submission (load, compile, crash, timeout) is reported
/// inside the report with `ok: false` or as a per-test `error`.
///
/// Two strategies exist and they deliberately fail differently:
/// - `InProcessRunner`: embedded interpreter, per-test failures are recovered
///   and the remaining tests still run
/// - `ContainerRunner`: one harness per run, any process-level failure fails
///   the whole run
pub mod container;
pub mod harness;
pub mod javascript;

use async_trait::async_trait;
use grader_common::types::{GradingReport, TestCase};

pub use container::ContainerRunner;
pub use javascript::{InProcessRunner, SandboxLimits};

#[async_trait]
pub trait Runner: Send + Sync {
    /// Run every test case against `source`, returning results in test order
    async fn run(&self, tests: &[TestCase], source: &str) -> GradingReport;
}
