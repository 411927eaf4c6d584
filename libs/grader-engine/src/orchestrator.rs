/// Grading Orchestrator - the entry point of the grading core
///
/// Fetches the fixtures of an exercise, picks the runner for its declared
/// language and returns the runner's report. Only fixture-store failures
/// surface as `Err`; everything about the submission itself, including an
/// unsupported language or a crashing runner, is an `Ok` report with
/// `ok: false`.
use crate::config::{GraderConfig, RunnerKind};
use crate::docker::{DockerEngine, ExecutionEngine};
use crate::error::{GradeError, Result};
use crate::fixtures::FixtureStore;
use crate::runners::harness::{Harness, JavaHarness, PythonHarness};
use crate::runners::{ContainerRunner, InProcessRunner, Runner, SandboxLimits};
use futures_util::FutureExt;
use grader_common::types::{ExerciseFixtures, GradingReport, Language};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Submissions above this are rejected before any sandbox exists
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;
pub const MAX_TEST_INPUT_BYTES: usize = 64 * 1024;

pub struct Grader {
    store: Arc<dyn FixtureStore>,
    runners: HashMap<Language, Arc<dyn Runner>>,
}

impl Grader {
    /// Build runners for every configured language.
    ///
    /// The Docker engine is only connected when a container language is configured.
    pub fn new(config: &GraderConfig, store: Arc<dyn FixtureStore>) -> Result<Self> {
        let needs_docker = config.languages.iter().any(|l| l.runner == RunnerKind::Container);
        let engine: Option<Arc<dyn ExecutionEngine>> = if needs_docker {
            let engine = DockerEngine::connect().map_err(|e| GradeError::Config(format!("{:#}", e)))?;
            Some(Arc::new(engine))
        } else {
            None
        };
        Self::build(config, store, engine)
    }

    /// Like [`Grader::new`] with a caller-supplied engine for container languages
    pub fn with_engine(
        config: &GraderConfig,
        store: Arc<dyn FixtureStore>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Result<Self> {
        Self::build(config, store, Some(engine))
    }

    /// Assemble a grader from ready-made runners
    pub fn with_runners(store: Arc<dyn FixtureStore>, runners: HashMap<Language, Arc<dyn Runner>>) -> Self {
        Self { store, runners }
    }

    fn build(
        config: &GraderConfig,
        store: Arc<dyn FixtureStore>,
        engine: Option<Arc<dyn ExecutionEngine>>,
    ) -> Result<Self> {
        config.validate().map_err(|e| GradeError::Config(format!("{:#}", e)))?;

        let mut runners: HashMap<Language, Arc<dyn Runner>> = HashMap::new();
        for lang_config in &config.languages {
            let Some(language) = Language::from_tag(&lang_config.name) else {
                continue;
            };

            let runner: Arc<dyn Runner> = match lang_config.runner {
                RunnerKind::InProcess => Arc::new(InProcessRunner::new(SandboxLimits::from_config(lang_config))),
                RunnerKind::Container => {
                    let engine = engine.clone().ok_or_else(|| {
                        GradeError::Config(format!("No execution engine for {}", language))
                    })?;
                    let harness: Box<dyn Harness> = match language {
                        Language::Python => Box::new(PythonHarness),
                        Language::Java => Box::new(JavaHarness),
                        Language::JavaScript => {
                            return Err(GradeError::Config(
                                "JavaScript has no container harness".to_string(),
                            ))
                        }
                    };
                    Arc::new(ContainerRunner::new(
                        language,
                        lang_config,
                        config.scratch_dir.clone(),
                        harness,
                        engine,
                    ))
                }
            };

            info!(language = %language, runner = ?lang_config.runner, "Registered runner");
            runners.insert(language, runner);
        }

        Ok(Self { store, runners })
    }

    /// Languages that currently have a runner
    pub fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|lang| self.runners.contains_key(lang))
            .collect()
    }

    /// Grade `source` against the stored tests of `exercise_id`
    #[instrument(skip(self, source), fields(source_bytes = source.len()))]
    pub async fn grade(&self, exercise_id: i64, source: &str) -> Result<GradingReport> {
        let fixtures = self.store.exercise_fixtures(exercise_id).await?;
        if fixtures.language.is_none() {
            return Err(GradeError::LanguageMissing(exercise_id));
        }
        Ok(self.grade_fixtures(&fixtures, source).await)
    }

    /// Grade against fixtures the caller already holds
    #[instrument(skip_all, fields(exercise_id = fixtures.exercise_id, language = ?fixtures.language, test_count = fixtures.tests.len()))]
    pub async fn grade_fixtures(&self, fixtures: &ExerciseFixtures, source: &str) -> GradingReport {
        let runner = fixtures
            .language
            .as_deref()
            .and_then(Language::from_tag)
            .and_then(|language| self.runners.get(&language));

        let Some(runner) = runner else {
            warn!("Unsupported language");
            return GradingReport::unsupported_language();
        };

        if source.len() > MAX_SOURCE_BYTES {
            return GradingReport::failure(format!(
                "Source code exceeds maximum size of {} bytes",
                MAX_SOURCE_BYTES
            ));
        }
        if let Some(index) = fixtures.tests.iter().position(|t| t.input.len() > MAX_TEST_INPUT_BYTES) {
            return GradingReport::failure(format!(
                "Test {} input exceeds maximum size of {} bytes",
                index + 1,
                MAX_TEST_INPUT_BYTES
            ));
        }

        let report = match AssertUnwindSafe(runner.run(&fixtures.tests, source)).catch_unwind().await {
            Ok(report) => report,
            Err(_) => {
                error!("Runner panicked");
                return GradingReport::failure("Internal error while running submission");
            }
        };

        if report.ok && report.results.len() != fixtures.tests.len() {
            error!(results = report.results.len(), "Runner returned a result count that does not match the tests");
            return GradingReport::failure("Internal error: result count mismatch");
        }

        info!(ok = report.ok, passed = report.passed_count(), "Grading finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::MemoryFixtureStore;
    use async_trait::async_trait;
    use grader_common::types::TestCase;

    struct PanickingRunner;

    #[async_trait]
    impl Runner for PanickingRunner {
        async fn run(&self, _tests: &[TestCase], _source: &str) -> GradingReport {
            panic!("runner bug");
        }
    }

    struct ShortRunner;

    #[async_trait]
    impl Runner for ShortRunner {
        async fn run(&self, _tests: &[TestCase], _source: &str) -> GradingReport {
            GradingReport::completed(Vec::new(), None, Vec::new())
        }
    }

    fn grader_with(runner: Arc<dyn Runner>) -> Grader {
        let mut store = MemoryFixtureStore::new();
        store.insert(1, Some("Python"), vec![TestCase::new("f()", "1")]);
        store.insert(2, None, vec![]);
        store.insert(3, Some("COBOL"), vec![TestCase::new("f()", "1")]);

        let mut runners: HashMap<Language, Arc<dyn Runner>> = HashMap::new();
        runners.insert(Language::Python, runner);
        Grader::with_runners(Arc::new(store), runners)
    }

    #[tokio::test]
    async fn test_runner_panic_becomes_failure() {
        let grader = grader_with(Arc::new(PanickingRunner));
        let report = grader.grade(1, "x").await.unwrap();
        assert!(!report.ok);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_result_count_is_checked() {
        let grader = grader_with(Arc::new(ShortRunner));
        let report = grader.grade(1, "x").await.unwrap();
        assert!(!report.ok);
    }

    #[tokio::test]
    async fn test_missing_exercise_and_language_are_errors() {
        let grader = grader_with(Arc::new(ShortRunner));
        assert!(matches!(grader.grade(99, "x").await, Err(GradeError::ExerciseNotFound(99))));
        assert!(matches!(grader.grade(2, "x").await, Err(GradeError::LanguageMissing(2))));
    }

    #[tokio::test]
    async fn test_unknown_and_unconfigured_languages() {
        let grader = grader_with(Arc::new(ShortRunner));
        let report = grader.grade(3, "x").await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.message.as_deref(), Some("Unsupported language"));

        let java = ExerciseFixtures {
            exercise_id: 4,
            language: Some("Java".to_string()),
            tests: vec![],
        };
        let report = grader.grade_fixtures(&java, "class A {}").await;
        assert_eq!(report.message.as_deref(), Some("Unsupported language"));
    }

    #[tokio::test]
    async fn test_size_guards() {
        let grader = grader_with(Arc::new(PanickingRunner));
        let big_source = "x".repeat(MAX_SOURCE_BYTES + 1);
        let report = grader.grade(1, &big_source).await.unwrap();
        assert!(!report.ok);
        assert!(report.message.unwrap().contains("Source code exceeds"));

        let fixtures = ExerciseFixtures {
            exercise_id: 1,
            language: Some("Python".to_string()),
            tests: vec![TestCase::new("y".repeat(MAX_TEST_INPUT_BYTES + 1), "1")],
        };
        let report = grader.grade_fixtures(&fixtures, "x").await;
        assert!(report.message.unwrap().contains("Test 1 input exceeds"));
    }

    #[test]
    fn test_in_process_only_config_needs_no_docker() {
        let mut config = GraderConfig::default();
        config.languages.retain(|l| l.runner == RunnerKind::InProcess);
        let grader = Grader::new(&config, Arc::new(MemoryFixtureStore::new())).unwrap();
        assert_eq!(grader.languages(), vec![Language::JavaScript]);
    }
}
