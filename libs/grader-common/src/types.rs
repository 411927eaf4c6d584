use crate::value::CoercedValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Languages the grading engine knows how to run.
///
/// Tags are matched case-sensitively against what the exercise store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    JavaScript,
    Python,
    Java,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::JavaScript, Language::Python, Language::Java];

    /// Exact tag lookup; `"javascript"` is not `"JavaScript"`
    pub fn from_tag(tag: &str) -> Option<Language> {
        Language::ALL.into_iter().find(|lang| lang.tag() == tag)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Language::JavaScript => "JavaScript",
            Language::Python => "Python",
            Language::Java => "Java",
        }
    }

    /// Whether an embedded interpreter exists for this language
    pub fn supports_in_process(&self) -> bool {
        matches!(self, Language::JavaScript)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One input/expected-output pair of an exercise. Read-only to the grader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Source snippet evaluated in the target language, e.g. `add(2, 3)`
    pub input: String,
    /// Stringified literal; its type is recovered by the value coercer
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            display_value: None,
        }
    }
}

/// Everything the fixture store knows about one exercise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseFixtures {
    pub exercise_id: i64,
    /// Declared language tag, unvalidated; `None` when the exercise has none
    pub language: Option<String>,
    pub tests: Vec<TestCase>,
}

/// Outcome of one test case. Exactly one per `TestCase`, in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub input: String,
    pub expected_output: CoercedValue,
    pub actual_output: Option<CoercedValue>,
    pub passed: bool,
    #[serde(rename = "memUsage")]
    pub mem_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
}

impl TestResult {
    /// A test that failed to evaluate; never counts as passed
    pub fn errored(test: &TestCase, expected_output: CoercedValue, error: impl Into<String>) -> Self {
        Self {
            input: test.input.clone(),
            expected_output,
            actual_output: None,
            passed: false,
            mem_usage: None,
            error: Some(error.into()),
            display_value: test.display_value.clone(),
        }
    }
}

/// Structured outcome of one grading run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    pub results: Vec<TestResult>,
    /// Mean of the per-test memory samples; `None` when nothing was measured
    #[serde(rename = "averageRamUsage")]
    pub average_ram_usage: Option<f64>,
    pub ok: bool,
    #[serde(rename = "consoleOutput")]
    pub console_output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GradingReport {
    /// A run that produced per-test results
    pub fn completed(
        results: Vec<TestResult>,
        average_ram_usage: Option<f64>,
        console_output: Vec<String>,
    ) -> Self {
        Self {
            results,
            average_ram_usage,
            ok: true,
            console_output: Some(console_output),
            message: None,
        }
    }

    /// A run that could not produce per-test results at all
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            average_ram_usage: None,
            ok: false,
            console_output: None,
            message: Some(message.into()),
        }
    }

    pub fn unsupported_language() -> Self {
        Self::failure("Unsupported language")
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// True only for a successful run with at least one test, all passing
    pub fn all_passed(&self) -> bool {
        self.ok && !self.results.is_empty() && self.results.iter().all(|r| r.passed)
    }
}

/// Whether a job only reports results or also produces a submission record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    #[default]
    Run,
    Submit,
}

/// A grading request as queued by the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingJob {
    pub id: Uuid,
    pub exercise_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub source_code: String,
    #[serde(default)]
    pub mode: JobMode,
}

/// Row shape the submission store persists for an accepted solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user_id: Option<i64>,
    pub exercise_id: i64,
    pub submission: String,
    pub ram_usage: Option<i64>,
    pub completed_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Only a fully passing report yields a record
    pub fn from_report(job: &GradingJob, report: &GradingReport) -> Option<Self> {
        if !report.all_passed() {
            return None;
        }

        Some(Self {
            user_id: job.user_id,
            exercise_id: job.exercise_id,
            submission: job.source_code.clone(),
            ram_usage: report.average_ram_usage.map(|avg| avg.round() as i64),
            completed_at: Utc::now(),
        })
    }
}

/// Grading result handed back to the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub job_id: Uuid,
    pub exercise_id: i64,
    pub status: OutcomeStatus,
    pub report: GradingReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionRecord>,
    pub graded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every test passed
    Passed,
    /// The run completed but at least one test failed
    Failed,
    /// The run itself failed (load/compile/unsupported/infrastructure)
    Rejected,
}

impl GradingOutcome {
    pub fn new(job: &GradingJob, report: GradingReport) -> Self {
        let status = if !report.ok {
            OutcomeStatus::Rejected
        } else if report.all_passed() {
            OutcomeStatus::Passed
        } else {
            OutcomeStatus::Failed
        };

        let submission = match job.mode {
            JobMode::Submit => SubmissionRecord::from_report(job, &report),
            JobMode::Run => None,
        };

        Self {
            job_id: job.id,
            exercise_id: job.exercise_id,
            status,
            report,
            submission,
            graded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::coerce;

    fn passing(input: &str, mem: Option<u64>) -> TestResult {
        TestResult {
            input: input.to_string(),
            expected_output: coerce("5"),
            actual_output: Some(coerce("5")),
            passed: true,
            mem_usage: mem,
            error: None,
            display_value: None,
        }
    }

    fn job(mode: JobMode) -> GradingJob {
        GradingJob {
            id: Uuid::new_v4(),
            exercise_id: 7,
            user_id: Some(42),
            source_code: "function add(a, b) { return a + b; }".to_string(),
            mode,
        }
    }

    #[test]
    fn test_language_tags_are_case_sensitive() {
        assert_eq!(Language::from_tag("JavaScript"), Some(Language::JavaScript));
        assert_eq!(Language::from_tag("Python"), Some(Language::Python));
        assert_eq!(Language::from_tag("javascript"), None);
        assert_eq!(Language::from_tag("COBOL"), None);
    }

    #[test]
    fn test_errored_result_never_passes() {
        let test = TestCase::new("boom()", "1");
        let result = TestResult::errored(&test, coerce("1"), "ReferenceError: boom is not defined");
        assert!(!result.passed);
        assert!(result.actual_output.is_none());
        assert!(result.mem_usage.is_none());
    }

    #[test]
    fn test_report_field_names() {
        let report = GradingReport::completed(vec![passing("add(2,3)", Some(128))], Some(128.0), vec![]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["ok"], true);
        assert_eq!(json["averageRamUsage"], 128.0);
        assert_eq!(json["consoleOutput"], serde_json::json!([]));
        assert_eq!(json["results"][0]["memUsage"], 128);
        assert_eq!(json["results"][0]["actual_output"], 5);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_failure_report_shape() {
        let report = GradingReport::unsupported_language();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["ok"], false);
        assert_eq!(json["message"], "Unsupported language");
        assert!(json["consoleOutput"].is_null());
        assert_eq!(json["results"], serde_json::json!([]));
    }

    #[test]
    fn test_empty_run_is_not_a_pass() {
        let report = GradingReport::completed(vec![], None, vec![]);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_submit_mode_records_only_full_passes() {
        let report = GradingReport::completed(vec![passing("a", Some(100)), passing("b", Some(201))], Some(150.5), vec![]);
        let outcome = GradingOutcome::new(&job(JobMode::Submit), report);

        assert_eq!(outcome.status, OutcomeStatus::Passed);
        let record = outcome.submission.expect("submission record");
        assert_eq!(record.exercise_id, 7);
        assert_eq!(record.user_id, Some(42));
        assert_eq!(record.ram_usage, Some(151));

        let mut failing = passing("c", None);
        failing.passed = false;
        let report = GradingReport::completed(vec![passing("a", None), failing], None, vec![]);
        let outcome = GradingOutcome::new(&job(JobMode::Submit), report);
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.submission.is_none());
    }

    #[test]
    fn test_run_mode_never_records() {
        let report = GradingReport::completed(vec![passing("a", None)], None, vec![]);
        let outcome = GradingOutcome::new(&job(JobMode::Run), report);
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert!(outcome.submission.is_none());
    }

    #[test]
    fn test_rejected_outcome() {
        let outcome = GradingOutcome::new(&job(JobMode::Submit), GradingReport::failure("SyntaxError"));
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert!(outcome.submission.is_none());
    }
}
