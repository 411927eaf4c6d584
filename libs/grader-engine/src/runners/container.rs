// Containerized runner: one generated harness, one container, one run
use crate::config::LanguageConfig;
use crate::console::{ConsoleCapture, ConsoleLevel};
use crate::docker::{ContainerRequest, ExecutionEngine, ProcessOutput};
use crate::runners::harness::{Harness, HarnessPlan};
use crate::runners::Runner;
use crate::scratch::ScratchDir;
use crate::usage::average_ram_usage;
use async_trait::async_trait;
use grader_common::types::{GradingReport, Language, TestCase, TestResult};
use grader_common::value::{coerce, equals, CoercedValue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

pub struct ContainerRunner {
    language: Language,
    image: String,
    memory_limit_mb: u32,
    cpu_limit: f32,
    timeout: Duration,
    scratch_root: PathBuf,
    harness: Box<dyn Harness>,
    engine: Arc<dyn ExecutionEngine>,
}

impl ContainerRunner {
    pub fn new(
        language: Language,
        config: &LanguageConfig,
        scratch_root: PathBuf,
        harness: Box<dyn Harness>,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            language,
            image: config.image.clone().unwrap_or_default(),
            memory_limit_mb: config.memory_limit_mb,
            cpu_limit: config.cpu_limit,
            timeout: config.timeout(),
            scratch_root,
            harness,
            engine,
        }
    }

    fn request(&self, plan: HarnessPlan, scratch: &ScratchDir) -> ContainerRequest {
        ContainerRequest {
            image: self.image.clone(),
            command: plan.command,
            env: plan.env,
            mount: scratch.path().to_path_buf(),
            memory_limit_mb: self.memory_limit_mb,
            cpu_limit: self.cpu_limit,
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    #[instrument(skip_all, fields(language = %self.language, test_count = tests.len()))]
    async fn run(&self, tests: &[TestCase], source: &str) -> GradingReport {
        let run_id = Uuid::new_v4();

        // Dropping `scratch` deletes every file of this run on all paths below
        let scratch = match ScratchDir::create(&self.scratch_root, run_id) {
            Ok(dir) => dir,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to create scratch directory");
                return GradingReport::failure(format!("Failed to prepare run: {}", e));
            }
        };

        let plan = match self.harness.prepare(source, tests) {
            Ok(plan) => plan,
            Err(message) => {
                debug!(run_id = %run_id, error = %message, "Harness preparation failed");
                return GradingReport::failure(message);
            }
        };

        for file in &plan.files {
            if let Err(e) = scratch.write(&file.name, &file.contents).await {
                error!(run_id = %run_id, file = %file.name, error = %e, "Failed to write harness file");
                return GradingReport::failure(format!("Failed to prepare run: {}", e));
            }
        }

        let request = self.request(plan, &scratch);
        let output = match self.engine.execute(&request).await {
            Ok(output) => output,
            Err(e) => {
                error!(run_id = %run_id, error = %format!("{:#}", e), "Execution engine failed");
                return GradingReport::failure(format!("Execution failed: {}", e));
            }
        };

        if output.timed_out {
            warn!(run_id = %run_id, "Run timed out");
            return GradingReport::failure(format!(
                "Execution timed out after {} ms",
                self.timeout.as_millis()
            ));
        }

        if output.truncated {
            warn!(run_id = %run_id, "Run exceeded the output limit");
            return GradingReport::failure("Output limit exceeded");
        }

        if output.exit_code != Some(0) {
            let message = failure_message(&output);
            debug!(run_id = %run_id, exit_code = ?output.exit_code, error = %message, "Run failed");
            return GradingReport::failure(message);
        }

        match parse_harness_output(&output.stdout, tests) {
            Ok((results, console_output)) => {
                info!(
                    run_id = %run_id,
                    passed = results.iter().filter(|r| r.passed).count(),
                    "Run completed"
                );
                let average = average_ram_usage(&results);
                GradingReport::completed(results, average, console_output)
            }
            Err(message) => {
                warn!(run_id = %run_id, error = %message, "Unreadable harness output");
                GradingReport::failure(message)
            }
        }
    }
}

/// Last non-empty line of stderr, else of stdout, else the exit status
pub fn failure_message(output: &ProcessOutput) -> String {
    last_non_empty_line(&output.stderr)
        .or_else(|| last_non_empty_line(&output.stdout))
        .map(str::to_string)
        .unwrap_or_else(|| match output.exit_code {
            Some(code) => format!("Process exited with code {}", code),
            None => "Process exited without a status code".to_string(),
        })
}

fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}

/// Split harness stdout into per-test results and console lines.
///
/// The last non-empty line is the JSON array of result literals; everything
/// before it is console output from the submission. The harness writes a
/// newline ahead of the results line, which leaves one empty line at the
/// end of the console output when the submission's own output was already
/// newline-terminated.
pub fn parse_harness_output(
    stdout: &str,
    tests: &[TestCase],
) -> Result<(Vec<TestResult>, Vec<String>), String> {
    let lines: Vec<&str> = stdout.lines().collect();
    let Some(last) = lines.iter().rposition(|line| !line.trim().is_empty()) else {
        return Err("Harness produced no output".to_string());
    };

    let literals: Vec<String> = serde_json::from_str(lines[last].trim())
        .map_err(|e| format!("Malformed harness output: {}", e))?;

    if literals.len() != tests.len() {
        return Err(format!(
            "Harness returned {} results for {} tests",
            literals.len(),
            tests.len()
        ));
    }

    let mut console_lines = &lines[..last];
    if let Some((separator, rest)) = console_lines.split_last() {
        if separator.is_empty() {
            console_lines = rest;
        }
    }

    let console = ConsoleCapture::new();
    for line in console_lines {
        console.record(ConsoleLevel::Log, line);
    }

    let results = tests
        .iter()
        .zip(literals)
        .map(|(test, literal)| {
            let expected = coerce(&test.expected_output);
            let actual = CoercedValue::from_foreign_literal(&literal);
            TestResult {
                input: test.input.clone(),
                passed: equals(&actual, &expected),
                expected_output: expected,
                actual_output: Some(actual),
                mem_usage: None,
                error: None,
                display_value: test.display_value.clone(),
            }
        })
        .collect();

    Ok((results, console.drain_lines()))
}
