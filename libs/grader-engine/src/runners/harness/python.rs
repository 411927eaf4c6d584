use super::{Harness, HarnessFile, HarnessPlan, CODE_DIR};
use grader_common::types::TestCase;

const SOLUTION_FILE: &str = "solution.py";
const HARNESS_FILE: &str = "harness.py";

const PRELUDE: &str = r#"import json
import math

from solution import *


def __grader_literal(value):
    if value is None:
        return "null"
    if isinstance(value, bool):
        return "true" if value else "false"
    if isinstance(value, float):
        if math.isnan(value):
            return "NaN"
        if math.isinf(value):
            return "Infinity" if value > 0 else "-Infinity"
        return repr(value)
    if isinstance(value, int):
        return repr(value)
    if isinstance(value, str):
        return json.dumps(value)
    try:
        return json.dumps(value)
    except (TypeError, ValueError):
        return json.dumps(repr(value))


__grader_results = []
"#;

/// Imports the submission as a module and appends one literal per test input
#[derive(Debug, Default)]
pub struct PythonHarness;

impl PythonHarness {
    pub fn generate(tests: &[TestCase]) -> String {
        let mut harness = String::from(PRELUDE);
        for test in tests {
            harness.push_str(&format!(
                "__grader_results.append(__grader_literal(({})))\n",
                test.input.trim()
            ));
        }
        // Terminates any partial line the submission left on stdout
        harness.push_str("print()\n");
        harness.push_str("print(json.dumps(__grader_results))\n");
        harness
    }
}

impl Harness for PythonHarness {
    fn prepare(&self, source: &str, tests: &[TestCase]) -> Result<HarnessPlan, String> {
        Ok(HarnessPlan {
            files: vec![
                HarnessFile {
                    name: SOLUTION_FILE.to_string(),
                    contents: source.to_string(),
                },
                HarnessFile {
                    name: HARNESS_FILE.to_string(),
                    contents: Self::generate(tests),
                },
            ],
            command: vec!["python".to_string(), format!("{}/{}", CODE_DIR, HARNESS_FILE)],
            env: vec![
                "PYTHONDONTWRITEBYTECODE=1".to_string(),
                "PYTHONUNBUFFERED=1".to_string(),
            ],
        })
    }
}
