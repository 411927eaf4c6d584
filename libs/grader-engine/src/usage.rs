//! Resource accounting across the results of one run.

use grader_common::types::TestResult;

/// Arithmetic mean of all measured `mem_usage` samples.
///
/// Tests that errored carry no sample. With no samples at all the mean is
/// undefined, so this returns `None` rather than `NaN`.
pub fn average_ram_usage(results: &[TestResult]) -> Option<f64> {
    let samples: Vec<u64> = results.iter().filter_map(|r| r.mem_usage).collect();
    if samples.is_empty() {
        return None;
    }

    let total: f64 = samples.iter().map(|&s| s as f64).sum();
    Some(total / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_common::types::TestCase;
    use grader_common::value::coerce;

    fn sample(mem: Option<u64>) -> TestResult {
        let test = TestCase::new("f()", "1");
        match mem {
            Some(bytes) => TestResult {
                input: test.input,
                expected_output: coerce("1"),
                actual_output: Some(coerce("1")),
                passed: true,
                mem_usage: Some(bytes),
                error: None,
                display_value: None,
            },
            None => TestResult::errored(&test, coerce("1"), "boom"),
        }
    }

    #[test]
    fn test_mean_ignores_errored_tests() {
        let results = vec![sample(Some(100)), sample(None), sample(Some(300))];
        assert_eq!(average_ram_usage(&results), Some(200.0));
    }

    #[test]
    fn test_all_errored_is_none() {
        let results = vec![sample(None), sample(None)];
        assert_eq!(average_ram_usage(&results), None);
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(average_ram_usage(&[]), None);
    }

    #[test]
    fn test_zero_samples_count() {
        let results = vec![sample(Some(0)), sample(Some(50))];
        assert_eq!(average_ram_usage(&results), Some(25.0));
    }
}
