/// Test Fixture Store - read-only source of exercises and their test cases
///
/// The web layer owns the exercise database. The grader only needs
/// `(test cases, declared language)` per exercise, which it reads through
/// [`FixtureStore`]. The bundled implementation serves fixtures exported
/// to a JSON file.
use crate::error::{GradeError, Result};
use async_trait::async_trait;
use grader_common::types::{ExerciseFixtures, TestCase};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[async_trait]
pub trait FixtureStore: Send + Sync {
    /// Fetch the test cases and declared language of an exercise.
    ///
    /// Fails with [`GradeError::ExerciseNotFound`] for an unknown exercise.
    async fn exercise_fixtures(&self, exercise_id: i64) -> Result<ExerciseFixtures>;
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    exercises: Vec<ExerciseEntry>,
}

#[derive(Debug, Deserialize)]
struct ExerciseEntry {
    id: i64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    tests: Vec<TestCase>,
}

/// In-memory fixture store, optionally loaded from a JSON export:
///
/// ```json
/// { "exercises": [ { "id": 1, "language": "JavaScript",
///     "tests": [ { "input": "add(2, 3)", "expected_output": "5" } ] } ] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFixtureStore {
    exercises: HashMap<i64, ExerciseFixtures>,
}

impl MemoryFixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, exercise_id: i64, language: Option<&str>, tests: Vec<TestCase>) {
        self.exercises.insert(
            exercise_id,
            ExerciseFixtures {
                exercise_id,
                language: language.map(str::to_string),
                tests,
            },
        );
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(content)
            .map_err(|e| GradeError::Fixtures(format!("Failed to parse fixtures: {}", e)))?;

        let mut store = Self::new();
        for entry in file.exercises {
            if store.exercises.contains_key(&entry.id) {
                return Err(GradeError::Fixtures(format!("Duplicate exercise id {}", entry.id)));
            }
            store.insert(entry.id, entry.language.as_deref(), entry.tests);
        }
        Ok(store)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

#[async_trait]
impl FixtureStore for MemoryFixtureStore {
    async fn exercise_fixtures(&self, exercise_id: i64) -> Result<ExerciseFixtures> {
        self.exercises
            .get(&exercise_id)
            .cloned()
            .ok_or(GradeError::ExerciseNotFound(exercise_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &str = r#"{
        "exercises": [
            { "id": 1, "language": "JavaScript", "tests": [
                { "input": "add(2, 3)", "expected_output": "5", "display_value": "add(2, 3) → 5" },
                { "input": "add(-1, 1)", "expected_output": "0" }
            ] },
            { "id": 2, "tests": [] }
        ]
    }"#;

    #[tokio::test]
    async fn test_fetches_fixtures_in_order() {
        let store = MemoryFixtureStore::from_json_str(FIXTURES).unwrap();
        assert_eq!(store.len(), 2);

        let fixtures = store.exercise_fixtures(1).await.unwrap();
        assert_eq!(fixtures.language.as_deref(), Some("JavaScript"));
        assert_eq!(fixtures.tests.len(), 2);
        assert_eq!(fixtures.tests[0].input, "add(2, 3)");
        assert_eq!(fixtures.tests[0].display_value.as_deref(), Some("add(2, 3) → 5"));
        assert_eq!(fixtures.tests[1].expected_output, "0");
    }

    #[tokio::test]
    async fn test_missing_language_is_preserved() {
        let store = MemoryFixtureStore::from_json_str(FIXTURES).unwrap();
        let fixtures = store.exercise_fixtures(2).await.unwrap();
        assert!(fixtures.language.is_none());
    }

    #[tokio::test]
    async fn test_unknown_exercise() {
        let store = MemoryFixtureStore::from_json_str(FIXTURES).unwrap();
        let err = store.exercise_fixtures(99).await.unwrap_err();
        assert!(matches!(err, GradeError::ExerciseNotFound(99)));
    }

    #[test]
    fn test_rejects_duplicates() {
        let dup = r#"{ "exercises": [ { "id": 1, "tests": [] }, { "id": 1, "tests": [] } ] }"#;
        assert!(MemoryFixtureStore::from_json_str(dup).is_err());
    }

    #[tokio::test]
    async fn test_shipped_fixtures_load() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/fixtures.json");
        let store = MemoryFixtureStore::from_json_file(&path).unwrap();
        let java = store.exercise_fixtures(3).await.unwrap();
        assert_eq!(java.language.as_deref(), Some("Java"));
        assert_eq!(java.tests[0].input, "isPalindrome(\"level\")");
    }

    #[test]
    fn test_loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(&path, FIXTURES).unwrap();

        let store = MemoryFixtureStore::from_json_file(&path).unwrap();
        assert!(!store.is_empty());
    }
}
