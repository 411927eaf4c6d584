// Grader configuration: per-language runner policy and resource limits
use anyhow::{bail, Context, Result};
use grader_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/grader.json";

/// How a language is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    /// Embedded interpreter inside the grader process
    InProcess,
    /// One throwaway container per run
    Container,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Exact language tag, e.g. "JavaScript"
    pub name: String,
    pub runner: RunnerKind,
    /// Container image; required for `container` runners
    #[serde(default)]
    pub image: Option<String>,
    pub memory_limit_mb: u32,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f32,
    /// Per-test deadline (in-process) or whole-run deadline (container)
    pub timeout_ms: u64,
    /// Deadline for loading the submission (in-process only)
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_cpu_limit() -> f32 {
    0.5
}

fn default_load_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_jobs() -> usize {
    4
}

impl LanguageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb as u64 * 1024 * 1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Host directory for per-run harness files; must be visible to the Docker daemon
    pub scratch_dir: PathBuf,
    /// Exercise fixtures exported by the web layer
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    pub languages: Vec<LanguageConfig>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("grader"),
            fixtures_path: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            languages: vec![
                LanguageConfig {
                    name: "JavaScript".to_string(),
                    runner: RunnerKind::InProcess,
                    image: None,
                    memory_limit_mb: 64,
                    cpu_limit: 1.0,
                    timeout_ms: 1000,
                    load_timeout_ms: default_load_timeout_ms(),
                },
                LanguageConfig {
                    name: "Python".to_string(),
                    runner: RunnerKind::Container,
                    image: Some("python:3.12-alpine".to_string()),
                    memory_limit_mb: 50,
                    cpu_limit: 0.5,
                    timeout_ms: 10_000,
                    load_timeout_ms: default_load_timeout_ms(),
                },
                LanguageConfig {
                    name: "Java".to_string(),
                    runner: RunnerKind::Container,
                    image: Some("eclipse-temurin:21-jdk-alpine".to_string()),
                    memory_limit_mb: 256,
                    cpu_limit: 0.5,
                    timeout_ms: 20_000,
                    load_timeout_ms: default_load_timeout_ms(),
                },
            ],
        }
    }
}

impl GraderConfig {
    /// Load and validate a configuration file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Grader config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: GraderConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `GRADER_CONFIG`, or `config/grader.json`
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("GRADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for lang in &self.languages {
            let Some(language) = Language::from_tag(&lang.name) else {
                bail!("Unknown language '{}' in grader config", lang.name);
            };

            if !seen.insert(language) {
                bail!("Language '{}' is configured more than once", lang.name);
            }

            match lang.runner {
                RunnerKind::InProcess if !language.supports_in_process() => {
                    bail!("Language '{}' has no embedded interpreter; use the container runner", lang.name);
                }
                RunnerKind::Container if lang.image.as_deref().map_or(true, str::is_empty) => {
                    bail!("Language '{}' uses the container runner but has no image", lang.name);
                }
                _ => {}
            }

            if lang.memory_limit_mb == 0 || lang.timeout_ms == 0 {
                bail!("Language '{}' needs non-zero memory and timeout limits", lang.name);
            }
        }

        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }

        Ok(())
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: Language) -> Option<&LanguageConfig> {
        self.languages.iter().find(|l| l.name == language.tag())
    }

    /// List all configured language tags
    pub fn list_languages(&self) -> Vec<String> {
        self.languages.iter().map(|l| l.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GraderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.list_languages(), vec!["JavaScript", "Python", "Java"]);
        assert_eq!(config.get_config(Language::JavaScript).unwrap().runner, RunnerKind::InProcess);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "scratch_dir": "/var/tmp/grader",
                "languages": [
                    {{ "name": "JavaScript", "runner": "in_process", "memory_limit_mb": 32, "timeout_ms": 500 }},
                    {{ "name": "Python", "runner": "container", "image": "python:3.12-alpine",
                       "memory_limit_mb": 50, "cpu_limit": 0.5, "timeout_ms": 8000 }}
                ]
            }}"#
        )
        .unwrap();

        let config = GraderConfig::load(file.path()).unwrap();
        let js = config.get_config(Language::JavaScript).unwrap();
        assert_eq!(js.timeout(), Duration::from_millis(500));
        assert_eq!(js.load_timeout_ms, 5000);
        assert_eq!(js.memory_limit_bytes(), 32 * 1024 * 1024);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert!(config.get_config(Language::Java).is_none());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/grader.json");
        let config = GraderConfig::load(&path).unwrap();
        assert_eq!(config.list_languages(), vec!["JavaScript", "Python", "Java"]);
        assert_eq!(config.get_config(Language::Python).unwrap().memory_limit_mb, 50);
    }

    #[test]
    fn test_missing_file() {
        let err = GraderConfig::load(Path::new("/nonexistent/grader.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_rejects_in_process_without_interpreter() {
        let mut config = GraderConfig::default();
        config.languages[1].runner = RunnerKind::InProcess;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_container_without_image() {
        let mut config = GraderConfig::default();
        config.languages[2].image = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_and_duplicate_languages() {
        let mut config = GraderConfig::default();
        config.languages[0].name = "javascript".to_string();
        assert!(config.validate().is_err());

        let mut config = GraderConfig::default();
        let python = config.languages[1].clone();
        config.languages.push(python);
        assert!(config.validate().is_err());
    }
}
