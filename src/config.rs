//! Pipeline configuration with compiled-in defaults.
//!
//! Every component receives a [`PipelineConfig`] at construction instead of
//! reading globals. No configuration file is consulted; the CLI is the only
//! override mechanism and defaults cover the common local setup.

use std::path::PathBuf;

use anyhow::{Result, anyhow};

/// Generation endpoint of a locally hosted Ollama server.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
/// Model identifier sent with every generation request.
pub const DEFAULT_MODEL: &str = "phi3:mini";
/// Total generation attempts per prompt, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Per-request timeout for the generation service.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// C++ project the pipeline generates tests for.
pub const DEFAULT_PROJECT_DIR: &str = "project";
/// Directory receiving generated test files (created if absent).
pub const DEFAULT_TESTS_DIR: &str = "generated_tests";
/// Build directory handed to the external build tool (created if absent).
pub const DEFAULT_BUILD_DIR: &str = "build";
/// Directory holding the three prompt templates.
pub const DEFAULT_TEMPLATE_DIR: &str = "prompts";

/// Effective configuration for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub endpoint: String,
    pub model: String,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub project_dir: PathBuf,
    pub tests_dir: PathBuf,
    pub build_dir: PathBuf,
    pub template_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            project_dir: PathBuf::from(DEFAULT_PROJECT_DIR),
            tests_dir: PathBuf::from(DEFAULT_TESTS_DIR),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("endpoint must be non-empty"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(cfg.model, "phi3:mini");
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.request_timeout_secs, 60);
        assert_eq!(cfg.tests_dir, PathBuf::from("generated_tests"));
        assert_eq!(cfg.build_dir, PathBuf::from("build"));
        assert_eq!(cfg.template_dir, PathBuf::from("prompts"));
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let cfg = PipelineConfig {
            max_retries: 0,
            ..PipelineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn validate_rejects_blank_model() {
        let cfg = PipelineConfig {
            model: "  ".to_string(),
            ..PipelineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("model"));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let cfg = PipelineConfig {
            request_timeout_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
