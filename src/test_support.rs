//! Test-only doubles for the generation client and build toolchain, plus a
//! tempdir-backed project fixture.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::config::PipelineConfig;
use crate::io::build::{BuildOutcome, BuildTools, coverage_report_path};
use crate::llm::{GenerateClient, GenerateError};

/// Scripted generation client: replays queued results, records prompts.
pub struct ScriptedClient {
    results: RefCell<VecDeque<Result<String, GenerateError>>>,
    default_response: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedClient {
    /// Replay `results` in order; further calls fail.
    pub fn scripted(results: Vec<Result<String, GenerateError>>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            default_response: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Replay `results` in order; further calls return `default`.
    pub fn scripted_with_default(
        results: Vec<Result<String, GenerateError>>,
        default: &str,
    ) -> Self {
        Self {
            results: RefCell::new(results.into()),
            default_response: Some(default.to_string()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Answer every prompt with `text`.
    pub fn answering(text: &str) -> Self {
        Self::scripted_with_default(Vec::new(), text)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl GenerateClient for ScriptedClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.results.borrow_mut().pop_front() {
            Some(result) => result,
            None => match &self.default_response {
                Some(text) => Ok(text.clone()),
                None => Err(GenerateError::Api {
                    message: "unexpected generate call".to_string(),
                }),
            },
        }
    }
}

/// Scripted build toolchain: fixed outcomes plus invocation counters.
pub struct ScriptedBuildTools {
    build: BuildOutcome,
    tests: BuildOutcome,
    coverage_error: Option<String>,
    build_calls: Cell<usize>,
    tests_calls: Cell<usize>,
    coverage_calls: Cell<usize>,
}

impl ScriptedBuildTools {
    pub fn new(build: BuildOutcome, tests: BuildOutcome) -> Self {
        Self {
            build,
            tests,
            coverage_error: None,
            build_calls: Cell::new(0),
            tests_calls: Cell::new(0),
            coverage_calls: Cell::new(0),
        }
    }

    /// Make `generate_coverage` fail with `message`.
    pub fn with_coverage_error(mut self, message: &str) -> Self {
        self.coverage_error = Some(message.to_string());
        self
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.get()
    }

    pub fn tests_calls(&self) -> usize {
        self.tests_calls.get()
    }

    pub fn coverage_calls(&self) -> usize {
        self.coverage_calls.get()
    }
}

impl BuildTools for ScriptedBuildTools {
    fn configure_and_build(&self, _project_dir: &Path, _build_dir: &Path) -> Result<BuildOutcome> {
        self.build_calls.set(self.build_calls.get() + 1);
        Ok(self.build.clone())
    }

    fn run_tests(&self, _build_dir: &Path) -> Result<BuildOutcome> {
        self.tests_calls.set(self.tests_calls.get() + 1);
        Ok(self.tests.clone())
    }

    fn generate_coverage(&self, build_dir: &Path) -> Result<PathBuf> {
        self.coverage_calls.set(self.coverage_calls.get() + 1);
        match &self.coverage_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(coverage_report_path(build_dir)),
        }
    }
}

/// Tempdir-backed project layout with templates and a config pointing into
/// it. Dropped with the tempdir.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let project = Self { temp };
        fs::create_dir_all(project.project_dir()).context("create project dir")?;
        fs::create_dir_all(project.template_dir()).context("create template dir")?;
        project.write_template("initial.md", "Write unit tests for the following file.")?;
        project.write_template("refine.md", "Refine the following test file.")?;
        project.write_template("fix_build.md", "Suggest a fix for the following build log.")?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root().join("project")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root().join("prompts")
    }

    /// Config with every path redirected into the tempdir.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            project_dir: self.project_dir(),
            tests_dir: self.root().join("generated_tests"),
            build_dir: self.root().join("build"),
            template_dir: self.template_dir(),
            ..PipelineConfig::default()
        }
    }

    /// Write a source file under the project dir, creating parents.
    pub fn add_source(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.project_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create source parent dirs");
        }
        fs::write(&path, contents).expect("write source file");
        path
    }

    pub fn write_template(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.template_dir().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }
}
