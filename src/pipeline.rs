//! Orchestration for the four-stage test generation pipeline.
//!
//! Stages run strictly in order with no branching back: discover sources
//! and generate a candidate test per file, refine each candidate, build the
//! project, then run tests and coverage. Generation and refinement treat
//! failures as per-item skips; the build stage treats a failed build or a
//! failed test run as an expected terminal verdict, not an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::config::PipelineConfig;
use crate::io::build::BuildTools;
use crate::io::prompt::{self, Template};
use crate::io::sources::{discover_sources, list_test_files, test_file_name};
use crate::llm::GenerateClient;

/// Per-item counts for a generation or refinement stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Files successfully processed.
    pub processed: usize,
    /// Files skipped after a per-item failure.
    pub skipped: usize,
}

/// Terminal outcome of the build/test/coverage stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildVerdict {
    /// Configure or compile failed; holds the model's fix suggestion, if
    /// one was obtained. Suggestions are informational only, never applied.
    BuildFailed { suggestion: Option<String> },
    /// Compilation succeeded but the test runner reported failures.
    TestsFailed,
    /// Tests passed; holds the coverage report path when coverage ran.
    TestsPassed { coverage_report: Option<PathBuf> },
}

/// Summary of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub generated: StageReport,
    pub refined: StageReport,
    pub verdict: BuildVerdict,
}

/// Execute the full pipeline: generate, refine, build, test, coverage.
///
/// Returns `Err` only for environment-level failures (invalid config,
/// unreadable project tree, missing build tool binaries). Expected failure
/// modes such as a failed build or failed tests are reported in the
/// [`PipelineOutcome`].
#[instrument(skip_all)]
pub fn run_pipeline<C: GenerateClient, B: BuildTools>(
    config: &PipelineConfig,
    client: &C,
    tools: &B,
) -> Result<PipelineOutcome> {
    config.validate()?;
    fs::create_dir_all(&config.tests_dir)
        .with_context(|| format!("create tests dir {}", config.tests_dir.display()))?;

    println!("starting C++ unit test generation pipeline");
    println!("  project dir:  {}", config.project_dir.display());
    println!("  tests dir:    {}", config.tests_dir.display());
    println!("  build dir:    {}", config.build_dir.display());

    let generated = generate_stage(config, client)?;
    let refined = refine_stage(config, client)?;
    let verdict = build_stage(config, client, tools)?;

    println!("\npipeline completed");
    Ok(PipelineOutcome {
        generated,
        refined,
        verdict,
    })
}

/// Stage 1: generate a candidate test file for every discovered source.
fn generate_stage<C: GenerateClient>(
    config: &PipelineConfig,
    client: &C,
) -> Result<StageReport> {
    println!("\nstep 1: generating initial unit tests");
    let sources = discover_sources(&config.project_dir)?;
    println!("found {} C++ files to process:", sources.len());
    for source in &sources {
        println!("  - {}", source.display());
    }

    let mut report = StageReport::default();
    for source in &sources {
        match generate_one(config, client, source) {
            Ok(test_path) => {
                println!("generated {}", test_path.display());
                report.processed += 1;
            }
            Err(err) => {
                eprintln!("error processing {}: {err:#}", source.display());
                report.skipped += 1;
            }
        }
    }
    info!(
        processed = report.processed,
        skipped = report.skipped,
        "generation stage finished"
    );
    Ok(report)
}

fn generate_one<C: GenerateClient>(
    config: &PipelineConfig,
    client: &C,
    source: &Path,
) -> Result<PathBuf> {
    debug!(source = %source.display(), "generating tests");
    let code =
        fs::read_to_string(source).with_context(|| format!("read {}", source.display()))?;
    let template = prompt::load_template(&config.template_dir, Template::Initial)?;
    let test_code = client.generate(&prompt::generation_prompt(&template, &code))?;
    let test_path = config.tests_dir.join(test_file_name(source)?);
    fs::write(&test_path, test_code)
        .with_context(|| format!("write {}", test_path.display()))?;
    Ok(test_path)
}

/// Stage 2: refine every candidate test file in place.
fn refine_stage<C: GenerateClient>(config: &PipelineConfig, client: &C) -> Result<StageReport> {
    println!("\nstep 2: refining generated tests");
    let tests = list_test_files(&config.tests_dir)?;
    println!("found {} test files to refine:", tests.len());
    for test in &tests {
        println!("  - {}", test.display());
    }

    let mut report = StageReport::default();
    for test in &tests {
        match refine_one(config, client, test) {
            Ok(()) => {
                println!("refined {}", test.display());
                report.processed += 1;
            }
            Err(err) => {
                eprintln!("error refining {}: {err:#}", test.display());
                report.skipped += 1;
            }
        }
    }
    info!(
        processed = report.processed,
        skipped = report.skipped,
        "refinement stage finished"
    );
    Ok(report)
}

fn refine_one<C: GenerateClient>(
    config: &PipelineConfig,
    client: &C,
    test_path: &Path,
) -> Result<()> {
    debug!(test = %test_path.display(), "refining tests");
    let current =
        fs::read_to_string(test_path).with_context(|| format!("read {}", test_path.display()))?;
    let template = prompt::load_template(&config.template_dir, Template::Refine)?;
    let refined = client.generate(&prompt::refine_prompt(&template, &current))?;
    fs::write(test_path, refined)
        .with_context(|| format!("write {}", test_path.display()))?;
    Ok(())
}

/// Stages 3 and 4: build the project, then run tests and coverage.
fn build_stage<C: GenerateClient, B: BuildTools>(
    config: &PipelineConfig,
    client: &C,
    tools: &B,
) -> Result<BuildVerdict> {
    println!("\nstep 3: building project with generated tests");
    let build = tools.configure_and_build(&config.project_dir, &config.build_dir)?;
    if !build.success {
        println!("build failed");
        println!("build log:\n{}", build.log);
        let suggestion = suggest_build_fix(config, client, &build.log);
        if let Some(text) = &suggestion {
            println!("suggested fix (not applied, manual review needed):\n{text}");
        }
        return Ok(BuildVerdict::BuildFailed { suggestion });
    }
    println!("build succeeded");

    println!("\nstep 4: running tests and generating coverage");
    let tests = tools.run_tests(&config.build_dir)?;
    if !tests.success {
        println!("tests failed");
        println!("test log:\n{}", tests.log);
        return Ok(BuildVerdict::TestsFailed);
    }
    println!("tests passed");

    // Coverage is best-effort: a failure here is reported but never changes
    // the verdict.
    let coverage_report = match tools.generate_coverage(&config.build_dir) {
        Ok(path) => {
            println!("coverage report generated at {}", path.display());
            Some(path)
        }
        Err(err) => {
            eprintln!("error generating coverage: {err:#}");
            None
        }
    };
    Ok(BuildVerdict::TestsPassed { coverage_report })
}

/// Ask the model for a build-fix suggestion. Suggestions are surfaced as
/// text only; a client failure here is reported and swallowed.
fn suggest_build_fix<C: GenerateClient>(
    config: &PipelineConfig,
    client: &C,
    build_log: &str,
) -> Option<String> {
    let request = || -> Result<String> {
        let template = prompt::load_template(&config.template_dir, Template::FixBuild)?;
        Ok(client.generate(&prompt::fix_build_prompt(&template, build_log))?)
    };
    match request() {
        Ok(text) => Some(text),
        Err(err) => {
            eprintln!("error during build fix attempt: {err:#}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::build::BuildOutcome;
    use crate::test_support::{ScriptedBuildTools, ScriptedClient, TestProject};

    fn passing_tools() -> ScriptedBuildTools {
        ScriptedBuildTools::new(
            BuildOutcome {
                success: true,
                log: "configured and built".to_string(),
            },
            BuildOutcome {
                success: true,
                log: "100% tests passed".to_string(),
            },
        )
    }

    #[test]
    fn invalid_config_is_rejected_before_any_work() {
        let project = TestProject::new().expect("project");
        let config = PipelineConfig {
            max_retries: 0,
            ..project.config()
        };
        let client = ScriptedClient::answering("unused");
        let tools = passing_tools();

        let err = run_pipeline(&config, &client, &tools).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
        assert_eq!(tools.build_calls(), 0);
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn generated_file_round_trips_model_output_exactly() {
        let project = TestProject::new().expect("project");
        project.add_source("a.cpp", "int a() { return 1; }");
        let config = project.config();
        // One generation result, then nothing: the refine call fails and the
        // file keeps the generated text untouched.
        let client = ScriptedClient::scripted(vec![Ok("TEST(A, Basic) {}\n".to_string())]);
        let tools = passing_tools();

        let outcome = run_pipeline(&config, &client, &tools).expect("pipeline");
        assert_eq!(outcome.generated.processed, 1);
        assert_eq!(outcome.refined.skipped, 1);

        let written = fs::read_to_string(config.tests_dir.join("test_a.cpp")).expect("read");
        assert_eq!(written, "TEST(A, Basic) {}\n");
    }

    #[test]
    fn refinement_overwrites_the_candidate_in_place() {
        let project = TestProject::new().expect("project");
        project.add_source("a.cpp", "int a;");
        let config = project.config();
        let client = ScriptedClient::scripted(vec![
            Ok("generated".to_string()),
            Ok("refined".to_string()),
        ]);
        let tools = passing_tools();

        run_pipeline(&config, &client, &tools).expect("pipeline");

        let written = fs::read_to_string(config.tests_dir.join("test_a.cpp")).expect("read");
        assert_eq!(written, "refined");
        // The refine prompt carries the previously generated text.
        let prompts = client.prompts();
        assert!(prompts[1].contains("Test File:\ngenerated"));
    }

    #[test]
    fn per_item_failure_skips_the_file_and_continues() {
        let project = TestProject::new().expect("project");
        project.add_source("a.cpp", "int a;");
        project.add_source("b.cpp", "int b;");
        let config = project.config();
        let client = ScriptedClient::scripted_with_default(
            vec![Err(crate::llm::GenerateError::TimedOut)],
            "fallback body",
        );
        let tools = passing_tools();

        let outcome = run_pipeline(&config, &client, &tools).expect("pipeline");
        assert_eq!(outcome.generated.processed, 1);
        assert_eq!(outcome.generated.skipped, 1);

        let tests = crate::io::sources::list_test_files(&config.tests_dir).expect("list");
        assert_eq!(tests.len(), 1);
    }

    #[test]
    fn rerun_overwrites_instead_of_duplicating() {
        let project = TestProject::new().expect("project");
        project.add_source("a.cpp", "int a;");
        let config = project.config();

        let first = ScriptedClient::answering("v1");
        run_pipeline(&config, &first, &passing_tools()).expect("first run");
        let second = ScriptedClient::answering("v2");
        run_pipeline(&config, &second, &passing_tools()).expect("second run");

        let tests = crate::io::sources::list_test_files(&config.tests_dir).expect("list");
        assert_eq!(tests.len(), 1);
        let written = fs::read_to_string(&tests[0]).expect("read");
        assert_eq!(written, "v2");
    }
}
