//! Command-line entry point for the test generation pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use testgen::config::PipelineConfig;
use testgen::exit_codes;
use testgen::io::build::CmakeTools;
use testgen::io::sources::discover_sources;
use testgen::llm::OllamaClient;
use testgen::logging;
use testgen::pipeline::{BuildVerdict, run_pipeline};

#[derive(Parser)]
#[command(
    name = "testgen",
    version,
    about = "LLM-driven unit test generation pipeline for C++ projects"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, refine, build, and test unit tests for the project.
    Run(ConfigOverrides),
    /// Print the source files the pipeline would process.
    Discover(ConfigOverrides),
}

/// Optional overrides for the compiled-in defaults.
#[derive(Args)]
struct ConfigOverrides {
    /// Generation service endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Model identifier sent with every generation request.
    #[arg(long)]
    model: Option<String>,

    /// Total generation attempts per prompt.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// C++ project to generate tests for.
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Directory receiving generated test files.
    #[arg(long)]
    tests_dir: Option<PathBuf>,

    /// Build directory for the external build tool.
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Directory holding the prompt templates.
    #[arg(long)]
    template_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(request_timeout_secs) = self.request_timeout_secs {
            config.request_timeout_secs = request_timeout_secs;
        }
        if let Some(project_dir) = self.project_dir {
            config.project_dir = project_dir;
        }
        if let Some(tests_dir) = self.tests_dir {
            config.tests_dir = tests_dir;
        }
        if let Some(build_dir) = self.build_dir {
            config.build_dir = build_dir;
        }
        if let Some(template_dir) = self.template_dir {
            config.template_dir = template_dir;
        }
        config
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(overrides) => cmd_run(overrides.into_config()),
        Command::Discover(overrides) => cmd_discover(&overrides.into_config()),
    }
}

fn cmd_run(config: PipelineConfig) -> Result<i32> {
    config.validate()?;
    let client = OllamaClient::new(&config)?;
    let outcome = run_pipeline(&config, &client, &CmakeTools)?;
    Ok(match outcome.verdict {
        BuildVerdict::TestsPassed { .. } => exit_codes::OK,
        BuildVerdict::BuildFailed { .. } => exit_codes::BUILD_FAILED,
        BuildVerdict::TestsFailed => exit_codes::TESTS_FAILED,
    })
}

fn cmd_discover(config: &PipelineConfig) -> Result<i32> {
    config.validate()?;
    for source in discover_sources(&config.project_dir)? {
        println!("{}", source.display());
    }
    Ok(exit_codes::OK)
}
