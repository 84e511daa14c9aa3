//! Build adapter wrapping the external cmake/ctest/lcov toolchain.
//!
//! The [`BuildTools`] trait decouples the pipeline from the real tools;
//! tests use scripted implementations that never spawn processes. All
//! invocations run with the build directory as working directory and block
//! until the child exits. A spawn failure (tool binary missing) is an
//! `Err`; a tool's own non-zero exit is data, not an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

/// Captured result of a build or test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub log: String,
}

/// Abstraction over the external build/test/coverage tools.
pub trait BuildTools {
    /// Configure and compile `project_dir` into `build_dir` (created if
    /// absent). On failure the log holds the first failing step's stderr.
    fn configure_and_build(&self, project_dir: &Path, build_dir: &Path) -> Result<BuildOutcome>;

    /// Run the test suite in `build_dir` with failure details enabled.
    /// The log combines stdout and stderr regardless of outcome.
    fn run_tests(&self, build_dir: &Path) -> Result<BuildOutcome>;

    /// Capture coverage and render the HTML report, best-effort: the tools'
    /// own failures are ignored. Returns the expected report index path
    /// whether or not it was produced.
    fn generate_coverage(&self, build_dir: &Path) -> Result<PathBuf>;
}

/// Expected location of the coverage report index under `build_dir`.
pub fn coverage_report_path(build_dir: &Path) -> PathBuf {
    build_dir.join("coverage").join("index.html")
}

/// Production toolchain: `cmake`, `ctest`, `lcov`, `genhtml`.
pub struct CmakeTools;

impl BuildTools for CmakeTools {
    #[instrument(skip_all, fields(project_dir = %project_dir.display(), build_dir = %build_dir.display()))]
    fn configure_and_build(&self, project_dir: &Path, build_dir: &Path) -> Result<BuildOutcome> {
        fs::create_dir_all(build_dir)
            .with_context(|| format!("create build dir {}", build_dir.display()))?;

        debug!("running cmake configure");
        let configure = Command::new("cmake")
            .arg(project_dir)
            .current_dir(build_dir)
            .output()
            .context("run cmake configure")?;
        if !configure.status.success() {
            warn!(exit_code = ?configure.status.code(), "cmake configure failed");
            return Ok(BuildOutcome {
                success: false,
                log: String::from_utf8_lossy(&configure.stderr).into_owned(),
            });
        }

        debug!("running cmake build");
        let build = Command::new("cmake")
            .args(["--build", "."])
            .current_dir(build_dir)
            .output()
            .context("run cmake build")?;
        if !build.status.success() {
            warn!(exit_code = ?build.status.code(), "cmake build failed");
            return Ok(BuildOutcome {
                success: false,
                log: String::from_utf8_lossy(&build.stderr).into_owned(),
            });
        }

        let mut log = String::from_utf8_lossy(&configure.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&build.stdout));
        Ok(BuildOutcome { success: true, log })
    }

    #[instrument(skip_all, fields(build_dir = %build_dir.display()))]
    fn run_tests(&self, build_dir: &Path) -> Result<BuildOutcome> {
        let output = Command::new("ctest")
            .arg("--output-on-failure")
            .current_dir(build_dir)
            .output()
            .context("run ctest")?;

        debug!(exit_code = ?output.status.code(), "ctest finished");
        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(BuildOutcome {
            success: output.status.success(),
            log,
        })
    }

    #[instrument(skip_all, fields(build_dir = %build_dir.display()))]
    fn generate_coverage(&self, build_dir: &Path) -> Result<PathBuf> {
        let capture = Command::new("lcov")
            .args(["--capture", "--directory", ".", "--output-file", "coverage.info"])
            .current_dir(build_dir)
            .output()
            .context("run lcov capture")?;
        if !capture.status.success() {
            warn!(exit_code = ?capture.status.code(), "lcov capture failed");
        }

        let report = Command::new("genhtml")
            .args(["coverage.info", "--output-directory", "coverage"])
            .current_dir(build_dir)
            .output()
            .context("run genhtml")?;
        if !report.status.success() {
            warn!(exit_code = ?report.status.code(), "genhtml failed");
        }

        Ok(coverage_report_path(build_dir))
    }
}
