//! Prompt template loading and per-stage prompt assembly.
//!
//! Templates are plain text, read fresh from disk on every use (edits take
//! effect mid-run) and prepended verbatim to the per-stage content with a
//! fixed separator line.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// The three per-stage prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Initial generation: produce tests from a source file.
    Initial,
    /// Refinement: improve a candidate test file.
    Refine,
    /// Build fix: suggest a repair for a failed build.
    FixBuild,
}

impl Template {
    pub fn file_name(self) -> &'static str {
        match self {
            Template::Initial => "initial.md",
            Template::Refine => "refine.md",
            Template::FixBuild => "fix_build.md",
        }
    }
}

/// Read a template from `template_dir`. No caching across calls.
pub fn load_template(template_dir: &Path, template: Template) -> Result<String> {
    let path = template_dir.join(template.file_name());
    fs::read_to_string(&path).with_context(|| format!("read template {}", path.display()))
}

pub fn generation_prompt(template: &str, source: &str) -> String {
    format!("{template}\n\nC++ Source File:\n{source}")
}

pub fn refine_prompt(template: &str, test_code: &str) -> String {
    format!("{template}\n\nTest File:\n{test_code}")
}

pub fn fix_build_prompt(template: &str, build_log: &str) -> String {
    format!("{template}\n\nBuild Log:\n{build_log}")
}
