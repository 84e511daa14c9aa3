//! LLM-driven unit test generation pipeline for C++ projects.
//!
//! This crate drives a locally hosted language model through four
//! sequential stages: generate a candidate test file for every C++ source,
//! refine each candidate in place, build the project, then run the tests
//! and capture coverage. The architecture separates:
//!
//! - **[`llm`]**: the generation service client, with typed bounded retry
//!   on transient network failures.
//! - **[`io`]**: side-effecting operations (source discovery, template
//!   loading, external build/test/coverage tools), each behind a seam that
//!   tests replace with scripted doubles.
//! - **[`pipeline`]**: orchestration of the stages over a
//!   [`config::PipelineConfig`].

pub mod config;
pub mod exit_codes;
pub mod io;
pub mod llm;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
