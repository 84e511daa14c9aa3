//! Stable exit codes for testgen CLI commands.

/// Pipeline completed with passing tests, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration/environment or an unexpected error.
pub const INVALID: i32 = 1;
/// The configure or compile step failed.
pub const BUILD_FAILED: i32 = 2;
/// The build succeeded but the test runner reported failures.
pub const TESTS_FAILED: i32 = 3;
