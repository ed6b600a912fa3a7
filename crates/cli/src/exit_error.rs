//! Error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, so `main()` decides how the process ends.

use std::fmt;

/// The tracked job finished with `failed`.
pub const EXIT_JOB_FAILED: i32 = 1;
/// The status stream was lost before the job finished.
pub const EXIT_CONNECTION_LOST: i32 = 2;
/// Interrupted with Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
