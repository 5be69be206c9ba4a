//! Structured error handling and exit codes.

use serde::Serialize;

/// How a `detect` or `delete` run ended.
///
/// `PartialSuccess` wins over `Success` and `NoDuplicates` whenever any file
/// was skipped during ingestion or failed during a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The run completed and found (or removed) duplicates.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The run completed and nothing needs removing.
    NoDuplicates = 2,
    /// The run completed but some files were skipped or failed.
    PartialSuccess = 3,
    /// The run was interrupted by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Stable tag printed in front of error messages.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "JD000",
            Self::GeneralError => "JD001",
            Self::NoDuplicates => "JD002",
            Self::PartialSuccess => "JD003",
            Self::Interrupted => "JD130",
        }
    }

    /// Pick the exit code for an error escaping `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let interrupted = err
            .downcast_ref::<crate::duplicates::FinderError>()
            .is_some_and(|e| matches!(e, crate::duplicates::FinderError::Interrupted));
        if interrupted {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Error payload printed on stderr with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    pub code: String,
    pub exit_code: i32,
    /// The error followed by its context chain.
    pub message: String,
    pub interrupted: bool,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
