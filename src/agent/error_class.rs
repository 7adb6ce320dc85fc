//! Error taxonomy attached to ledger entries and batch results
//!
//! Distinct from [`crate::error::Error`]: a tool failure must be *recorded*
//! on the session ledger, not necessarily propagated as a Rust `Err`. This
//! enum is the vocabulary the control loop and batch executor use to
//! classify what went wrong without unwinding the step.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    UnknownTool,
    ToolDisabled,
    ValidationError,
    DestructiveBlocked,
    DuplicateBlocked,
    AccessDenied,
    Timeout,
    NetworkError,
    FileNotFound,
    JsonParseError,
    PathOutsideSandbox,
    ExecutionError,
    BatchValidationError,
    BatchError,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::UnknownTool => "unknown_tool",
            ErrorClass::ToolDisabled => "tool_disabled",
            ErrorClass::ValidationError => "validation_error",
            ErrorClass::DestructiveBlocked => "destructive_blocked",
            ErrorClass::DuplicateBlocked => "duplicate_blocked",
            ErrorClass::AccessDenied => "access_denied",
            ErrorClass::Timeout => "timeout",
            ErrorClass::NetworkError => "network_error",
            ErrorClass::FileNotFound => "file_not_found",
            ErrorClass::JsonParseError => "json_parse_error",
            ErrorClass::PathOutsideSandbox => "path_outside_sandbox",
            ErrorClass::ExecutionError => "execution_error",
            ErrorClass::BatchValidationError => "batch_validation_error",
            ErrorClass::BatchError => "batch_error",
        }
    }

    /// Classify a crate [`Error`] onto the taxonomy, falling back to
    /// `execution_error` for anything not explicitly mapped.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::UnknownTool(_) => ErrorClass::UnknownTool,
            Error::ToolDisabled(_) => ErrorClass::ToolDisabled,
            Error::ValidationError(_) => ErrorClass::ValidationError,
            Error::DestructiveBlocked(_) => ErrorClass::DestructiveBlocked,
            Error::DuplicateBlocked(_) => ErrorClass::DuplicateBlocked,
            Error::PathOutsideSandbox(_) => ErrorClass::PathOutsideSandbox,
            Error::AccessDenied(_) => ErrorClass::AccessDenied,
            Error::Timeout(_) => ErrorClass::Timeout,
            Error::NetworkError(_) | Error::Http(_) => ErrorClass::NetworkError,
            Error::JsonParseError(_) | Error::Json(_) => ErrorClass::JsonParseError,
            Error::BatchValidationError(_) => ErrorClass::BatchValidationError,
            Error::BatchError(_) => ErrorClass::BatchError,
            Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                ErrorClass::FileNotFound
            }
            _ => ErrorClass::ExecutionError,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_error_variants() {
        assert_eq!(
            ErrorClass::from_error(&Error::UnknownTool("x".into())).as_str(),
            "unknown_tool"
        );
        assert_eq!(
            ErrorClass::from_error(&Error::DuplicateBlocked("x".into())).as_str(),
            "duplicate_blocked"
        );
    }

    #[test]
    fn file_not_found_io_error_maps_correctly() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(
            ErrorClass::from_error(&Error::Io(io_err)).as_str(),
            "file_not_found"
        );
    }

    #[test]
    fn unmapped_errors_fall_back_to_execution_error() {
        assert_eq!(
            ErrorClass::from_error(&Error::Internal("boom".into())).as_str(),
            "execution_error"
        );
    }
}
