//! Exit codes and structured errors for the `wmscan` binary.
//!
//! The library reports outcomes as typed values; only the harness turns
//! them into process exit codes.

use serde::Serialize;

/// Exit codes of the `wmscan` binary.
///
/// - 0: Success (codes captured or document delivered)
/// - 1: General error
/// - 2: Nothing captured (session closed without codes)
/// - 3: Scanner fault (camera or input failure)
/// - 4: Delivery failed
/// - 130: Interrupted before anything was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// Unexpected failure.
    GeneralError = 1,
    /// Session closed without codes.
    NothingCaptured = 2,
    /// Session ended on a device fault.
    ScanFault = 3,
    /// Document could not be delivered.
    DeliveryFailed = 4,
    /// Ctrl+C with nothing captured.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "WM000",
            Self::GeneralError => "WM001",
            Self::NothingCaptured => "WM002",
            Self::ScanFault => "WM003",
            Self::DeliveryFailed => "WM004",
            Self::Interrupted => "WM130",
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Error code (e.g. "WM004").
    pub code: String,
    /// Exit code number.
    pub exit_code: i32,
    /// Human-readable message, including the cause chain.
    pub message: String,
    /// Whether retrying the same operation may succeed.
    pub retryable: bool,
}

impl StructuredError {
    /// Structured form of an error and its exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        let retryable = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<crate::delivery::DeliveryError>())
            .is_some_and(crate::delivery::DeliveryError::is_retryable);
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryError;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::DeliveryFailed.as_i32(), 4);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
        assert_eq!(ExitCode::ScanFault.code_prefix(), "WM003");
    }

    #[test]
    fn test_structured_error_from_delivery() {
        let err = anyhow::Error::new(DeliveryError::write(
            "/labels/a.pdf",
            std::io::Error::other("disk full"),
        ))
        .context("Failed to deliver labels");
        let structured = StructuredError::new(&err, ExitCode::DeliveryFailed);
        assert_eq!(structured.code, "WM004");
        assert!(structured.retryable);
        assert!(structured.message.contains("disk full"));

        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"exit_code\":4"));
    }

    #[test]
    fn test_structured_error_not_retryable() {
        let err = anyhow::Error::new(DeliveryError::EmptyDocument);
        assert!(!StructuredError::new(&err, ExitCode::DeliveryFailed).retryable);
    }
}
