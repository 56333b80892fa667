//! Unified error interface for HIVE.
//!
//! Every error enum in the workspace implements [`ErrorCode`]: a stable
//! machine-readable code plus a recoverability flag. The kernel drives a
//! host OS's input system, so its propagation policy is "recover locally
//! when an explicit recovery path exists, otherwise fail fast" — the
//! recoverability flag is what callbacks and listeners consult when
//! deciding which of the two they are looking at.
//!
//! # Code Format
//!
//! - UPPER_SNAKE_CASE
//! - Prefixed with the owning layer: `PIPE_`, `DATA_`, `SYNC_`,
//!   `SCHED_`, `DECIDE_`, `ENGINE_`, `INPUT_`, `CONFIG_`, `COMMAND_`
//! - Stable once defined
//!
//! # Example
//!
//! ```
//! use hive_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum StoreError {
//!     UnknownAttribute(String),
//!     UpdateFailed(String),
//! }
//!
//! impl ErrorCode for StoreError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::UnknownAttribute(_) => "DATA_UNKNOWN_ATTRIBUTE",
//!             Self::UpdateFailed(_) => "DATA_UPDATE_FAILED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::UpdateFailed(_))
//!     }
//! }
//!
//! let err = StoreError::UpdateFailed("capture timed out".into());
//! assert_eq!(err.code(), "DATA_UPDATE_FAILED");
//! assert!(err.is_recoverable());
//! ```

/// Machine-readable error classification.
///
/// # Recoverability
///
/// An error is recoverable when retrying (or an explicit recovery path
/// such as a store error-handler or a validation re-submission) may
/// succeed. Non-recoverable errors are the fail-fast class: the caller
/// is expected to surface an alert and begin shutdown rather than limp
/// on with the host's input focus held.
pub trait ErrorCode {
    /// Returns the stable UPPER_SNAKE_CASE code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether a retry or local recovery path may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that one error code follows HIVE conventions.
///
/// # Checks
///
/// 1. Non-empty
/// 2. Starts with the owning layer's prefix
/// 3. UPPER_SNAKE_CASE
///
/// # Panics
///
/// Panics with a descriptive message when a check fails.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Asserts conventions across every variant of an error enum.
///
/// Each error module keeps an `all_variants()` helper in its tests and
/// feeds it through here so no variant escapes the convention.
///
/// # Example
///
/// ```
/// use hive_types::{ErrorCode, assert_error_codes};
///
/// #[derive(Debug)]
/// enum PipeError { Closed, Full }
///
/// impl ErrorCode for PipeError {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::Closed => "PIPE_CLOSED",
///             Self::Full => "PIPE_FULL",
///         }
///     }
///     fn is_recoverable(&self) -> bool {
///         matches!(self, Self::Full)
///     }
/// }
///
/// assert_error_codes(&[PipeError::Closed, PipeError::Full], "PIPE_");
/// ```
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
