//! Data layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`UnknownAttribute`](DataError::UnknownAttribute) | `DATA_UNKNOWN_ATTRIBUTE` | No |
//! | [`WriteForbidden`](DataError::WriteForbidden) | `DATA_WRITE_FORBIDDEN` | No |
//! | [`UpdateFailed`](DataError::UpdateFailed) | `DATA_UPDATE_FAILED` | Yes |
//! | [`UnknownNode`](DataError::UnknownNode) | `DATA_UNKNOWN_NODE` | No |

use hive_types::ErrorCode;
use thiserror::Error;

/// Error raised by the reactive store or the minimap grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// Read or refresh of a name that was never registered.
    ///
    /// **Not recoverable** — register the attribute first.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    /// External write to an attribute outside the system allowlist.
    ///
    /// Values flow in through update functions and kernel write-backs;
    /// direct writes are reserved for identity-style attributes.
    ///
    /// **Not recoverable** — use the update path.
    #[error("attribute '{0}' is not externally writable")]
    WriteForbidden(String),

    /// The update function failed, and either no error handler was
    /// registered or the post-recovery retry failed too.
    ///
    /// **Recoverable** — the next read retries the update.
    #[error("update of '{attribute}' failed: {reason}")]
    UpdateFailed {
        /// Attribute whose update failed.
        attribute: String,
        /// Reason reported by the update function.
        reason: String,
    },

    /// Grid operation referencing a node that does not exist.
    ///
    /// **Not recoverable** — insert the node first.
    #[error("unknown grid node ({x}, {y})")]
    UnknownNode {
        /// Node x coordinate.
        x: i32,
        /// Node y coordinate.
        y: i32,
    },
}

impl ErrorCode for DataError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownAttribute(_) => "DATA_UNKNOWN_ATTRIBUTE",
            Self::WriteForbidden(_) => "DATA_WRITE_FORBIDDEN",
            Self::UpdateFailed { .. } => "DATA_UPDATE_FAILED",
            Self::UnknownNode { .. } => "DATA_UNKNOWN_NODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::UpdateFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_types::assert_error_codes;

    fn all_variants() -> Vec<DataError> {
        vec![
            DataError::UnknownAttribute("x".into()),
            DataError::WriteForbidden("x".into()),
            DataError::UpdateFailed {
                attribute: "x".into(),
                reason: "y".into(),
            },
            DataError::UnknownNode { x: 0, y: 0 },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "DATA_");
    }

    #[test]
    fn only_update_failures_recover() {
        for err in all_variants() {
            assert_eq!(
                err.is_recoverable(),
                matches!(err, DataError::UpdateFailed { .. }),
            );
        }
    }
}
