//! GPI error types.

use crate::handle::HandleId;
use crate::log::Severity;

/// Errors that can occur while resolving, reading, writing or scheduling
/// against a simulator backend.
#[derive(Debug, thiserror::Error)]
pub enum GpiError {
    /// A name or index did not resolve to any object.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The toplevel resolved, but it is not the unit that was asked for.
    #[error("toplevel '{found}' does not match requested '{requested}'")]
    RootMismatch { requested: String, found: String },

    /// The handle id was never issued or has already been released.
    #[error("invalid handle: {0}")]
    InvalidHandle(HandleId),

    /// A native reference the adapter holds no record of.
    #[error("{backend} has no record of native reference {raw:#x}")]
    UnknownReference { backend: &'static str, raw: usize },

    /// The object kind or relation cannot be enumerated or converted by
    /// this adapter.
    #[error("unsupported: {detail}")]
    Unsupported { detail: String },

    /// A value could not be encoded for the target object.
    #[error("invalid value: {detail}")]
    InvalidValue { detail: String },

    /// A native call failed.
    #[error("{backend} rejected {operation}: {detail}")]
    BackendRejected {
        backend: &'static str,
        operation: &'static str,
        detail: String,
    },

    /// An internal invariant was violated.
    #[error("internal state corrupted: {detail}")]
    Corrupted { detail: String },

    /// Configuration could not be loaded.
    #[error("configuration error: {detail}")]
    Config { detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GpiError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::Unsupported {
            detail: detail.into(),
        }
    }

    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            detail: detail.into(),
        }
    }

    pub fn rejected(
        backend: &'static str,
        operation: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::BackendRejected {
            backend,
            operation,
            detail: detail.into(),
        }
    }

    pub fn corrupted(detail: impl Into<String>) -> Self {
        Self::Corrupted {
            detail: detail.into(),
        }
    }

    /// Whether this is a resolution miss the caller is expected to handle.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::RootMismatch { .. } | Self::InvalidHandle(_)
        )
    }

    /// Severity this error is reported at when it crosses the C boundary.
    pub fn severity(&self) -> Severity {
        match self {
            Self::NotFound { .. } | Self::RootMismatch { .. } => Severity::Debug,
            Self::Unsupported { .. } | Self::InvalidValue { .. } => Severity::Warning,
            Self::InvalidHandle(_)
            | Self::UnknownReference { .. }
            | Self::BackendRejected { .. }
            | Self::Config { .. }
            | Self::Toml(_)
            | Self::Io(_) => Severity::Error,
            Self::Corrupted { .. } => Severity::Critical,
        }
    }
}

/// Result type alias for GPI operations.
pub type Result<T> = std::result::Result<T, GpiError>;

/// Log an unrecoverable error and abort.
///
/// Continuing after internal state is corrupted risks writing through
/// stale simulator-owned pointers, so there is no unwinding path here.
pub fn fatal(err: &GpiError) -> ! {
    tracing::error!(critical = true, "{err}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_class() {
        assert!(GpiError::not_found("top.x").is_not_found());
        assert!(GpiError::RootMismatch {
            requested: "a".to_string(),
            found: "b".to_string()
        }
        .is_not_found());
        assert!(!GpiError::unsupported("kind 12").is_not_found());
    }

    #[test]
    fn severities_follow_taxonomy() {
        assert_eq!(GpiError::not_found("x").severity(), Severity::Debug);
        assert_eq!(GpiError::unsupported("x").severity(), Severity::Warning);
        assert_eq!(
            GpiError::rejected("vpi", "put_value", "x").severity(),
            Severity::Error
        );
        assert_eq!(GpiError::corrupted("x").severity(), Severity::Critical);
        let unknown = GpiError::UnknownReference {
            backend: "fli",
            raw: 0x40,
        };
        assert_eq!(unknown.severity(), Severity::Error);
        assert!(!unknown.is_not_found());
    }

    #[test]
    fn mismatch_message_names_both_units() {
        let err = GpiError::RootMismatch {
            requested: "dut".to_string(),
            found: "tb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dut") && msg.contains("tb"));
    }
}
