//! FFI error types.

use gpi_core::{GpiError, Severity};

/// Errors raised while crossing the C boundary.
#[derive(Debug, thiserror::Error)]
pub enum FfiError {
    /// A required pointer argument was null.
    #[error("null argument: {what}")]
    NullArgument { what: &'static str },

    /// A string argument was not valid UTF-8.
    #[error("{what} is not valid UTF-8")]
    InvalidUtf8 { what: &'static str },

    /// A numeric code argument is outside its enumeration.
    #[error("invalid {what} code {code}")]
    InvalidCode { what: &'static str, code: i32 },

    /// The simulator asked for a backend this library does not provide.
    #[error("unknown adapter '{0}'")]
    UnknownAdapter(String),

    #[error(transparent)]
    Gpi(#[from] GpiError),
}

impl FfiError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Gpi(err) => err.severity(),
            _ => Severity::Error,
        }
    }
}

/// Result type alias for FFI operations.
pub type Result<T> = std::result::Result<T, FfiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpi_errors_keep_their_severity() {
        let miss: FfiError = GpiError::not_found("top.x").into();
        assert_eq!(miss.severity(), Severity::Debug);
        assert_eq!(miss.to_string(), "not found: top.x");
        let broken: FfiError = GpiError::corrupted("stale").into();
        assert_eq!(broken.severity(), Severity::Critical);
        let null = FfiError::NullArgument { what: "name" };
        assert_eq!(null.severity(), Severity::Error);
        assert_eq!(
            FfiError::InvalidCode { what: "edge", code: 9 }.to_string(),
            "invalid edge code 9"
        );
    }
}
