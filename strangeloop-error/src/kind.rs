//! Error kinds for strangeloop operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide what to report. None of these are
/// retried anywhere in strangeloop; the kind exists to classify, not to
/// schedule another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid argument passed to an operation
    InvalidArgument,

    // =========================================================================
    // Completion errors
    // =========================================================================
    /// No credential available for the completion service
    Configuration,

    /// Network or HTTP failure talking to the completion service
    Transport,

    /// The completion service replied with an unexpected shape
    ResponseFormat,

    // =========================================================================
    // Capability errors
    // =========================================================================
    /// Generated text contains no parseable function
    Synthesis,

    /// Unknown capability or config key
    NotFound,

    /// A capability failed while being invoked
    RuntimeFailure,

    /// The decision reply was not a valid action plan
    PlanParse,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// Filesystem operation failed
    Io,

    /// Serialization/deserialization failed
    Serialization,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::InvalidArgument => "InvalidArgument",

            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::ResponseFormat => "ResponseFormatError",

            ErrorKind::Synthesis => "SynthesisError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RuntimeFailure => "RuntimeFailure",
            ErrorKind::PlanParse => "PlanParseError",

            ErrorKind::Io => "IoError",
            ErrorKind::Serialization => "SerializationError",
        }
    }

    /// Whether the failure came from the completion service boundary
    pub fn is_completion_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::Configuration | ErrorKind::Transport | ErrorKind::ResponseFormat
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFound");
        assert_eq!(ErrorKind::PlanParse.to_string(), "PlanParseError");
        assert_eq!(ErrorKind::Configuration.to_string(), "ConfigurationError");
    }

    #[test]
    fn test_is_completion_failure() {
        assert!(ErrorKind::Transport.is_completion_failure());
        assert!(ErrorKind::ResponseFormat.is_completion_failure());
        assert!(!ErrorKind::Synthesis.is_completion_failure());
        assert!(!ErrorKind::RuntimeFailure.is_completion_failure());
    }
}
