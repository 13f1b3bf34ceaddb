//! Error kinds for codementor operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to a function or tool
    InvalidArgument,

    // =========================================================================
    // Store / checkpoint errors
    // =========================================================================
    /// The requested memory item or thread does not exist
    NotFound,

    /// An embedding did not have the configured number of dimensions
    DimensionMismatch,

    /// Serialization/deserialization failed
    SerializationFailed,

    /// Failed to parse input
    ParseFailed,

    // =========================================================================
    // Model errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Embedding request failed
    EmbeddingFailed,

    /// Provider not available (5xx, overloaded)
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// The provider rejected the credentials
    AuthenticationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// Network error
    NetworkFailed,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Agent errors
    // =========================================================================
    /// The model asked for a tool that is not registered
    ToolNotFound,

    /// A tool ran and failed
    ToolFailed,

    /// The agent loop ran more steps than allowed
    RecursionLimit,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Store
            ErrorKind::NotFound => "NotFound",
            ErrorKind::DimensionMismatch => "DimensionMismatch",
            ErrorKind::SerializationFailed => "SerializationFailed",
            ErrorKind::ParseFailed => "ParseFailed",

            // Model
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::EmbeddingFailed => "EmbeddingFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // IO
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::IoFailed => "IoFailed",

            // Agent
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::ToolFailed => "ToolFailed",
            ErrorKind::RecursionLimit => "RecursionLimit",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::EmbeddingFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
