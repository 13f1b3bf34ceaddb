//! Runtime error helpers
//!
//! Re-exports codementor-error and provides runtime-specific conveniences.

pub use codementor_error::{Error, ErrorKind, ErrorStatus, Result};

/// Create a NetworkFailed error
pub fn network_failed(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::NetworkFailed, message)
}

/// Create a ParseFailed error
pub fn parse_error(message: impl Into<String>) -> Error {
    Error::parse_failed(message)
}

/// Create a NotFound error for a memory item
pub fn memory_not_found(namespace: &str, key: impl Into<String>) -> Error {
    Error::not_found("memory", key).with_context("namespace", namespace)
}

/// Create a NotFound error for a conversation thread
pub fn thread_not_found(thread_id: impl Into<String>) -> Error {
    Error::not_found("thread", thread_id)
}

/// Create an HTTP client construction error
pub fn client_build_failed(source: reqwest::Error) -> Error {
    Error::unexpected("failed to build HTTP client")
        .with_operation("provider::new")
        .set_source(source)
}
