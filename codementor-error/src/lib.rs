//! # codementor-error
//!
//! Unified error handling for the codementor workspace.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., NotFound, InferenceFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use codementor_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::NotFound, "memory 'abc' not found")
//!         .with_operation("store::get")
//!         .with_context("namespace", "memories")
//!         .with_context("key", "abc"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, codementor_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the codementor Error
pub type Result<T> = std::result::Result<T, Error>;
