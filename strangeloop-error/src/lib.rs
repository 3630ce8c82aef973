//! # strangeloop-error
//!
//! Unified error handling for strangeloop.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., NotFound, PlanParse)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use strangeloop_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::NotFound, "capability 'double_number' not found")
//!         .with_operation("registry::describe")
//!         .with_context("capability", "double_number"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, strangeloop_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;

pub use error::Error;
pub use kind::ErrorKind;

/// Result type alias using strangeloop Error
pub type Result<T> = std::result::Result<T, Error>;
