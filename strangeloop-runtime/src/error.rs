//! Runtime error helpers
//!
//! Re-exports strangeloop-error and provides runtime-specific conveniences.

use std::path::Path;

pub use strangeloop_error::{Error, ErrorKind, Result};

/// Create an Io error that names the file involved
pub fn io_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::new(ErrorKind::Io, format!("failed to {} {}: {}", action, path.display(), err))
        .with_context("path", path.display().to_string())
        .set_source(err)
}

/// Create a Serialization error from a serde_json failure
pub fn serialization_error(what: &str, err: serde_json::Error) -> Error {
    Error::serialization(format!("failed to serialize {}: {}", what, err)).set_source(err)
}

/// Create a RuntimeFailure from a script engine error
pub fn script_failure(name: &str, err: &rhai::EvalAltResult) -> Error {
    Error::runtime_failure(name, err.to_string()).with_operation("script::call")
}
