//! Engine error taxonomy.

use thiserror::Error;

/// Any failure crossing the engine boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    /// The source text failed to compile.
    #[error("compile error: {0}")]
    Compile(String),
    /// The script raised or tripped a runtime fault. Catchable from
    /// script code.
    #[error("{0}")]
    Runtime(String),
    /// A capability locked out of the restricted engine was used.
    #[error("trusted code violation: {0}")]
    Trust(String),
    /// A host (database) operation failed; the message carries the host's
    /// diagnostic. Catchable from script code.
    #[error("{0}")]
    Host(String),
    /// A host operation was used in a context that forbids it.
    #[error("{0}")]
    Usage(String),
    /// Evaluation exceeded the recursion depth limit.
    #[error("expression nesting exceeds depth limit of {0}")]
    DepthExceeded(usize),
}
