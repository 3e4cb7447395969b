//! Interpreter context pool.
//!
//! A session holds at most one untrusted context (shared across callers)
//! and one trusted context per caller identity. Because an engine must
//! exist before the first trust decision is known, the pool creates a held
//! engine eagerly and the first selected context adopts it; the trust lock
//! is applied at adoption time and is permanent for that engine.
//!
//! The pool also tracks which context is active (cursor and prepared-query
//! handles are only meaningful in their owning context) and the session
//! finalization flag that disables database bridge operations during
//! teardown.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pool;
pub mod settings;

// Re-export main types at crate root
pub use pool::{InterpreterContext, InterpreterPool, PoolError, PreparedQuery};
pub use settings::Settings;
