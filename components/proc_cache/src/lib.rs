//! Compiled-procedure cache.
//!
//! Procedures compile once per (function, call kind, trust namespace) and
//! are reused until the catalog definition changes. Freshness is checked by
//! stamp on every hit. Because the trust namespace of a compilation is not
//! known until the definition is read, lookups try the caller's key and the
//! shared key before compiling.
//!
//! Compiled units are reference counted by hand: the cache owns one
//! reference and each in-flight call owns one, so redefining a function
//! mid-call never frees a unit that is still executing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod descriptor;

// Re-export main types at crate root
pub use cache::{validate_signature, CacheError, ProcedureCache};
pub use descriptor::{ProcDescriptor, ProcKey};
