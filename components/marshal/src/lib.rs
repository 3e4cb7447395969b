//! Value marshaling between the database and the script engine.
//!
//! This crate converts in both directions across the language boundary:
//! - Database to engine: nulls to `Null`, scalars to their canonical output
//!   text, rows to insertion-ordered mappings (dropped attributes skipped),
//!   arrays to tagged sequences that remember their source type
//! - Engine to database: scalar text through the target type's parse
//!   function, mappings to rows by attribute name, sequences to rectangular
//!   multi-dimensional arrays
//!
//! Both directions recurse with a shared depth guard. `record`-typed
//! results, which carry no intrinsic shape, are resolved against the
//! calling context's expected shape.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
pub mod converters;

// Re-export main types at crate root
pub use convert::{ConvError, Marshal};
pub use converters::{ArgConverter, ResultConverter};
