//! Host database value model and external interface boundary.
//!
//! This crate defines the structured value model of the host database
//! (scalars, composite rows, multi-dimensional arrays, nulls), the type
//! metadata registry with per-type parse/output entry points, and the
//! `HostDatabase` trait through which the procedural-language core consumes
//! the database: catalog lookup, query execution, cursors, prepared plans,
//! and sub-transaction control.
//!
//! The `testing` module provides an in-memory `TestDatabase` used by the
//! other components' test suites.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod host;
pub mod row;
pub mod testing;
pub mod types;
pub mod value;

// Re-export main types at crate root
pub use catalog::{CallerId, CatalogError, FunctionDef, FunctionId, SourceStamp, Volatility};
pub use host::{ExecStatus, Executed, HostDatabase, PlanId, QueryError};
pub use row::{Attribute, Row, RowShape};
pub use types::{builtin, ScalarIo, TypeClass, TypeError, TypeId, TypeMeta, TypeRegistry};
pub use value::{DbArray, DbValue};
