//! Call dispatcher: the top of the procedural-language core.
//!
//! This crate wires the pool, cache, converter, and query bridge together
//! and exposes the four entry points the host database drives:
//! - [`CallDispatcher::call`] — plain function calls, including
//!   set-returning functions with the emit protocol and the
//!   sequence-batch fallback
//! - [`CallDispatcher::trigger`] — trigger firings with the
//!   null/`SKIP`/`MODIFY` return protocol
//! - [`CallDispatcher::run_inline`] — anonymous code blocks
//! - [`CallDispatcher::validate`] — definition-time validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod trigger;

// Re-export main types at crate root
pub use dispatcher::{CallDispatcher, CallResult, FunctionCall};
pub use error::DispatchError;
pub use trigger::{TriggerCall, TriggerLevel, TriggerOp, TriggerOutcome, TriggerTiming};
