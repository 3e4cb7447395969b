//! Sub-transaction-scoped query bridge.
//!
//! Scripted code reaches the database through this crate. Each mutating or
//! row-producing operation runs in its own sub-transaction: commit on
//! success, rollback on failure, with the failure surfacing as a catchable
//! script error and the session's resource context restored either way.
//! Cursor advancement, cursor close, and plan release skip the
//! sub-transaction wrapper.
//!
//! Once the session enters finalization every bridge operation fails with
//! a usage error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;

// Re-export main types at crate root
pub use bridge::ExecutionBridge;
