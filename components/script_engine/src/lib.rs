//! Embedded dynamic scripting engine.
//!
//! This crate provides the engine boundary the procedural-language core is
//! built against:
//! - The closed dynamic value model (`Dynamic`): null, text scalars,
//!   sequences, insertion-ordered mappings, tagged arrays
//! - Compile and invoke of named units (`Engine`, `Callable`)
//! - A one-way capability restriction separating trusted (sandboxed) from
//!   untrusted engines
//! - The host callback surface scripts re-enter the database through
//!   (`HostApi`)
//!
//! The body language is a small s-expression dialect evaluated by a
//! tree-walking reference interpreter.
//!
//! # Example
//!
//! ```
//! use script_engine::{DeniedHost, Dynamic, Engine, EngineOptions};
//!
//! let engine = Engine::new(&EngineOptions::default()).unwrap();
//! let unit = engine.compile("double", "(* 2 (arg 0))").unwrap();
//! let out = engine
//!     .invoke(&unit, &[Dynamic::scalar("21")], None, &DeniedHost)
//!     .unwrap();
//! assert_eq!(out, Dynamic::scalar("42"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod engine;
pub mod error;
mod eval;
pub mod host;
pub mod value;

// Re-export main types at crate root
pub use engine::{Callable, Engine, EngineOptions, Program};
pub use error::ScriptError;
pub use host::{DeniedHost, HostApi};
pub use value::Dynamic;
