//! Dispatcher error taxonomy.

use thiserror::Error;

use db_model::catalog::CatalogError;
use interp_pool::PoolError;
use marshal::ConvError;
use proc_cache::CacheError;
use script_engine::ScriptError;

/// Any failure surfacing from a dispatched call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Lookup, validation, or compilation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The catalog had no such function.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Context selection failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The procedure body failed while executing.
    #[error("error during execution of function \"{name}\": {source}")]
    Exec {
        /// Function (or block) name.
        name: String,
        /// Underlying engine error.
        source: ScriptError,
    },
    /// Converting arguments or the result failed.
    #[error("error converting value for function \"{name}\": {source}")]
    Convert {
        /// Function name.
        name: String,
        /// Underlying conversion error.
        source: ConvError,
    },
    /// Argument count did not match the declared signature.
    #[error("function \"{name}\" declared {want} arguments but was called with {got}")]
    ArgumentCount {
        /// Function name.
        name: String,
        /// Declared argument count.
        want: usize,
        /// Supplied argument count.
        got: usize,
    },
    /// A set-returning function was called where no set can be consumed.
    #[error("set-valued function called in context that cannot accept a set")]
    SetContext,
    /// A set-returning function both emitted rows and returned a value.
    #[error("set-returning function \"{0}\" must either emit rows or return a sequence, not both")]
    MixedReturn(String),
    /// A set-returning function returned something other than null or a
    /// sequence.
    #[error("set-returning function \"{0}\" must return a sequence or emit rows")]
    BadSetReturn(String),
    /// A trigger procedure broke the return protocol.
    #[error("{0}")]
    TriggerProtocol(String),
}
