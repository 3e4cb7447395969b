//! The callback surface scripted code re-enters the host through.

use crate::error::ScriptError;
use crate::value::Dynamic;

/// Host operations available to a running script.
///
/// The bridge component implements this over the real database; contexts
/// where database access is off-limits (engine init code, teardown hooks)
/// get [`DeniedHost`].
pub trait HostApi {
    /// Run a SQL string; `limit` of 0 means unlimited rows. Returns a
    /// result mapping (status, processed count, rows).
    fn execute(&self, sql: &str, limit: u64) -> Result<Dynamic, ScriptError>;

    /// Open a cursor directly over a SQL string; returns the cursor name.
    fn open_cursor(&self, sql: &str) -> Result<Dynamic, ScriptError>;

    /// Fetch the next row from a cursor; `Null` when exhausted.
    fn fetch(&self, cursor: &str) -> Result<Dynamic, ScriptError>;

    /// Close a cursor early.
    fn close_cursor(&self, cursor: &str) -> Result<(), ScriptError>;

    /// Prepare a statement with named parameter types; returns a handle
    /// name scoped to the current interpreter context.
    fn prepare(&self, sql: &str, param_types: &[String]) -> Result<Dynamic, ScriptError>;

    /// Execute a previously prepared statement.
    fn execute_prepared(
        &self,
        name: &str,
        limit: u64,
        args: &[Dynamic],
    ) -> Result<Dynamic, ScriptError>;

    /// Open a cursor over a previously prepared statement.
    fn open_cursor_prepared(&self, name: &str, args: &[Dynamic]) -> Result<Dynamic, ScriptError>;

    /// Release a prepared statement.
    fn free_prepared(&self, name: &str) -> Result<(), ScriptError>;

    /// Emit one row of a set-returning result.
    fn emit(&self, value: Dynamic) -> Result<(), ScriptError>;
}

/// A host that refuses every operation with a usage error.
pub struct DeniedHost;

impl DeniedHost {
    fn refuse<T>(&self) -> Result<T, ScriptError> {
        Err(ScriptError::Usage(
            "database access is not allowed in this context".into(),
        ))
    }
}

impl HostApi for DeniedHost {
    fn execute(&self, _sql: &str, _limit: u64) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn open_cursor(&self, _sql: &str) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn fetch(&self, _cursor: &str) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn close_cursor(&self, _cursor: &str) -> Result<(), ScriptError> {
        self.refuse()
    }

    fn prepare(&self, _sql: &str, _param_types: &[String]) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn execute_prepared(
        &self,
        _name: &str,
        _limit: u64,
        _args: &[Dynamic],
    ) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn open_cursor_prepared(&self, _name: &str, _args: &[Dynamic]) -> Result<Dynamic, ScriptError> {
        self.refuse()
    }

    fn free_prepared(&self, _name: &str) -> Result<(), ScriptError> {
        self.refuse()
    }

    fn emit(&self, _value: Dynamic) -> Result<(), ScriptError> {
        self.refuse()
    }
}
