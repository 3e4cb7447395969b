//! The host database interface.
//!
//! Everything the procedural-language core needs from the surrounding
//! database goes through [`HostDatabase`]: catalog lookup, direct and
//! prepared query execution, cursors, and sub-transaction control. The
//! core never touches storage directly.

use thiserror::Error;

use crate::catalog::{CatalogError, FunctionDef, FunctionId};
use crate::row::Row;
use crate::types::TypeId;
use crate::value::DbValue;

/// Handle to a prepared query plan owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanId(pub u64);

/// Kind of statement an execution ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// A row-returning query.
    Select,
    /// An insert.
    Insert,
    /// An update.
    Update,
    /// A delete.
    Delete,
    /// A utility statement with no row count semantics.
    Utility,
}

impl ExecStatus {
    /// Status tag as presented to procedure code.
    pub fn tag(&self) -> &'static str {
        match self {
            ExecStatus::Select => "SELECT",
            ExecStatus::Insert => "INSERT",
            ExecStatus::Update => "UPDATE",
            ExecStatus::Delete => "DELETE",
            ExecStatus::Utility => "UTILITY",
        }
    }
}

/// Outcome of executing a statement.
#[derive(Debug, Clone)]
pub struct Executed {
    /// What kind of statement ran.
    pub status: ExecStatus,
    /// Rows processed (returned, inserted, updated or deleted).
    pub processed: u64,
    /// Returned rows, present only for row-returning statements.
    pub rows: Option<Vec<Row>>,
}

impl Executed {
    /// A select result carrying rows.
    pub fn select(rows: Vec<Row>) -> Self {
        Self {
            status: ExecStatus::Select,
            processed: rows.len() as u64,
            rows: Some(rows),
        }
    }

    /// A command result with a processed count and no rows.
    pub fn command(status: ExecStatus, processed: u64) -> Self {
        Self {
            status,
            processed,
            rows: None,
        }
    }
}

/// Query-layer failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    /// The statement failed in the host.
    #[error("{0}")]
    Failed(String),
    /// No cursor with the given name is open.
    #[error("cursor \"{0}\" does not exist")]
    UnknownCursor(String),
    /// The plan handle does not refer to a live prepared plan.
    #[error("prepared plan does not exist")]
    UnknownPlan,
    /// The session was cancelled while the statement ran.
    #[error("query cancelled")]
    Cancelled,
}

/// The full surface the language core consumes from the host database.
///
/// Execution methods take `&mut self`; the core serializes access through a
/// single owner, matching the single-session model.
pub trait HostDatabase {
    /// Look up a function definition in the catalog.
    fn function(&self, id: FunctionId) -> Result<FunctionDef, CatalogError>;

    /// Execute a SQL string. `limit` of 0 means unlimited rows.
    fn execute(
        &mut self,
        sql: &str,
        read_only: bool,
        limit: u64,
    ) -> Result<Executed, QueryError>;

    /// Prepare a statement with typed parameter placeholders.
    fn prepare(&mut self, sql: &str, param_types: &[TypeId]) -> Result<PlanId, QueryError>;

    /// Execute a prepared plan with bound arguments.
    fn execute_plan(
        &mut self,
        plan: PlanId,
        args: &[Option<DbValue>],
        read_only: bool,
        limit: u64,
    ) -> Result<Executed, QueryError>;

    /// Open a cursor over a prepared plan; returns the cursor name.
    fn open_cursor(
        &mut self,
        plan: PlanId,
        args: &[Option<DbValue>],
        read_only: bool,
    ) -> Result<String, QueryError>;

    /// Fetch up to `max` rows from an open cursor. An empty result means
    /// the cursor is exhausted.
    fn fetch(&mut self, cursor: &str, max: u64) -> Result<Vec<Row>, QueryError>;

    /// Close an open cursor.
    fn close_cursor(&mut self, cursor: &str) -> Result<(), QueryError>;

    /// Release a prepared plan.
    fn free_plan(&mut self, plan: PlanId) -> Result<(), QueryError>;

    /// Start a sub-transaction.
    fn begin_subtxn(&mut self);

    /// Commit the innermost sub-transaction.
    fn commit_subtxn(&mut self);

    /// Roll back the innermost sub-transaction.
    fn rollback_subtxn(&mut self);

    /// Re-establish the session's resource context after a sub-transaction
    /// ends. Hosts with no such notion keep the default no-op.
    fn restore_connection(&mut self) {}

    /// Check for a pending cancellation request.
    fn check_cancel(&self) -> Result<(), QueryError> {
        Ok(())
    }
}
