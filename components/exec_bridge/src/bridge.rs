//! Bridge operations.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use db_model::host::{Executed, HostDatabase, QueryError};
use db_model::types::TypeId;
use interp_pool::{InterpreterContext, InterpreterPool, PreparedQuery};
use marshal::Marshal;
use script_engine::{Dynamic, ScriptError};

/// Query operations scripted code reaches the database through.
///
/// Every operation that can change or read database state runs inside its
/// own sub-transaction: on success the sub-transaction commits, on failure
/// it rolls back and the failure surfaces as a catchable script error.
/// Cursor advancement and plan release are exempt (they only consume
/// already-materialized state).
pub struct ExecutionBridge {
    host: Rc<RefCell<dyn HostDatabase>>,
    marshal: Rc<Marshal>,
    pool: Rc<InterpreterPool>,
    name_counter: Cell<u64>,
}

impl ExecutionBridge {
    /// Create a bridge over a host database.
    pub fn new(
        host: Rc<RefCell<dyn HostDatabase>>,
        marshal: Rc<Marshal>,
        pool: Rc<InterpreterPool>,
    ) -> Self {
        Self {
            host,
            marshal,
            pool,
            name_counter: Cell::new(0),
        }
    }

    fn check_usage(&self) -> Result<(), ScriptError> {
        if self.pool.is_ending() {
            return Err(ScriptError::Usage(
                "database access is not allowed during session finalization".into(),
            ));
        }
        Ok(())
    }

    fn current_context(&self) -> Result<Rc<InterpreterContext>, ScriptError> {
        self.pool
            .current()
            .ok_or_else(|| ScriptError::Usage("no active interpreter context".into()))
    }

    fn with_subtxn<T>(
        &self,
        op: impl FnOnce(&mut dyn HostDatabase) -> Result<T, QueryError>,
    ) -> Result<T, ScriptError> {
        let mut host = self.host.borrow_mut();
        host.begin_subtxn();
        match op(&mut *host) {
            Ok(value) => {
                host.commit_subtxn();
                host.restore_connection();
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "query failed, rolling back sub-transaction");
                host.rollback_subtxn();
                host.restore_connection();
                Err(ScriptError::Host(e.to_string()))
            }
        }
    }

    fn result_to_dynamic(&self, result: Executed) -> Result<Dynamic, ScriptError> {
        let mut map = IndexMap::new();
        map.insert(
            "status".to_string(),
            Dynamic::scalar(result.status.tag()),
        );
        map.insert(
            "processed".to_string(),
            Dynamic::scalar(result.processed.to_string()),
        );
        if let Some(rows) = result.rows {
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                out.push(
                    self.marshal
                        .row_to_mapping(row)
                        .map_err(|e| ScriptError::Host(e.to_string()))?,
                );
            }
            map.insert("rows".to_string(), Dynamic::Sequence(out));
        }
        Ok(Dynamic::Mapping(map))
    }

    /// Run a SQL string; `limit` 0 means unlimited.
    pub fn execute(
        &self,
        sql: &str,
        read_only: bool,
        limit: u64,
    ) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let result = self.with_subtxn(|host| host.execute(sql, read_only, limit))?;
        self.result_to_dynamic(result)
    }

    /// Open a cursor directly over a SQL string; the throwaway plan is
    /// released once the cursor is open.
    pub fn open_cursor(&self, sql: &str, read_only: bool) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let cursor = self.with_subtxn(|host| {
            let plan = host.prepare(sql, &[])?;
            let cursor = host.open_cursor(plan, &[], read_only)?;
            host.free_plan(plan)?;
            Ok(cursor)
        })?;
        Ok(Dynamic::Scalar(cursor))
    }

    /// Fetch the next row from a cursor. Exhaustion closes the cursor and
    /// yields null, as does a cursor name that is no longer open.
    pub fn fetch(&self, cursor: &str) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let mut host = self.host.borrow_mut();
        match host.fetch(cursor, 1) {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => {
                    drop(host);
                    self.marshal
                        .row_to_mapping(&row)
                        .map_err(|e| ScriptError::Host(e.to_string()))
                }
                None => {
                    let _ = host.close_cursor(cursor);
                    Ok(Dynamic::Null)
                }
            },
            Err(QueryError::UnknownCursor(_)) => Ok(Dynamic::Null),
            Err(e) => Err(ScriptError::Host(e.to_string())),
        }
    }

    /// Close a cursor early; closing an unknown cursor is a no-op.
    pub fn close_cursor(&self, cursor: &str) -> Result<(), ScriptError> {
        self.check_usage()?;
        match self.host.borrow_mut().close_cursor(cursor) {
            Ok(()) | Err(QueryError::UnknownCursor(_)) => Ok(()),
            Err(e) => Err(ScriptError::Host(e.to_string())),
        }
    }

    /// Prepare a statement with named parameter types. The returned handle
    /// name is scoped to the active interpreter context.
    pub fn prepare(&self, sql: &str, type_names: &[String]) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let context = self.current_context()?;
        let mut param_types: Vec<TypeId> = Vec::with_capacity(type_names.len());
        for name in type_names {
            let ty = self
                .marshal
                .registry()
                .by_name(name)
                .map_err(|e| ScriptError::Host(e.to_string()))?;
            param_types.push(ty);
        }
        let plan = self.with_subtxn(|host| host.prepare(sql, &param_types))?;
        self.name_counter.set(self.name_counter.get() + 1);
        let name = format!("q{}", self.name_counter.get());
        context.insert_query(&name, PreparedQuery { plan, param_types });
        Ok(Dynamic::scalar(name))
    }

    fn lookup_prepared(
        &self,
        name: &str,
        args: &[Dynamic],
    ) -> Result<(PreparedQuery, Vec<Option<db_model::value::DbValue>>), ScriptError> {
        let context = self.current_context()?;
        let query = context.query(name).ok_or_else(|| {
            ScriptError::Host(format!("prepared query \"{name}\" does not exist"))
        })?;
        if args.len() != query.param_types.len() {
            return Err(ScriptError::Host(format!(
                "prepared query \"{name}\" expects {} arguments, got {}",
                query.param_types.len(),
                args.len()
            )));
        }
        let mut converted = Vec::with_capacity(args.len());
        for (value, ty) in args.iter().zip(&query.param_types) {
            converted.push(
                self.marshal
                    .to_database(value, *ty, None)
                    .map_err(|e| ScriptError::Host(e.to_string()))?,
            );
        }
        Ok((query, converted))
    }

    /// Execute a prepared statement with bound arguments.
    pub fn execute_prepared(
        &self,
        name: &str,
        limit: u64,
        args: &[Dynamic],
        read_only: bool,
    ) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let (query, converted) = self.lookup_prepared(name, args)?;
        let result =
            self.with_subtxn(|host| host.execute_plan(query.plan, &converted, read_only, limit))?;
        self.result_to_dynamic(result)
    }

    /// Open a cursor over a prepared statement.
    pub fn open_cursor_prepared(
        &self,
        name: &str,
        args: &[Dynamic],
        read_only: bool,
    ) -> Result<Dynamic, ScriptError> {
        self.check_usage()?;
        let (query, converted) = self.lookup_prepared(name, args)?;
        let cursor =
            self.with_subtxn(|host| host.open_cursor(query.plan, &converted, read_only))?;
        Ok(Dynamic::Scalar(cursor))
    }

    /// Release a prepared statement and its host plan.
    pub fn free_prepared(&self, name: &str) -> Result<(), ScriptError> {
        self.check_usage()?;
        let context = self.current_context()?;
        let query = context.remove_query(name).ok_or_else(|| {
            ScriptError::Host(format!("prepared query \"{name}\" does not exist"))
        })?;
        self.host
            .borrow_mut()
            .free_plan(query.plan)
            .map_err(|e| ScriptError::Host(e.to_string()))
    }
}
