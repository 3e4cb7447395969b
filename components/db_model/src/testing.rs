//! In-memory host database for tests.
//!
//! `TestDatabase` implements [`HostDatabase`] over canned query handlers:
//! tests register a closure per SQL string and the database replays it for
//! direct execution, prepared plans and cursors alike. Sub-transaction
//! calls are recorded as events so tests can assert recovery behavior.

use std::collections::{HashMap, VecDeque};

use crate::catalog::{CatalogError, FunctionDef, FunctionId, SourceStamp};
use crate::host::{Executed, HostDatabase, PlanId, QueryError};
use crate::row::Row;
use crate::types::TypeId;
use crate::value::DbValue;

/// Handler for one registered SQL string.
pub type QueryHandler = Box<dyn FnMut(&[Option<DbValue>]) -> Result<Executed, String>>;

/// A sub-transaction lifecycle event, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnEvent {
    /// `begin_subtxn` was called.
    Begin,
    /// `commit_subtxn` was called.
    Commit,
    /// `rollback_subtxn` was called.
    Rollback,
    /// `restore_connection` was called.
    Restore,
}

struct TestPlan {
    sql: String,
    param_types: Vec<TypeId>,
}

/// In-memory [`HostDatabase`] used across the component test suites.
#[derive(Default)]
pub struct TestDatabase {
    functions: HashMap<FunctionId, FunctionDef>,
    handlers: HashMap<String, QueryHandler>,
    plans: HashMap<PlanId, TestPlan>,
    cursors: HashMap<String, VecDeque<Row>>,
    /// Recorded sub-transaction events, oldest first.
    pub events: Vec<TxnEvent>,
    /// When set, `check_cancel` reports a pending cancellation.
    pub interrupted: bool,
    next_plan: u64,
    next_cursor: u64,
}

impl TestDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function definition under its own id.
    pub fn define_function(&mut self, def: FunctionDef) {
        self.functions.insert(def.id, def);
    }

    /// Replace a function's source and bump its freshness stamp, as a
    /// `CREATE OR REPLACE` would.
    pub fn redefine(&mut self, id: FunctionId, source: &str) {
        if let Some(def) = self.functions.get_mut(&id) {
            def.source = source.to_string();
            def.stamp = SourceStamp(def.stamp.0 + 1);
        }
    }

    /// Register a handler invoked whenever `sql` is executed, directly or
    /// through a prepared plan.
    pub fn install_query<F>(&mut self, sql: &str, handler: F)
    where
        F: FnMut(&[Option<DbValue>]) -> Result<Executed, String> + 'static,
    {
        self.handlers.insert(sql.to_string(), Box::new(handler));
    }

    /// Number of live prepared plans.
    pub fn live_plans(&self) -> usize {
        self.plans.len()
    }

    /// Number of open cursors.
    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    fn run(&mut self, sql: &str, args: &[Option<DbValue>]) -> Result<Executed, QueryError> {
        self.check_cancel()?;
        let handler = self
            .handlers
            .get_mut(sql)
            .ok_or_else(|| QueryError::Failed(format!("no handler for query: {sql}")))?;
        handler(args).map_err(QueryError::Failed)
    }
}

fn clamp(mut result: Executed, limit: u64) -> Executed {
    if limit > 0 {
        if let Some(rows) = result.rows.as_mut() {
            if rows.len() as u64 > limit {
                rows.truncate(limit as usize);
                result.processed = limit;
            }
        }
    }
    result
}

impl HostDatabase for TestDatabase {
    fn function(&self, id: FunctionId) -> Result<FunctionDef, CatalogError> {
        self.functions
            .get(&id)
            .cloned()
            .ok_or(CatalogError::UnknownFunction(id.0))
    }

    fn execute(
        &mut self,
        sql: &str,
        _read_only: bool,
        limit: u64,
    ) -> Result<Executed, QueryError> {
        self.run(sql, &[]).map(|r| clamp(r, limit))
    }

    fn prepare(&mut self, sql: &str, param_types: &[TypeId]) -> Result<PlanId, QueryError> {
        self.check_cancel()?;
        if !self.handlers.contains_key(sql) {
            return Err(QueryError::Failed(format!("no handler for query: {sql}")));
        }
        self.next_plan += 1;
        let id = PlanId(self.next_plan);
        self.plans.insert(
            id,
            TestPlan {
                sql: sql.to_string(),
                param_types: param_types.to_vec(),
            },
        );
        Ok(id)
    }

    fn execute_plan(
        &mut self,
        plan: PlanId,
        args: &[Option<DbValue>],
        _read_only: bool,
        limit: u64,
    ) -> Result<Executed, QueryError> {
        let entry = self.plans.get(&plan).ok_or(QueryError::UnknownPlan)?;
        if args.len() != entry.param_types.len() {
            return Err(QueryError::Failed(format!(
                "plan expects {} arguments, got {}",
                entry.param_types.len(),
                args.len()
            )));
        }
        let sql = entry.sql.clone();
        self.run(&sql, args).map(|r| clamp(r, limit))
    }

    fn open_cursor(
        &mut self,
        plan: PlanId,
        args: &[Option<DbValue>],
        read_only: bool,
    ) -> Result<String, QueryError> {
        let result = self.execute_plan(plan, args, read_only, 0)?;
        self.next_cursor += 1;
        let name = format!("cursor_{}", self.next_cursor);
        self.cursors
            .insert(name.clone(), result.rows.unwrap_or_default().into());
        Ok(name)
    }

    fn fetch(&mut self, cursor: &str, max: u64) -> Result<Vec<Row>, QueryError> {
        self.check_cancel()?;
        let queue = self
            .cursors
            .get_mut(cursor)
            .ok_or_else(|| QueryError::UnknownCursor(cursor.to_string()))?;
        let take = if max == 0 { queue.len() } else { max as usize };
        Ok(queue.drain(..take.min(queue.len())).collect())
    }

    fn close_cursor(&mut self, cursor: &str) -> Result<(), QueryError> {
        self.cursors
            .remove(cursor)
            .map(|_| ())
            .ok_or_else(|| QueryError::UnknownCursor(cursor.to_string()))
    }

    fn free_plan(&mut self, plan: PlanId) -> Result<(), QueryError> {
        self.plans.remove(&plan).map(|_| ()).ok_or(QueryError::UnknownPlan)
    }

    fn begin_subtxn(&mut self) {
        self.events.push(TxnEvent::Begin);
    }

    fn commit_subtxn(&mut self) {
        self.events.push(TxnEvent::Commit);
    }

    fn rollback_subtxn(&mut self) {
        self.events.push(TxnEvent::Rollback);
    }

    fn restore_connection(&mut self) {
        self.events.push(TxnEvent::Restore);
    }

    fn check_cancel(&self) -> Result<(), QueryError> {
        if self.interrupted {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }
}
