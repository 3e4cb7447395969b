//! Trigger call descriptions and outcomes.

use std::rc::Rc;

use db_model::catalog::{CallerId, FunctionId};
use db_model::row::{Row, RowShape};

/// The firing statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    /// Fired by an insert.
    Insert,
    /// Fired by an update.
    Update,
    /// Fired by a delete.
    Delete,
    /// Fired by a truncate.
    Truncate,
}

impl TriggerOp {
    /// Event tag presented to the procedure.
    pub fn tag(&self) -> &'static str {
        match self {
            TriggerOp::Insert => "INSERT",
            TriggerOp::Update => "UPDATE",
            TriggerOp::Delete => "DELETE",
            TriggerOp::Truncate => "TRUNCATE",
        }
    }
}

/// When the trigger fires relative to the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    /// Before the row change is applied.
    Before,
    /// After the row change is applied.
    After,
    /// Instead of the row change.
    InsteadOf,
}

impl TriggerTiming {
    /// Timing tag presented to the procedure.
    pub fn tag(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Row-level or statement-level firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerLevel {
    /// Once per affected row.
    Row,
    /// Once per statement.
    Statement,
}

impl TriggerLevel {
    /// Level tag presented to the procedure.
    pub fn tag(&self) -> &'static str {
        match self {
            TriggerLevel::Row => "ROW",
            TriggerLevel::Statement => "STATEMENT",
        }
    }
}

/// Everything describing one trigger firing.
#[derive(Debug, Clone)]
pub struct TriggerCall {
    /// The trigger procedure.
    pub function: FunctionId,
    /// The calling identity, for trust segregation.
    pub caller: CallerId,
    /// Name of the trigger itself.
    pub trigger_name: String,
    /// Identity of the relation the trigger fired on.
    pub relation_id: u32,
    /// Name of that relation.
    pub relation_name: String,
    /// Schema the relation lives in.
    pub schema_name: String,
    /// Row shape of the relation.
    pub relation_shape: Rc<RowShape>,
    /// Statement kind that fired the trigger.
    pub op: TriggerOp,
    /// Firing time.
    pub timing: TriggerTiming,
    /// Firing level.
    pub level: TriggerLevel,
    /// Trigger arguments from the trigger definition.
    pub args: Vec<String>,
    /// The pre-change row, when the operation has one.
    pub old_row: Option<Row>,
    /// The post-change row, when the operation has one.
    pub new_row: Option<Row>,
}

impl TriggerCall {
    /// The row the operation proceeds with when the procedure does not
    /// intervene.
    pub fn pass_through(&self) -> Option<Row> {
        match self.op {
            TriggerOp::Insert | TriggerOp::Update => self.new_row.clone(),
            TriggerOp::Delete => self.old_row.clone(),
            TriggerOp::Truncate => None,
        }
    }
}

/// What the firing operation should do after the procedure ran.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Proceed with this row (possibly modified; `None` for operations
    /// with no row).
    Proceed(Option<Row>),
    /// Suppress the operation for this row.
    Skip,
}
