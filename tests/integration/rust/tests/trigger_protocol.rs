//! Trigger Protocol Integration Tests
//!
//! Exercises trigger firings end to end: event data, row rewriting,
//! suppression, and the interplay with the query bridge.

use call_dispatch::{
    DispatchError, TriggerCall, TriggerLevel, TriggerOp, TriggerOutcome, TriggerTiming,
};
use db_model::catalog::{CallerId, FunctionDef, FunctionId, SourceStamp, Volatility};
use db_model::host::{ExecStatus, Executed};
use db_model::row::{Row, RowShape};
use db_model::testing::TxnEvent;
use db_model::types::builtin;
use db_model::value::DbValue;
use integration_tests::harness;
use interp_pool::Settings;

fn def(id: u32, source: &str) -> FunctionDef {
    FunctionDef {
        id: FunctionId(id),
        name: format!("trg_fn{id}"),
        source: source.into(),
        arg_types: vec![],
        return_type: builtin::TRIGGER,
        returns_set: false,
        volatility: Volatility::Volatile,
        trusted: true,
        stamp: SourceStamp(1),
    }
}

fn item_shape() -> std::rc::Rc<RowShape> {
    RowShape::of(&[("id", builtin::INT), ("label", builtin::TEXT)])
}

fn item(id: i64, label: &str) -> Row {
    Row::from_parts(
        item_shape(),
        vec![Some(DbValue::Int(id)), Some(DbValue::Text(label.into()))],
    )
    .unwrap()
}

fn firing(id: u32, op: TriggerOp) -> TriggerCall {
    let (old_row, new_row) = match op {
        TriggerOp::Insert => (None, Some(item(2, "new"))),
        TriggerOp::Update => (Some(item(1, "old")), Some(item(2, "new"))),
        TriggerOp::Delete => (Some(item(1, "old")), None),
        TriggerOp::Truncate => (None, None),
    };
    TriggerCall {
        function: FunctionId(id),
        caller: CallerId(1),
        trigger_name: "items_audit".into(),
        relation_id: 5005,
        relation_name: "items".into(),
        schema_name: "public".into(),
        relation_shape: item_shape(),
        op,
        timing: TriggerTiming::Before,
        level: TriggerLevel::Row,
        args: vec!["first".into(), "second".into()],
        old_row,
        new_row,
    }
}

/// Test: the event mapping exposes the firing details
#[test]
fn test_event_data_is_complete() {
    let (db, d) = harness(Settings::default());
    // Checks every field; any mismatch raises with the field name.
    let body = "\
        (do \
          (if (not (eq (get (td) \"name\") \"items_audit\")) (error \"name\")) \
          (if (not (eq (get (td) \"event\") \"UPDATE\")) (error \"event\")) \
          (if (not (eq (get (td) \"when\") \"BEFORE\")) (error \"when\")) \
          (if (not (eq (get (td) \"level\") \"ROW\")) (error \"level\")) \
          (if (not (eq (get (td) \"relname\") \"items\")) (error \"relname\")) \
          (if (not (eq (get (td) \"table_schema\") \"public\")) (error \"schema\")) \
          (if (not (eq (get (td) \"argc\") 2)) (error \"argc\")) \
          (if (not (eq (get (get (td) \"args\") 1) \"second\")) (error \"args\")) \
          (if (not (eq (arg 0) \"first\")) (error \"arg 0\")) \
          (if (not (eq (get (get (td) \"old\") \"label\") \"old\")) (error \"old\")) \
          (if (not (eq (get (get (td) \"new\") \"id\") 2)) (error \"new\")) \
          null)";
    db.borrow_mut().define_function(def(1, body));
    let call = firing(1, TriggerOp::Update);
    let out = d.trigger(&call).unwrap();
    assert_eq!(out, TriggerOutcome::Proceed(call.new_row.clone()));
}

/// Test: a before-insert trigger rewrites the incoming row
#[test]
fn test_modify_rewrites_insert_row() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(do (set-td (put (td) \"new\" \
               (put (get (td) \"new\") \"label\" \"stamped\"))) \
             \"MODIFY\")",
    ));
    match d.trigger(&firing(1, TriggerOp::Insert)).unwrap() {
        TriggerOutcome::Proceed(Some(row)) => {
            assert_eq!(row.get(0), Some(&DbValue::Int(2)));
            assert_eq!(row.get(1), Some(&DbValue::Text("stamped".into())));
        }
        other => panic!("expected rewritten row, got {other:?}"),
    }
}

/// Test: "SKIP" suppresses the operation
#[test]
fn test_skip_suppresses_operation() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(if (eq (get (get (td) \"new\") \"label\") \"new\") \"SKIP\" null)",
    ));
    let out = d.trigger(&firing(1, TriggerOp::Insert)).unwrap();
    assert_eq!(out, TriggerOutcome::Skip);
}

/// Test: "MODIFY" on delete is downgraded to a pass-through
#[test]
fn test_modify_on_delete_downgrades() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "\"MODIFY\""));
    let call = firing(1, TriggerOp::Delete);
    let out = d.trigger(&call).unwrap();
    assert_eq!(out, TriggerOutcome::Proceed(call.old_row.clone()));
}

/// Test: statement-level truncate proceeds with no row
#[test]
fn test_truncate_has_no_row() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(if (eq (get (td) \"event\") \"TRUNCATE\") null (error \"bad event\"))",
    ));
    let mut call = firing(1, TriggerOp::Truncate);
    call.level = TriggerLevel::Statement;
    let out = d.trigger(&call).unwrap();
    assert_eq!(out, TriggerOutcome::Proceed(None));
}

/// Test: trigger bodies can run queries through the bridge
#[test]
fn test_trigger_can_query() {
    let (db, d) = harness(Settings::default());
    {
        let mut db = db.borrow_mut();
        db.install_query("insert into audit", |_| {
            Ok(Executed::command(ExecStatus::Insert, 1))
        });
        db.define_function(def(1, "(do (exec \"insert into audit\") null)"));
    }
    d.trigger(&firing(1, TriggerOp::Insert)).unwrap();
    assert_eq!(
        db.borrow().events,
        vec![TxnEvent::Begin, TxnEvent::Commit, TxnEvent::Restore]
    );
}

/// Test: anything but null, "SKIP", or "MODIFY" is a protocol error
#[test]
fn test_unrecognized_return_is_rejected() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "\"CANCEL\""));
    assert!(matches!(
        d.trigger(&firing(1, TriggerOp::Insert)),
        Err(DispatchError::TriggerProtocol(_))
    ));
}

/// Test: an empty-string return is not a pass-through, it is an error
#[test]
fn test_empty_string_return_is_rejected() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "(concat)"));
    assert!(matches!(
        d.trigger(&firing(1, TriggerOp::Insert)),
        Err(DispatchError::TriggerProtocol(_))
    ));
}

/// Test: the SKIP and MODIFY markers are matched case-insensitively
#[test]
fn test_markers_are_case_insensitive() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "\"skip\""));
    let out = d.trigger(&firing(1, TriggerOp::Insert)).unwrap();
    assert_eq!(out, TriggerOutcome::Skip);
}

/// Test: a modified row naming a column the relation lacks fails conversion
#[test]
fn test_modified_row_with_unknown_column_is_rejected() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(do (set-td (put (td) \"new\" \
               (put (get (td) \"new\") \"bogus\" 1))) \
             \"MODIFY\")",
    ));
    assert!(matches!(
        d.trigger(&firing(1, TriggerOp::Insert)),
        Err(DispatchError::Convert { .. })
    ));
}

/// Test: calling a trigger procedure as a plain function is refused
#[test]
fn test_trigger_function_requires_trigger_context() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "null"));
    let plain = call_dispatch::FunctionCall {
        function: FunctionId(1),
        caller: CallerId(1),
        args: vec![],
        expected_shape: None,
    };
    assert!(matches!(
        d.call(&plain),
        Err(DispatchError::Cache(proc_cache::CacheError::TriggerOnly))
    ));
}
