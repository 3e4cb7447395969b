//! Full Call Path Integration Tests
//!
//! Tests the complete flow: catalog function -> compile -> invoke ->
//! query bridge -> value conversion -> result.

use std::rc::Rc;

use call_dispatch::{CallResult, FunctionCall};
use db_model::catalog::{CallerId, FunctionDef, FunctionId, SourceStamp, Volatility};
use db_model::host::Executed;
use db_model::row::{Row, RowShape};
use db_model::types::{builtin, TypeId};
use db_model::value::{array_1d, DbValue};
use integration_tests::harness;
use interp_pool::Settings;

fn def(id: u32, source: &str, arg_types: Vec<TypeId>, return_type: TypeId) -> FunctionDef {
    FunctionDef {
        id: FunctionId(id),
        name: format!("f{id}"),
        source: source.into(),
        arg_types,
        return_type,
        returns_set: false,
        volatility: Volatility::Volatile,
        trusted: true,
        stamp: SourceStamp(1),
    }
}

fn call(id: u32, args: Vec<Option<DbValue>>) -> FunctionCall {
    FunctionCall {
        function: FunctionId(id),
        caller: CallerId(1),
        args,
        expected_shape: None,
    }
}

fn value(result: CallResult) -> Option<DbValue> {
    match result {
        CallResult::Value(v) => v,
        other => panic!("expected a plain value, got {other:?}"),
    }
}

/// Test: arithmetic over scalar arguments
#[test]
fn test_scalar_arithmetic_call() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(+ (arg 0) (* 2 (arg 1)))",
        vec![builtin::INT, builtin::INT],
        builtin::INT,
    ));
    let out = d
        .call(&call(1, vec![Some(DbValue::Int(1)), Some(DbValue::Int(3))]))
        .unwrap();
    assert_eq!(value(out), Some(DbValue::Int(7)));
}

/// Test: a function that reads its answer from a query
#[test]
fn test_call_that_queries_the_database() {
    let (db, d) = harness(Settings::default());
    {
        let mut db = db.borrow_mut();
        db.install_query("select n", |_| {
            let shape = RowShape::of(&[("n", builtin::INT)]);
            Ok(Executed::select(vec![Row::from_parts(
                shape,
                vec![Some(DbValue::Int(41))],
            )
            .unwrap()]))
        });
        db.define_function(def(
            1,
            "(+ 1 (get (get (get (exec \"select n\") \"rows\") 0) \"n\"))",
            vec![],
            builtin::INT,
        ));
    }
    let out = d.call(&call(1, vec![])).unwrap();
    assert_eq!(value(out), Some(DbValue::Int(42)));
}

/// Test: composite argument arrives as a mapping
#[test]
fn test_composite_argument() {
    let db = Rc::new(std::cell::RefCell::new(db_model::testing::TestDatabase::new()));
    let mut registry = db_model::types::TypeRegistry::with_builtins();
    let shape = RowShape::of(&[("x", builtin::INT), ("y", builtin::INT)]);
    let point = registry.register_composite("point", shape.clone());
    let dispatcher = call_dispatch::CallDispatcher::new(
        db.clone(),
        Rc::new(registry),
        Settings::default(),
    )
    .unwrap();

    db.borrow_mut().define_function(def(
        1,
        "(+ (get (arg 0) \"x\") (get (arg 0) \"y\"))",
        vec![point],
        builtin::INT,
    ));
    let row = Row::from_parts(shape, vec![Some(DbValue::Int(3)), Some(DbValue::Int(4))]).unwrap();
    let out = dispatcher
        .call(&call(1, vec![Some(DbValue::Composite(row))]))
        .unwrap();
    assert_eq!(value(out), Some(DbValue::Int(7)));
}

/// Test: record-returning function builds a row from the caller's shape
#[test]
fn test_record_result_uses_expected_shape() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(map \"a\" 1 \"b\" \"hi\")",
        vec![],
        builtin::RECORD,
    ));
    let mut c = call(1, vec![]);
    c.expected_shape = Some(RowShape::of(&[("a", builtin::INT), ("b", builtin::TEXT)]));
    match value(d.call(&c).unwrap()) {
        Some(DbValue::Composite(row)) => {
            assert_eq!(row.get(0), Some(&DbValue::Int(1)));
            assert_eq!(row.get(1), Some(&DbValue::Text("hi".into())));
        }
        other => panic!("expected composite, got {other:?}"),
    }
}

/// Test: record result without a shape is an error
#[test]
fn test_record_result_without_shape_fails() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut()
        .define_function(def(1, "(map \"a\" 1)", vec![], builtin::RECORD));
    assert!(d.call(&call(1, vec![])).is_err());
}

/// Test: arrays cross the boundary in both directions
#[test]
fn test_array_both_directions() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(
        1,
        "(seq (get (arg 0) 1) (get (arg 0) 0))",
        vec![builtin::INT_ARRAY],
        builtin::INT_ARRAY,
    ));
    let input = array_1d(builtin::INT, vec![Some(DbValue::Int(1)), Some(DbValue::Int(2))]);
    let out = value(d.call(&call(1, vec![Some(input)])).unwrap());
    match out {
        Some(DbValue::Array(arr)) => {
            assert_eq!(arr.dims, vec![2]);
            assert_eq!(arr.elements[0], Some(DbValue::Int(2)));
            assert_eq!(arr.elements[1], Some(DbValue::Int(1)));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

/// Test: set-returning function emitting rows built from query results
#[test]
fn test_set_returning_emit_from_query() {
    let (db, d) = harness(Settings::default());
    {
        let mut db = db.borrow_mut();
        db.install_query("select all n", |_| {
            let shape = RowShape::of(&[("n", builtin::INT)]);
            let row = |n| Row::from_parts(shape.clone(), vec![Some(DbValue::Int(n))]).unwrap();
            Ok(Executed::select(vec![row(1), row(2), row(3)]))
        });
        let mut f = def(
            1,
            "(let c (query \"select all n\") \
               (let go (fetch c) \
                 (do (if go (do (emit go) (emit (fetch c)) (emit (fetch c)))) null)))",
            vec![],
            builtin::RECORD,
        );
        f.returns_set = true;
        db.define_function(f);
    }
    let mut c = call(1, vec![]);
    c.expected_shape = Some(RowShape::of(&[("n", builtin::INT)]));
    match d.call(&c).unwrap() {
        CallResult::Rows(rows, _) => {
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[2].get(0), Some(&DbValue::Int(3)));
        }
        other => panic!("expected rows, got {other:?}"),
    }
}

/// Test: void-returning function discards its result
#[test]
fn test_void_result() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut()
        .define_function(def(1, "(+ 1 1)", vec![], builtin::VOID));
    assert!(matches!(
        d.call(&call(1, vec![])).unwrap(),
        CallResult::Value(None)
    ));
}
