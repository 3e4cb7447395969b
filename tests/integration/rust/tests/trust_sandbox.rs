//! Trust Sandbox Integration Tests
//!
//! Verifies the trusted/untrusted split: capability restriction, module
//! loading, per-caller segregation, and prepared-query context affinity.

use call_dispatch::{CallResult, DispatchError, FunctionCall};
use db_model::catalog::{CallerId, FunctionDef, FunctionId, SourceStamp, Volatility};
use db_model::host::Executed;
use db_model::row::{Row, RowShape};
use db_model::types::{builtin, TypeId};
use db_model::value::DbValue;
use integration_tests::harness;
use interp_pool::Settings;
use script_engine::ScriptError;

fn def(
    id: u32,
    source: &str,
    arg_types: Vec<TypeId>,
    return_type: TypeId,
    trusted: bool,
) -> FunctionDef {
    FunctionDef {
        id: FunctionId(id),
        name: format!("f{id}"),
        source: source.into(),
        arg_types,
        return_type,
        returns_set: false,
        volatility: Volatility::Volatile,
        trusted,
        stamp: SourceStamp(1),
    }
}

fn call(id: u32, caller: u32, args: Vec<Option<DbValue>>) -> FunctionCall {
    FunctionCall {
        function: FunctionId(id),
        caller: CallerId(caller),
        args,
        expected_shape: None,
    }
}

fn text(result: CallResult) -> String {
    match result {
        CallResult::Value(Some(DbValue::Text(s))) => s,
        other => panic!("expected text result, got {other:?}"),
    }
}

/// Test: trusted code cannot use eval
#[test]
fn test_trusted_function_cannot_eval() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut()
        .define_function(def(1, "(eval \"(+ 1 1)\")", vec![], builtin::INT, true));
    match d.call(&call(1, 1, vec![])) {
        Err(DispatchError::Exec { source, .. }) => {
            assert!(matches!(source, ScriptError::Trust(_)));
        }
        other => panic!("expected trust violation, got {other:?}"),
    }
}

/// Test: untrusted code can use eval
#[test]
fn test_untrusted_function_can_eval() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut()
        .define_function(def(1, "(eval \"(+ 1 1)\")", vec![], builtin::INT, false));
    let out = d.call(&call(1, 1, vec![])).unwrap();
    assert!(matches!(out, CallResult::Value(Some(DbValue::Int(2)))));
}

/// Test: preloaded modules load in trusted code, others are refused
#[test]
fn test_trusted_module_gate() {
    let settings = Settings {
        trusted_modules: vec![("util".into(), "(do)".into())],
        ..Default::default()
    };
    let (db, d) = harness(settings);
    {
        let mut db = db.borrow_mut();
        db.define_function(def(
            1,
            "(do (load \"util\") 1)",
            vec![],
            builtin::INT,
            true,
        ));
        db.define_function(def(
            2,
            "(do (load \"filesystem\") 1)",
            vec![],
            builtin::INT,
            true,
        ));
    }
    assert!(d.call(&call(1, 1, vec![])).is_ok());
    match d.call(&call(2, 1, vec![])) {
        Err(DispatchError::Exec { source, .. }) => {
            assert!(matches!(source, ScriptError::Trust(_)));
        }
        other => panic!("expected trust violation, got {other:?}"),
    }
}

/// Test: a prepared query belongs to the context that made it
#[test]
fn test_prepared_query_context_affinity() {
    let (db, d) = harness(Settings::default());
    {
        let mut db = db.borrow_mut();
        db.install_query("select $1", |args| {
            let n = match &args[0] {
                Some(DbValue::Int(n)) => *n,
                _ => panic!("expected int argument"),
            };
            let shape = RowShape::of(&[("n", builtin::INT)]);
            Ok(Executed::select(vec![Row::from_parts(
                shape,
                vec![Some(DbValue::Int(n))],
            )
            .unwrap()]))
        });
        db.define_function(def(
            1,
            "(prepare \"select $1\" \"bigint\")",
            vec![],
            builtin::TEXT,
            true,
        ));
        db.define_function(def(
            2,
            "(get (get (get (exec-prepared (arg 0) 0 7) \"rows\") 0) \"n\")",
            vec![builtin::TEXT],
            builtin::INT,
            true,
        ));
    }

    let name = text(d.call(&call(1, 1, vec![])).unwrap());
    // Same caller, same trusted context: the handle resolves.
    let arg = Some(DbValue::Text(name.clone()));
    let out = d.call(&call(2, 1, vec![arg.clone()])).unwrap();
    assert!(matches!(out, CallResult::Value(Some(DbValue::Int(7)))));

    // A different caller gets a different trusted context, where the
    // handle does not exist.
    match d.call(&call(2, 9, vec![arg])) {
        Err(DispatchError::Exec { source, .. }) => {
            assert!(matches!(source, ScriptError::Host(_)));
        }
        other => panic!("expected missing prepared query, got {other:?}"),
    }
}

/// Test: inline blocks honor the requested trust level
#[test]
fn test_inline_block_trust() {
    let (_db, d) = harness(Settings::default());
    assert!(d.run_inline("(+ 1 1)", true, CallerId(1)).is_ok());
    assert!(matches!(
        d.run_inline("(eval \"1\")", true, CallerId(1)),
        Err(DispatchError::Exec { .. })
    ));
    assert!(d.run_inline("(eval \"1\")", false, CallerId(1)).is_ok());
}
