//! Cache Invalidation Integration Tests
//!
//! Verifies that redefining a function takes effect on the next call and
//! that compiled units outlive the cache entry while still referenced.

use std::rc::Rc;

use call_dispatch::{CallResult, FunctionCall};
use db_model::catalog::{CallerId, FunctionDef, FunctionId, SourceStamp, Volatility};
use db_model::types::builtin;
use db_model::value::DbValue;
use integration_tests::harness;
use interp_pool::{InterpreterPool, Settings};
use marshal::Marshal;
use proc_cache::ProcedureCache;

fn def(id: u32, source: &str, trusted: bool) -> FunctionDef {
    FunctionDef {
        id: FunctionId(id),
        name: format!("f{id}"),
        source: source.into(),
        arg_types: vec![],
        return_type: builtin::INT,
        returns_set: false,
        volatility: Volatility::Volatile,
        trusted,
        stamp: SourceStamp(1),
    }
}

fn call(id: u32) -> FunctionCall {
    FunctionCall {
        function: FunctionId(id),
        caller: CallerId(1),
        args: vec![],
        expected_shape: None,
    }
}

fn int_result(result: CallResult) -> i64 {
    match result {
        CallResult::Value(Some(DbValue::Int(n))) => n,
        other => panic!("expected integer result, got {other:?}"),
    }
}

/// Test: redefinition is picked up by the next call
#[test]
fn test_redefinition_takes_effect() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "(+ 1 1)", true));
    assert_eq!(int_result(d.call(&call(1)).unwrap()), 2);

    db.borrow_mut().redefine(FunctionId(1), "(+ 2 2)");
    assert_eq!(int_result(d.call(&call(1)).unwrap()), 4);
}

/// Test: same stamp means no recompilation (same descriptor is reused)
#[test]
fn test_unchanged_function_reuses_descriptor() {
    let mut db = db_model::testing::TestDatabase::new();
    db.define_function(def(1, "(+ 1 1)", true));
    let pool = Rc::new(InterpreterPool::new(Settings::default()).unwrap());
    let marshal = Rc::new(Marshal::new(
        Rc::new(db_model::types::TypeRegistry::with_builtins()),
        16,
    ));
    let cache = ProcedureCache::new(pool, marshal);

    let a = cache.resolve(&db, FunctionId(1), false, CallerId(1)).unwrap();
    let b = cache.resolve(&db, FunctionId(1), false, CallerId(1)).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    cache.release(&a);
    cache.release(&b);
    assert_eq!(a.refcount(), 1);
}

/// Test: a stale descriptor stays usable for its holder until released
#[test]
fn test_stale_descriptor_survives_until_released() {
    let mut db = db_model::testing::TestDatabase::new();
    db.define_function(def(1, "(+ 1 1)", true));
    let pool = Rc::new(InterpreterPool::new(Settings::default()).unwrap());
    let marshal = Rc::new(Marshal::new(
        Rc::new(db_model::types::TypeRegistry::with_builtins()),
        16,
    ));
    let cache = ProcedureCache::new(pool, marshal);

    let old = cache.resolve(&db, FunctionId(1), false, CallerId(1)).unwrap();
    db.redefine(FunctionId(1), "(+ 2 2)");
    let new = cache.resolve(&db, FunctionId(1), false, CallerId(1)).unwrap();
    assert!(!Rc::ptr_eq(&old, &new));

    // The in-flight holder can still run the old unit.
    assert!(old.callable().is_some());
    cache.release(&old);
    assert!(old.callable().is_none());
    assert!(new.callable().is_some());
}

/// Test: flipping the trust level on redefinition moves the compilation
/// to the other namespace
#[test]
fn test_trust_flip_recompiles_in_new_context() {
    let (db, d) = harness(Settings::default());
    db.borrow_mut().define_function(def(1, "(+ 1 1)", false));
    assert_eq!(int_result(d.call(&call(1)).unwrap()), 2);

    // Replace with a trusted definition under a bumped stamp.
    let mut trusted = def(1, "(+ 3 3)", true);
    trusted.stamp = SourceStamp(2);
    db.borrow_mut().define_function(trusted);
    assert_eq!(int_result(d.call(&call(1)).unwrap()), 6);

    // The trusted compilation lives in a restricted engine.
    let context = d.pool().context(CallerId(1)).unwrap();
    assert!(context.engine().is_restricted());
}
