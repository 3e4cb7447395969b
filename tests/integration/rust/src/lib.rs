//! Integration test suite for the procedural scripting core
//!
//! This crate wires every component together against the in-memory test
//! database and verifies behavior across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use call_dispatch;
    pub use db_model;
    pub use exec_bridge;
    pub use interp_pool;
    pub use marshal;
    pub use proc_cache;
    pub use script_engine;
}

use std::cell::RefCell;
use std::rc::Rc;

use call_dispatch::CallDispatcher;
use db_model::testing::TestDatabase;
use db_model::types::TypeRegistry;
use interp_pool::Settings;

/// Build a dispatcher over a fresh test database with built-in types.
pub fn harness(settings: Settings) -> (Rc<RefCell<TestDatabase>>, CallDispatcher) {
    let db = Rc::new(RefCell::new(TestDatabase::new()));
    let registry = Rc::new(TypeRegistry::with_builtins());
    let dispatcher = CallDispatcher::new(db.clone(), registry, settings)
        .expect("dispatcher construction failed");
    (db, dispatcher)
}
