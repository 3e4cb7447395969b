//! Compiled-procedure descriptors.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use db_model::catalog::{CallerId, FunctionId, SourceStamp};
use db_model::types::TypeId;
use interp_pool::InterpreterContext;
use marshal::{ArgConverter, ResultConverter};
use script_engine::Callable;

/// Cache key for a compiled procedure.
///
/// The same catalog function compiles separately for plain calls and for
/// trigger calls, and trusted compilations are segregated per caller.
/// Untrusted compilations live under [`CallerId::SHARED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcKey {
    /// The catalog function.
    pub function: FunctionId,
    /// Whether this is the trigger-call compilation.
    pub is_trigger: bool,
    /// The trust namespace the compilation lives in.
    pub caller: CallerId,
}

/// One compiled procedure, shared between the cache and in-flight calls.
///
/// Lifetime is manually counted: the cache's own reference counts as one,
/// and every in-flight call holds one more. When the count reaches zero the
/// compiled unit is dropped; the descriptor shell itself lives as long as
/// any `Rc` does.
pub struct ProcDescriptor {
    /// Function name, for diagnostics.
    pub name: String,
    /// The catalog function this was compiled from.
    pub function: FunctionId,
    /// Definition freshness at compile time.
    pub stamp: SourceStamp,
    /// The context the unit was compiled in.
    pub context: Rc<InterpreterContext>,
    /// Whether the function's language variant is trusted.
    pub trusted: bool,
    /// Whether queries issued during calls run read-only.
    pub read_only: bool,
    /// Whether the function returns a set of rows.
    pub returns_set: bool,
    /// Declared return type.
    pub return_type: TypeId,
    /// Result conversion, resolved once.
    pub result: ResultConverter,
    /// Per-argument conversion, resolved once.
    pub args: Vec<ArgConverter>,
    refcount: Cell<u32>,
    callable: RefCell<Option<Callable>>,
}

impl ProcDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        function: FunctionId,
        stamp: SourceStamp,
        context: Rc<InterpreterContext>,
        trusted: bool,
        read_only: bool,
        returns_set: bool,
        return_type: TypeId,
        result: ResultConverter,
        args: Vec<ArgConverter>,
        callable: Callable,
    ) -> Self {
        Self {
            name,
            function,
            stamp,
            context,
            trusted,
            read_only,
            returns_set,
            return_type,
            result,
            args,
            refcount: Cell::new(0),
            callable: RefCell::new(Some(callable)),
        }
    }

    /// The compiled unit, if it has not been freed yet.
    pub fn callable(&self) -> Option<Callable> {
        self.callable.borrow().clone()
    }

    /// Current reference count.
    pub fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    pub(crate) fn addref(&self) {
        self.refcount.set(self.refcount.get() + 1);
    }

    /// Drop one reference; frees the compiled unit at zero. Returns the
    /// remaining count.
    pub(crate) fn decref(&self) -> u32 {
        let remaining = self.refcount.get().saturating_sub(1);
        self.refcount.set(remaining);
        if remaining == 0 {
            self.callable.borrow_mut().take();
        }
        remaining
    }
}
