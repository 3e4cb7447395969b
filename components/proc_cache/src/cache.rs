//! The compile cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use db_model::catalog::{CallerId, CatalogError, FunctionDef, FunctionId};
use db_model::host::HostDatabase;
use db_model::types::{builtin, TypeClass, TypeRegistry};
use interp_pool::{InterpreterPool, PoolError};
use marshal::{ArgConverter, ConvError, Marshal, ResultConverter};

use crate::descriptor::{ProcDescriptor, ProcKey};

/// Cache and compilation failures.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The catalog had no such function.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The body failed to compile.
    #[error("compilation of function \"{name}\" failed: {message}")]
    Compilation {
        /// Function name.
        name: String,
        /// Compiler diagnostic.
        message: String,
    },
    /// A declared argument type cannot cross the language boundary.
    #[error("procedures cannot accept type {0}")]
    BadArgType(String),
    /// The declared return type cannot cross the language boundary.
    #[error("procedures cannot return type {0}")]
    BadReturnType(String),
    /// A trigger-returning function was invoked as a plain call.
    #[error("trigger functions can only be called as triggers")]
    TriggerOnly,
    /// Context selection or engine creation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Converter resolution failed.
    #[error(transparent)]
    Conversion(#[from] ConvError),
}

/// Check that a definition's argument and return types can cross the
/// language boundary. Trigger compilations skip the return-type check;
/// the trigger protocol owns the result there.
pub fn validate_signature(
    registry: &TypeRegistry,
    def: &FunctionDef,
    is_trigger: bool,
) -> Result<(), CacheError> {
    if !is_trigger {
        let meta = registry.lookup(def.return_type).map_err(ConvError::from)?;
        if meta.class == TypeClass::Pseudo
            && def.return_type != builtin::VOID
            && def.return_type != builtin::RECORD
        {
            if def.return_type == builtin::TRIGGER {
                return Err(CacheError::TriggerOnly);
            }
            return Err(CacheError::BadReturnType(meta.name.clone()));
        }
    }
    for arg_type in &def.arg_types {
        let meta = registry.lookup(*arg_type).map_err(ConvError::from)?;
        if meta.class == TypeClass::Pseudo && *arg_type != builtin::RECORD {
            return Err(CacheError::BadArgType(meta.name.clone()));
        }
    }
    Ok(())
}

/// Cache of compiled procedures, keyed by function, call kind, and trust
/// namespace.
///
/// Entries are validated against the catalog's freshness stamp on every
/// hit; a stale entry is unlinked (and freed once no call still holds it)
/// and the function is recompiled.
pub struct ProcedureCache {
    pool: Rc<InterpreterPool>,
    marshal: Rc<Marshal>,
    procs: RefCell<HashMap<ProcKey, Rc<ProcDescriptor>>>,
}

impl ProcedureCache {
    /// Create an empty cache over a pool and converter.
    pub fn new(pool: Rc<InterpreterPool>, marshal: Rc<Marshal>) -> Self {
        Self {
            pool,
            marshal,
            procs: RefCell::new(HashMap::new()),
        }
    }

    /// The pool this cache compiles into.
    pub fn pool(&self) -> &Rc<InterpreterPool> {
        &self.pool
    }

    /// Number of live cache entries.
    pub fn len(&self) -> usize {
        self.procs.borrow().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.procs.borrow().is_empty()
    }

    /// Resolve a function to a compiled descriptor, compiling on miss or
    /// staleness. The returned descriptor carries one reference owed back
    /// through [`ProcedureCache::release`].
    pub fn resolve(
        &self,
        host: &dyn HostDatabase,
        function: FunctionId,
        is_trigger: bool,
        caller: CallerId,
    ) -> Result<Rc<ProcDescriptor>, CacheError> {
        let def = host.function(function)?;

        // Until the definition is read we cannot know which trust
        // namespace a cached compilation went into, so both the caller's
        // key and the shared key are candidates.
        let candidates = [
            ProcKey {
                function,
                is_trigger,
                caller,
            },
            ProcKey {
                function,
                is_trigger,
                caller: CallerId::SHARED,
            },
        ];
        for key in candidates {
            if let Some(hit) = self.lookup_fresh(key, &def) {
                hit.addref();
                return Ok(hit);
            }
        }

        let desc = self.compile(&def, function, is_trigger, caller)?;
        desc.addref(); // the cache's own reference
        desc.addref(); // the caller's reference
        let key = ProcKey {
            function,
            is_trigger,
            caller: if def.trusted {
                caller
            } else {
                CallerId::SHARED
            },
        };
        self.procs.borrow_mut().insert(key, desc.clone());
        Ok(desc)
    }

    fn lookup_fresh(&self, key: ProcKey, def: &FunctionDef) -> Option<Rc<ProcDescriptor>> {
        let hit = self.procs.borrow().get(&key).cloned()?;
        if hit.stamp == def.stamp && hit.trusted == def.trusted {
            return Some(hit);
        }
        debug!(function = key.function.0, "cached procedure is stale, unlinking");
        self.procs.borrow_mut().remove(&key);
        hit.decref();
        None
    }

    fn compile(
        &self,
        def: &FunctionDef,
        function: FunctionId,
        is_trigger: bool,
        caller: CallerId,
    ) -> Result<Rc<ProcDescriptor>, CacheError> {
        let registry = self.marshal.registry();
        validate_signature(registry, def, is_trigger)?;

        let result = ResultConverter::new(registry, def.return_type)?;
        let args = def
            .arg_types
            .iter()
            .map(|ty| ArgConverter::new(registry, *ty))
            .collect::<Result<Vec<_>, _>>()?;

        // Compiling may switch the active context; put it back afterwards
        // so an in-progress outer call is not left pointing elsewhere.
        let previous = self.pool.active_key();
        let context = self.pool.select(def.trusted, caller)?;
        let unit_name = format!("{}__{}", def.name, function.0);
        let compiled = context.engine().compile(&unit_name, &def.source);
        self.pool.activate_key(previous);
        let callable = compiled.map_err(|e| CacheError::Compilation {
            name: def.name.clone(),
            message: e.to_string(),
        })?;
        debug!(function = function.0, unit = %unit_name, "compiled procedure");

        Ok(Rc::new(ProcDescriptor::new(
            def.name.clone(),
            function,
            def.stamp,
            context,
            def.trusted,
            def.read_only(),
            def.returns_set,
            def.return_type,
            result,
            args,
            callable,
        )))
    }

    /// Return a reference taken by [`ProcedureCache::resolve`]. The
    /// compiled unit is freed when the last reference goes.
    pub fn release(&self, desc: &Rc<ProcDescriptor>) {
        if desc.decref() == 0 {
            debug!(function = desc.function.0, "freed compiled procedure");
        }
    }
}
