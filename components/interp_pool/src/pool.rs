//! Context pool: creation, adoption of the held engine, trust locking,
//! activation affinity, and session teardown.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use db_model::catalog::CallerId;
use db_model::host::PlanId;
use db_model::types::TypeId;
use script_engine::{DeniedHost, Engine, EngineOptions, ScriptError};

use crate::settings::Settings;

/// Pool-level failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    /// A second engine was needed on a platform that only supports one.
    #[error("cannot allocate multiple script engines on this platform")]
    ResourceExhausted,
    /// Engine creation or init code failed.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// A prepared-query descriptor owned by one interpreter context.
///
/// Prepared queries never cross contexts; the handle name a script gets
/// back is only meaningful in the context that prepared it.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    /// Host-side plan handle.
    pub plan: PlanId,
    /// Declared parameter types, in order.
    pub param_types: Vec<TypeId>,
}

/// One interpreter context: an engine plus its private prepared-query
/// table, keyed by trust identity.
#[derive(Debug)]
pub struct InterpreterContext {
    key: CallerId,
    trusted: bool,
    engine: Engine,
    queries: RefCell<HashMap<String, PreparedQuery>>,
}

impl InterpreterContext {
    /// The context's pool key.
    pub fn key(&self) -> CallerId {
        self.key
    }

    /// Whether this context is locked into trusted mode.
    pub fn trusted(&self) -> bool {
        self.trusted
    }

    /// The context's engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Store a prepared-query descriptor under its handle name.
    pub fn insert_query(&self, name: &str, query: PreparedQuery) {
        self.queries.borrow_mut().insert(name.to_string(), query);
    }

    /// Look up a prepared-query descriptor.
    pub fn query(&self, name: &str) -> Option<PreparedQuery> {
        self.queries.borrow().get(name).cloned()
    }

    /// Remove and return a prepared-query descriptor.
    pub fn remove_query(&self, name: &str) -> Option<PreparedQuery> {
        self.queries.borrow_mut().remove(name)
    }

    /// Drain every prepared-query descriptor, for teardown.
    pub fn drain_queries(&self) -> Vec<PreparedQuery> {
        self.queries.borrow_mut().drain().map(|(_, q)| q).collect()
    }
}

/// The session's pool of interpreter contexts.
///
/// One engine (the held engine) is created eagerly at pool creation, before
/// any trust decision is possible, and is adopted by the first context
/// selected. Trusted contexts are segregated per caller; all untrusted
/// execution shares one context under [`CallerId::SHARED`].
pub struct InterpreterPool {
    settings: Settings,
    contexts: RefCell<HashMap<CallerId, Rc<InterpreterContext>>>,
    held: RefCell<Option<Engine>>,
    active: Cell<Option<CallerId>>,
    ending: Cell<bool>,
}

impl InterpreterPool {
    /// Create the pool and its held engine.
    pub fn new(settings: Settings) -> Result<Self, PoolError> {
        let held = Engine::new(&Self::engine_options(&settings))?;
        debug!("created held script engine");
        Ok(Self {
            settings,
            contexts: RefCell::new(HashMap::new()),
            held: RefCell::new(Some(held)),
            active: Cell::new(None),
            ending: Cell::new(false),
        })
    }

    fn engine_options(settings: &Settings) -> EngineOptions {
        EngineOptions {
            strict: settings.use_strict,
            max_depth: settings.max_eval_depth,
            on_init: settings.on_init.clone(),
        }
    }

    /// The pool's configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Select (creating if needed) the context for a trust level and
    /// caller, and make it the active one.
    pub fn select(
        &self,
        trusted: bool,
        caller: CallerId,
    ) -> Result<Rc<InterpreterContext>, PoolError> {
        let key = if trusted { caller } else { CallerId::SHARED };
        if let Some(context) = self.contexts.borrow().get(&key) {
            self.active.set(Some(key));
            return Ok(context.clone());
        }

        let engine = match self.held.borrow_mut().take() {
            Some(engine) => engine,
            None if self.settings.allow_multiple_engines => {
                Engine::new(&Self::engine_options(&self.settings))?
            }
            None => return Err(PoolError::ResourceExhausted),
        };

        if trusted {
            for (name, source) in &self.settings.trusted_modules {
                engine.register_module(name, source)?;
            }
            engine.restrict();
            if let Some(source) = &self.settings.on_trusted_init {
                engine.run_source(source, &DeniedHost)?;
            }
        } else if let Some(source) = &self.settings.on_untrusted_init {
            engine.run_source(source, &DeniedHost)?;
        }

        let context = Rc::new(InterpreterContext {
            key,
            trusted,
            engine,
            queries: RefCell::new(HashMap::new()),
        });
        self.contexts.borrow_mut().insert(key, context.clone());
        self.active.set(Some(key));
        debug!(caller = key.0, trusted, "initialized interpreter context");
        Ok(context)
    }

    /// Restore activation to a previously saved key. `None` leaves the
    /// current activation untouched.
    pub fn activate_key(&self, key: Option<CallerId>) {
        if let Some(key) = key {
            self.active.set(Some(key));
        }
    }

    /// The key of the active context, if any.
    pub fn active_key(&self) -> Option<CallerId> {
        self.active.get()
    }

    /// The active context, if any.
    pub fn current(&self) -> Option<Rc<InterpreterContext>> {
        self.active
            .get()
            .and_then(|key| self.contexts.borrow().get(&key).cloned())
    }

    /// Look up a context by key without activating it.
    pub fn context(&self, key: CallerId) -> Option<Rc<InterpreterContext>> {
        self.contexts.borrow().get(&key).cloned()
    }

    /// Whether the session is past the point where bridge operations are
    /// allowed.
    pub fn is_ending(&self) -> bool {
        self.ending.get()
    }

    /// Finalize the session: flip the ending flag, then run every engine's
    /// end hooks with database access denied.
    pub fn teardown(&self) {
        self.ending.set(true);
        for context in self.contexts.borrow().values() {
            debug!(caller = context.key.0, "shutting down interpreter context");
            context.engine.shutdown(&DeniedHost);
        }
        if let Some(held) = self.held.borrow().as_ref() {
            held.shutdown(&DeniedHost);
        }
    }
}
