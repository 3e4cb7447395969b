//! Engine lifecycle: construction, compilation, invocation, the one-way
//! capability restriction, and teardown.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ast::{self, Expr};
use crate::error::ScriptError;
use crate::eval::{self, EvalCtx};
use crate::host::{DeniedHost, HostApi};
use crate::value::Dynamic;

/// Construction-time options for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Reject unknown forms at compile time instead of at evaluation.
    pub strict: bool,
    /// Maximum expression nesting depth during evaluation.
    pub max_depth: usize,
    /// Source run once at engine creation, with host access denied.
    pub on_init: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: 128,
            on_init: None,
        }
    }
}

/// A compiled source text.
#[derive(Debug)]
pub struct Program {
    pub(crate) body: Vec<Expr>,
}

/// A named, compiled procedure body ready to invoke.
#[derive(Debug, Clone)]
pub struct Callable {
    /// Diagnostic name of the compiled unit.
    pub name: String,
    pub(crate) program: Rc<Program>,
}

/// One script engine instance.
///
/// The restriction flag is one-way: once [`Engine::restrict`] is called the
/// engine permanently refuses `eval` and loads of unregistered modules.
#[derive(Debug)]
pub struct Engine {
    strict: bool,
    pub(crate) max_depth: usize,
    restricted: Cell<bool>,
    pub(crate) modules: RefCell<HashMap<String, Rc<Program>>>,
    pub(crate) loaded: RefCell<HashSet<String>>,
    at_exit: RefCell<Vec<Rc<Program>>>,
}

impl Engine {
    /// Create an engine and run its init source, if any, with host access
    /// denied.
    pub fn new(options: &EngineOptions) -> Result<Self, ScriptError> {
        let engine = Self {
            strict: options.strict,
            max_depth: options.max_depth,
            restricted: Cell::new(false),
            modules: RefCell::new(HashMap::new()),
            loaded: RefCell::new(HashSet::new()),
            at_exit: RefCell::new(Vec::new()),
        };
        if let Some(source) = &options.on_init {
            engine.run_source(source, &DeniedHost)?;
        }
        Ok(engine)
    }

    pub(crate) fn parse_checked(&self, source: &str) -> Result<Vec<Expr>, ScriptError> {
        let body = ast::parse(source)?;
        if self.strict {
            for expr in &body {
                eval::check_forms(expr)?;
            }
        }
        Ok(body)
    }

    /// Compile a source text into an invocable unit.
    pub fn compile(&self, name: &str, source: &str) -> Result<Callable, ScriptError> {
        let body = self.parse_checked(source)?;
        debug!(unit = name, "compiled script unit");
        Ok(Callable {
            name: name.to_string(),
            program: Rc::new(Program { body }),
        })
    }

    /// Invoke a compiled unit with positional arguments, an optional
    /// mutable binding (trigger data), and a host surface.
    pub fn invoke(
        &self,
        callable: &Callable,
        args: &[Dynamic],
        binding: Option<&RefCell<Dynamic>>,
        host: &dyn HostApi,
    ) -> Result<Dynamic, ScriptError> {
        EvalCtx::new(self, host, args, binding).run(&callable.program)
    }

    /// Compile and run a one-off source text with no arguments.
    pub fn run_source(&self, source: &str, host: &dyn HostApi) -> Result<Dynamic, ScriptError> {
        let unit = self.compile("inline", source)?;
        self.invoke(&unit, &[], None, host)
    }

    /// Register a module so `load` can find it. Registration is only
    /// possible through configuration that runs before [`Engine::restrict`],
    /// which is what makes registered modules safe to load afterwards.
    pub fn register_module(&self, name: &str, source: &str) -> Result<(), ScriptError> {
        let body = self.parse_checked(source)?;
        self.modules
            .borrow_mut()
            .insert(name.to_string(), Rc::new(Program { body }));
        Ok(())
    }

    /// Permanently lock the engine into its restricted mode.
    pub fn restrict(&self) {
        self.restricted.set(true);
    }

    /// Whether the engine has been locked.
    pub fn is_restricted(&self) -> bool {
        self.restricted.get()
    }

    pub(crate) fn add_at_exit(&self, program: Rc<Program>) {
        self.at_exit.borrow_mut().push(program);
    }

    /// Run registered end hooks best-effort, oldest first. Hook failures
    /// are logged and do not stop later hooks.
    pub fn shutdown(&self, host: &dyn HostApi) {
        let hooks: Vec<Rc<Program>> = self.at_exit.borrow_mut().drain(..).collect();
        for hook in hooks {
            if let Err(e) = EvalCtx::new(self, host, &[], None).run(&hook) {
                warn!(error = %e, "end hook failed during engine shutdown");
            }
        }
    }
}
