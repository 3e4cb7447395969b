//! The call dispatcher.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::warn;

use db_model::catalog::{CallerId, FunctionId};
use db_model::host::HostDatabase;
use db_model::row::{Row, RowShape};
use db_model::types::{builtin, TypeClass, TypeRegistry};
use db_model::value::DbValue;
use exec_bridge::ExecutionBridge;
use interp_pool::{InterpreterPool, Settings};
use marshal::{ConvError, Marshal};
use proc_cache::{validate_signature, ProcDescriptor, ProcedureCache};
use script_engine::{Dynamic, HostApi, ScriptError};

use crate::error::DispatchError;
use crate::trigger::{TriggerCall, TriggerOp, TriggerOutcome};

/// A plain (non-trigger) call request.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    /// The function to call.
    pub function: FunctionId,
    /// The calling identity, for trust segregation.
    pub caller: CallerId,
    /// Argument values; `None` entries are nulls.
    pub args: Vec<Option<DbValue>>,
    /// The row shape the calling context can consume, when it can accept
    /// rows. Required for set-returning functions and for `record`-typed
    /// results.
    pub expected_shape: Option<Rc<RowShape>>,
}

/// A completed plain call.
#[derive(Debug, Clone)]
pub enum CallResult {
    /// A single (possibly null) value.
    Value(Option<DbValue>),
    /// A set of rows in the calling context's shape.
    Rows(Vec<Row>, Rc<RowShape>),
}

struct CallFrame {
    desc: Rc<ProcDescriptor>,
    expected_shape: Option<Rc<RowShape>>,
    rows: Vec<Row>,
}

/// Entry point for every way procedure code gets run: plain calls,
/// trigger firings, anonymous blocks, and validation.
///
/// The dispatcher keeps one call frame for the innermost call in flight,
/// and saves and restores both the frame and the pool's active context
/// around each call, so nested calls (a procedure whose query fires a
/// trigger, say) unwind correctly.
pub struct CallDispatcher {
    host: Rc<RefCell<dyn HostDatabase>>,
    marshal: Rc<Marshal>,
    pool: Rc<InterpreterPool>,
    cache: ProcedureCache,
    bridge: ExecutionBridge,
    frame: RefCell<Option<CallFrame>>,
    check_function_bodies: Cell<bool>,
}

struct DispatchHost<'a> {
    dispatcher: &'a CallDispatcher,
    read_only: bool,
}

impl HostApi for DispatchHost<'_> {
    fn execute(&self, sql: &str, limit: u64) -> Result<Dynamic, ScriptError> {
        self.dispatcher.bridge.execute(sql, self.read_only, limit)
    }

    fn open_cursor(&self, sql: &str) -> Result<Dynamic, ScriptError> {
        self.dispatcher.bridge.open_cursor(sql, self.read_only)
    }

    fn fetch(&self, cursor: &str) -> Result<Dynamic, ScriptError> {
        self.dispatcher.bridge.fetch(cursor)
    }

    fn close_cursor(&self, cursor: &str) -> Result<(), ScriptError> {
        self.dispatcher.bridge.close_cursor(cursor)
    }

    fn prepare(&self, sql: &str, param_types: &[String]) -> Result<Dynamic, ScriptError> {
        self.dispatcher.bridge.prepare(sql, param_types)
    }

    fn execute_prepared(
        &self,
        name: &str,
        limit: u64,
        args: &[Dynamic],
    ) -> Result<Dynamic, ScriptError> {
        self.dispatcher
            .bridge
            .execute_prepared(name, limit, args, self.read_only)
    }

    fn open_cursor_prepared(&self, name: &str, args: &[Dynamic]) -> Result<Dynamic, ScriptError> {
        self.dispatcher
            .bridge
            .open_cursor_prepared(name, args, self.read_only)
    }

    fn free_prepared(&self, name: &str) -> Result<(), ScriptError> {
        self.dispatcher.bridge.free_prepared(name)
    }

    fn emit(&self, value: Dynamic) -> Result<(), ScriptError> {
        self.dispatcher.emit_row(value)
    }
}

impl CallDispatcher {
    /// Wire a dispatcher over a host database, a type registry, and the
    /// pool configuration.
    pub fn new(
        host: Rc<RefCell<dyn HostDatabase>>,
        registry: Rc<TypeRegistry>,
        settings: Settings,
    ) -> Result<Self, DispatchError> {
        let marshal = Rc::new(Marshal::new(registry, settings.max_conversion_depth));
        let pool = Rc::new(InterpreterPool::new(settings)?);
        let cache = ProcedureCache::new(pool.clone(), marshal.clone());
        let bridge = ExecutionBridge::new(host.clone(), marshal.clone(), pool.clone());
        Ok(Self {
            host,
            marshal,
            pool,
            cache,
            bridge,
            frame: RefCell::new(None),
            check_function_bodies: Cell::new(true),
        })
    }

    /// The dispatcher's context pool.
    pub fn pool(&self) -> &Rc<InterpreterPool> {
        &self.pool
    }

    /// The dispatcher's value converter.
    pub fn marshal(&self) -> &Rc<Marshal> {
        &self.marshal
    }

    /// Toggle body compilation during [`CallDispatcher::validate`].
    pub fn set_check_function_bodies(&self, check: bool) {
        self.check_function_bodies.set(check);
    }

    /// Finalize the session: run end hooks and disable bridge operations.
    pub fn teardown(&self) {
        self.pool.teardown();
    }

    /// Dispatch a plain call.
    pub fn call(&self, call: &FunctionCall) -> Result<CallResult, DispatchError> {
        let desc = {
            let host = self.host.borrow();
            self.cache.resolve(&*host, call.function, false, call.caller)?
        };
        let result = self.run_plain(&desc, call);
        self.cache.release(&desc);
        result
    }

    fn run_plain(
        &self,
        desc: &Rc<ProcDescriptor>,
        call: &FunctionCall,
    ) -> Result<CallResult, DispatchError> {
        let expected_shape = match (&call.expected_shape, desc.returns_set) {
            (None, true) => return Err(DispatchError::SetContext),
            (shape, _) => shape.clone(),
        };
        if call.args.len() != desc.args.len() {
            return Err(DispatchError::ArgumentCount {
                name: desc.name.clone(),
                want: desc.args.len(),
                got: call.args.len(),
            });
        }
        let mut args = Vec::with_capacity(call.args.len());
        for (converter, value) in desc.args.iter().zip(&call.args) {
            args.push(
                converter
                    .input(&self.marshal, value.as_ref())
                    .map_err(|e| DispatchError::Convert {
                        name: desc.name.clone(),
                        source: e,
                    })?,
            );
        }

        let (value, emitted) = self.invoke(desc, &args, None, expected_shape.clone())?;

        if desc.returns_set {
            let shape = match expected_shape {
                Some(shape) => shape,
                None => return Err(DispatchError::SetContext),
            };
            return self.collect_set(desc, value, emitted, shape);
        }

        let converted = desc
            .result
            .output(&self.marshal, &value, expected_shape.as_ref())
            .map_err(|e| DispatchError::Convert {
                name: desc.name.clone(),
                source: e,
            })?;
        Ok(CallResult::Value(converted))
    }

    // Run the compiled unit with frame and activation saved around it.
    fn invoke(
        &self,
        desc: &Rc<ProcDescriptor>,
        args: &[Dynamic],
        binding: Option<&RefCell<Dynamic>>,
        expected_shape: Option<Rc<RowShape>>,
    ) -> Result<(Dynamic, Vec<Row>), DispatchError> {
        let callable = desc.callable().ok_or_else(|| DispatchError::Exec {
            name: desc.name.clone(),
            source: ScriptError::Runtime("compiled unit is no longer available".into()),
        })?;

        let prev_active = self.pool.active_key();
        self.pool.activate_key(Some(desc.context.key()));
        let prev_frame = self.frame.replace(Some(CallFrame {
            desc: desc.clone(),
            expected_shape,
            rows: Vec::new(),
        }));

        let host_api = DispatchHost {
            dispatcher: self,
            read_only: desc.read_only,
        };
        let outcome = desc
            .context
            .engine()
            .invoke(&callable, args, binding, &host_api);

        let finished = self.frame.replace(prev_frame);
        self.pool.activate_key(prev_active);

        let value = outcome.map_err(|e| DispatchError::Exec {
            name: desc.name.clone(),
            source: e,
        })?;
        Ok((value, finished.map(|f| f.rows).unwrap_or_default()))
    }

    fn collect_set(
        &self,
        desc: &Rc<ProcDescriptor>,
        value: Dynamic,
        emitted: Vec<Row>,
        shape: Rc<RowShape>,
    ) -> Result<CallResult, DispatchError> {
        if !emitted.is_empty() {
            if !matches!(value, Dynamic::Null) {
                return Err(DispatchError::MixedReturn(desc.name.clone()));
            }
            return Ok(CallResult::Rows(emitted, shape));
        }
        if matches!(value, Dynamic::Null) {
            return Ok(CallResult::Rows(Vec::new(), shape));
        }
        match value.array_like() {
            Some(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    rows.push(self.result_row(desc, item, &shape).map_err(|e| {
                        DispatchError::Convert {
                            name: desc.name.clone(),
                            source: e,
                        }
                    })?);
                }
                Ok(CallResult::Rows(rows, shape))
            }
            None => Err(DispatchError::BadSetReturn(desc.name.clone())),
        }
    }

    // One set element (or emitted value) into a row of the result shape.
    fn result_row(
        &self,
        desc: &Rc<ProcDescriptor>,
        value: &Dynamic,
        shape: &Rc<RowShape>,
    ) -> Result<Row, ConvError> {
        let meta = self.marshal.registry().lookup(desc.return_type)?;
        if desc.return_type == builtin::RECORD || meta.class == TypeClass::Composite {
            let map = value
                .as_mapping()
                .ok_or_else(|| ConvError::NotComposite("a set element".into()))?;
            return self.marshal.mapping_to_row(map, shape);
        }
        if shape.len() != 1 {
            return Err(ConvError::Unsupported(
                "scalar set element for a multi-column result".into(),
            ));
        }
        let converted = self.marshal.to_database(value, desc.return_type, None)?;
        Row::from_parts(shape.clone(), vec![converted])
            .map_err(|e| ConvError::Unsupported(e.to_string()))
    }

    fn emit_row(&self, value: Dynamic) -> Result<(), ScriptError> {
        let mut borrow = self.frame.borrow_mut();
        let frame = borrow
            .as_mut()
            .ok_or_else(|| ScriptError::Usage("emit used outside of a function call".into()))?;
        if !frame.desc.returns_set {
            return Err(ScriptError::Usage(
                "cannot emit rows from a function not returning a set".into(),
            ));
        }
        let shape = frame.expected_shape.clone().ok_or_else(|| {
            ScriptError::Usage("emit used in a context that cannot accept rows".into())
        })?;
        let desc = frame.desc.clone();
        let row = self
            .result_row(&desc, &value, &shape)
            .map_err(|e| ScriptError::Host(e.to_string()))?;
        frame.rows.push(row);
        Ok(())
    }

    /// Dispatch a trigger firing.
    pub fn trigger(&self, call: &TriggerCall) -> Result<TriggerOutcome, DispatchError> {
        let desc = {
            let host = self.host.borrow();
            self.cache.resolve(&*host, call.function, true, call.caller)?
        };
        let result = self.run_trigger(&desc, call);
        self.cache.release(&desc);
        result
    }

    fn event_mapping(&self, call: &TriggerCall) -> Result<Dynamic, ConvError> {
        let mut map = IndexMap::new();
        map.insert(
            "name".to_string(),
            Dynamic::scalar(call.trigger_name.as_str()),
        );
        map.insert("event".to_string(), Dynamic::scalar(call.op.tag()));
        map.insert("when".to_string(), Dynamic::scalar(call.timing.tag()));
        map.insert("level".to_string(), Dynamic::scalar(call.level.tag()));
        map.insert(
            "relid".to_string(),
            Dynamic::scalar(call.relation_id.to_string()),
        );
        map.insert(
            "relname".to_string(),
            Dynamic::scalar(call.relation_name.as_str()),
        );
        map.insert(
            "table_name".to_string(),
            Dynamic::scalar(call.relation_name.as_str()),
        );
        map.insert(
            "table_schema".to_string(),
            Dynamic::scalar(call.schema_name.as_str()),
        );
        map.insert(
            "argc".to_string(),
            Dynamic::scalar(call.args.len().to_string()),
        );
        map.insert(
            "args".to_string(),
            Dynamic::Sequence(call.args.iter().map(|a| Dynamic::scalar(a.as_str())).collect()),
        );
        if let Some(old) = &call.old_row {
            map.insert("old".to_string(), self.marshal.row_to_mapping(old)?);
        }
        if let Some(new) = &call.new_row {
            map.insert("new".to_string(), self.marshal.row_to_mapping(new)?);
        }
        Ok(Dynamic::Mapping(map))
    }

    fn run_trigger(
        &self,
        desc: &Rc<ProcDescriptor>,
        call: &TriggerCall,
    ) -> Result<TriggerOutcome, DispatchError> {
        let event = self
            .event_mapping(call)
            .map_err(|e| DispatchError::Convert {
                name: desc.name.clone(),
                source: e,
            })?;
        let binding = RefCell::new(event);
        let args: Vec<Dynamic> = call
            .args
            .iter()
            .map(|a| Dynamic::scalar(a.as_str()))
            .collect();

        let (value, _) = self.invoke(desc, &args, Some(&binding), None)?;

        match &value {
            Dynamic::Null => Ok(TriggerOutcome::Proceed(call.pass_through())),
            Dynamic::Scalar(s) if s.eq_ignore_ascii_case("SKIP") => Ok(TriggerOutcome::Skip),
            Dynamic::Scalar(s) if s.eq_ignore_ascii_case("MODIFY") => match call.op {
                TriggerOp::Insert | TriggerOp::Update => self.modified_row(call, &binding),
                TriggerOp::Delete | TriggerOp::Truncate => {
                    warn!(
                        trigger = %call.trigger_name,
                        "ignoring modified row in {} trigger",
                        call.op.tag()
                    );
                    Ok(TriggerOutcome::Proceed(call.pass_through()))
                }
            },
            _ => Err(DispatchError::TriggerProtocol(
                "result of trigger procedure must be null, \"SKIP\", or \"MODIFY\"".into(),
            )),
        }
    }

    fn modified_row(
        &self,
        call: &TriggerCall,
        binding: &RefCell<Dynamic>,
    ) -> Result<TriggerOutcome, DispatchError> {
        let td = binding.borrow();
        let new = td
            .as_mapping()
            .and_then(|map| map.get("new"))
            .ok_or_else(|| {
                DispatchError::TriggerProtocol("modified row is missing from trigger data".into())
            })?;
        let map = new.as_mapping().ok_or_else(|| {
            DispatchError::TriggerProtocol("modified row in trigger data is not a mapping".into())
        })?;
        let row = self
            .marshal
            .mapping_to_row(map, &call.relation_shape)
            .map_err(|e| DispatchError::Convert {
                name: call.trigger_name.clone(),
                source: e,
            })?;
        Ok(TriggerOutcome::Proceed(Some(row)))
    }

    /// Run an anonymous code block under the requested trust level. The
    /// block is compiled fresh, never cached, and returns no value.
    pub fn run_inline(
        &self,
        source: &str,
        trusted: bool,
        caller: CallerId,
    ) -> Result<(), DispatchError> {
        const NAME: &str = "anonymous code block";
        let prev_active = self.pool.active_key();
        let context = self.pool.select(trusted, caller)?;
        let compiled = context.engine().compile("__inline_block", source);
        let callable = match compiled {
            Ok(callable) => callable,
            Err(e) => {
                self.pool.activate_key(prev_active);
                return Err(DispatchError::Exec {
                    name: NAME.into(),
                    source: e,
                });
            }
        };
        let host_api = DispatchHost {
            dispatcher: self,
            read_only: false,
        };
        let prev_frame = self.frame.replace(None);
        let outcome = context.engine().invoke(&callable, &[], None, &host_api);
        *self.frame.borrow_mut() = prev_frame;
        self.pool.activate_key(prev_active);
        outcome
            .map(|_| ())
            .map_err(|e| DispatchError::Exec {
                name: NAME.into(),
                source: e,
            })
    }

    /// Validate a function without calling it: pseudo-type acceptance
    /// checks always run; the body is compiled only while body checking
    /// is enabled.
    pub fn validate(&self, function: FunctionId, caller: CallerId) -> Result<(), DispatchError> {
        let def = self.host.borrow().function(function)?;
        let is_trigger = def.return_type == builtin::TRIGGER;
        validate_signature(self.marshal.registry(), &def, is_trigger)?;
        if self.check_function_bodies.get() {
            let desc = {
                let host = self.host.borrow();
                self.cache.resolve(&*host, function, is_trigger, caller)?
            };
            self.cache.release(&desc);
        }
        Ok(())
    }
}
