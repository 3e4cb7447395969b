//! The reference evaluator.
//!
//! A small tree-walking interpreter over the s-expression AST. It exists
//! so the engine boundary (compile, invoke, restriction, host callbacks)
//! is exercisable end-to-end; it is not an optimizing runtime.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::engine::{Engine, Program};
use crate::error::ScriptError;
use crate::host::HostApi;
use crate::value::Dynamic;

const FORMS: &[&str] = &[
    "do", "if", "let", "seq", "map", "get", "put", "len", "concat", "+", "-", "*", "eq", "not",
    "error", "catch", "arg", "argc", "td", "set-td", "emit", "exec", "query", "fetch", "close",
    "prepare", "exec-prepared", "query-prepared", "free-prepared", "eval", "load", "at-exit",
];

/// Strict-mode compile check: every form head must be a known symbol.
pub(crate) fn check_forms(expr: &Expr) -> Result<(), ScriptError> {
    if let Expr::List(items) = expr {
        match items.first() {
            Some(Expr::Sym(head)) if FORMS.contains(&head.as_str()) => {}
            Some(Expr::Sym(head)) => {
                return Err(ScriptError::Compile(format!("unknown form: {head}")))
            }
            Some(_) => return Err(ScriptError::Compile("form head must be a symbol".into())),
            None => return Err(ScriptError::Compile("empty form".into())),
        }
        for item in &items[1..] {
            check_forms(item)?;
        }
    }
    Ok(())
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// One invocation's evaluation state.
pub(crate) struct EvalCtx<'a> {
    engine: &'a Engine,
    host: &'a dyn HostApi,
    args: &'a [Dynamic],
    binding: Option<&'a RefCell<Dynamic>>,
    depth: Cell<usize>,
    scope: RefCell<Vec<(String, Dynamic)>>,
}

fn format_num(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        ryu::Buffer::new().format(n).to_string()
    }
}

fn number(value: &Dynamic) -> Result<f64, ScriptError> {
    value
        .as_scalar()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| ScriptError::Runtime(format!("expected a number, got {value:?}")))
}

fn scalar_text(value: &Dynamic) -> Result<String, ScriptError> {
    match value {
        Dynamic::Null => Ok(String::new()),
        Dynamic::Scalar(s) => Ok(s.clone()),
        other => Err(ScriptError::Runtime(format!(
            "expected a scalar, got {other:?}"
        ))),
    }
}

fn arity_error(form: &str) -> ScriptError {
    ScriptError::Runtime(format!("{form}: wrong number of arguments"))
}

impl<'a> EvalCtx<'a> {
    pub(crate) fn new(
        engine: &'a Engine,
        host: &'a dyn HostApi,
        args: &'a [Dynamic],
        binding: Option<&'a RefCell<Dynamic>>,
    ) -> Self {
        Self {
            engine,
            host,
            args,
            binding,
            depth: Cell::new(0),
            scope: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn run(&self, program: &Program) -> Result<Dynamic, ScriptError> {
        let mut last = Dynamic::Null;
        for expr in &program.body {
            last = self.eval(expr)?;
        }
        Ok(last)
    }

    fn eval_body(&self, body: &[Expr]) -> Result<Dynamic, ScriptError> {
        let mut last = Dynamic::Null;
        for expr in body {
            last = self.eval(expr)?;
        }
        Ok(last)
    }

    fn eval(&self, expr: &Expr) -> Result<Dynamic, ScriptError> {
        if self.depth.get() >= self.engine.max_depth {
            return Err(ScriptError::DepthExceeded(self.engine.max_depth));
        }
        self.depth.set(self.depth.get() + 1);
        let _guard = DepthGuard(&self.depth);
        match expr {
            Expr::Num(text) => Ok(Dynamic::Scalar(text.clone())),
            Expr::Str(text) => Ok(Dynamic::Scalar(text.clone())),
            Expr::Sym(name) => self.symbol(name),
            Expr::List(items) => {
                let head = match items.first() {
                    Some(Expr::Sym(head)) => head.as_str(),
                    Some(_) => {
                        return Err(ScriptError::Runtime("form head must be a symbol".into()))
                    }
                    None => return Err(ScriptError::Runtime("empty form".into())),
                };
                self.form(head, &items[1..])
            }
        }
    }

    fn symbol(&self, name: &str) -> Result<Dynamic, ScriptError> {
        match name {
            "null" => Ok(Dynamic::Null),
            "true" => Ok(Dynamic::scalar("1")),
            "false" => Ok(Dynamic::scalar("0")),
            _ => self
                .scope
                .borrow()
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ScriptError::Runtime(format!("unbound symbol: {name}"))),
        }
    }

    fn form(&self, head: &str, rest: &[Expr]) -> Result<Dynamic, ScriptError> {
        match head {
            "do" => self.eval_body(rest),
            "if" => {
                if rest.len() != 2 && rest.len() != 3 {
                    return Err(arity_error("if"));
                }
                if self.eval(&rest[0])?.truthy() {
                    self.eval(&rest[1])
                } else if let Some(alt) = rest.get(2) {
                    self.eval(alt)
                } else {
                    Ok(Dynamic::Null)
                }
            }
            "let" => {
                if rest.len() < 2 {
                    return Err(arity_error("let"));
                }
                let name = match &rest[0] {
                    Expr::Sym(name) => name.clone(),
                    _ => return Err(ScriptError::Runtime("let: binding must be a symbol".into())),
                };
                let value = self.eval(&rest[1])?;
                self.scope.borrow_mut().push((name, value));
                let result = self.eval_body(&rest[2..]);
                self.scope.borrow_mut().pop();
                result
            }
            "seq" => {
                let mut items = Vec::with_capacity(rest.len());
                for expr in rest {
                    items.push(self.eval(expr)?);
                }
                Ok(Dynamic::Sequence(items))
            }
            "map" => {
                if rest.len() % 2 != 0 {
                    return Err(arity_error("map"));
                }
                let mut map = IndexMap::new();
                for pair in rest.chunks(2) {
                    let key = scalar_text(&self.eval(&pair[0])?)?;
                    map.insert(key, self.eval(&pair[1])?);
                }
                Ok(Dynamic::Mapping(map))
            }
            "get" => {
                if rest.len() != 2 {
                    return Err(arity_error("get"));
                }
                let coll = self.eval(&rest[0])?;
                let key = self.eval(&rest[1])?;
                match &coll {
                    Dynamic::Null => Ok(Dynamic::Null),
                    Dynamic::Mapping(map) => Ok(map
                        .get(scalar_text(&key)?.as_str())
                        .cloned()
                        .unwrap_or(Dynamic::Null)),
                    Dynamic::Sequence(_) | Dynamic::TaggedArray { .. } => {
                        let index = self.index(&key)?;
                        Ok(coll
                            .array_like()
                            .and_then(|items| items.get(index))
                            .cloned()
                            .unwrap_or(Dynamic::Null))
                    }
                    other => Err(ScriptError::Runtime(format!(
                        "get: cannot index into {other:?}"
                    ))),
                }
            }
            "put" => {
                if rest.len() != 3 {
                    return Err(arity_error("put"));
                }
                let coll = self.eval(&rest[0])?;
                let key = self.eval(&rest[1])?;
                let value = self.eval(&rest[2])?;
                match coll {
                    Dynamic::Mapping(mut map) => {
                        map.insert(scalar_text(&key)?, value);
                        Ok(Dynamic::Mapping(map))
                    }
                    Dynamic::Sequence(items) => {
                        Ok(Dynamic::Sequence(self.put_indexed(items, &key, value)?))
                    }
                    Dynamic::TaggedArray { tag, elements } => Ok(Dynamic::TaggedArray {
                        tag,
                        elements: self.put_indexed(elements, &key, value)?,
                    }),
                    other => Err(ScriptError::Runtime(format!(
                        "put: cannot write into {other:?}"
                    ))),
                }
            }
            "len" => {
                if rest.len() != 1 {
                    return Err(arity_error("len"));
                }
                let value = self.eval(&rest[0])?;
                let len = match &value {
                    Dynamic::Null => 0,
                    Dynamic::Scalar(s) => s.chars().count(),
                    Dynamic::Mapping(map) => map.len(),
                    Dynamic::Sequence(items) => items.len(),
                    Dynamic::TaggedArray { elements, .. } => elements.len(),
                };
                Ok(Dynamic::scalar(len.to_string()))
            }
            "concat" => {
                let mut out = String::new();
                for expr in rest {
                    out.push_str(&scalar_text(&self.eval(expr)?)?);
                }
                Ok(Dynamic::Scalar(out))
            }
            "+" | "*" => {
                let mut acc = if head == "+" { 0.0 } else { 1.0 };
                for expr in rest {
                    let n = number(&self.eval(expr)?)?;
                    acc = if head == "+" { acc + n } else { acc * n };
                }
                Ok(Dynamic::Scalar(format_num(acc)))
            }
            "-" => {
                if rest.is_empty() {
                    return Err(arity_error("-"));
                }
                let first = number(&self.eval(&rest[0])?)?;
                if rest.len() == 1 {
                    return Ok(Dynamic::Scalar(format_num(-first)));
                }
                let mut acc = first;
                for expr in &rest[1..] {
                    acc -= number(&self.eval(expr)?)?;
                }
                Ok(Dynamic::Scalar(format_num(acc)))
            }
            "eq" => {
                if rest.len() != 2 {
                    return Err(arity_error("eq"));
                }
                let a = self.eval(&rest[0])?;
                let b = self.eval(&rest[1])?;
                let equal = match (&a, &b) {
                    (Dynamic::Null, Dynamic::Null) => true,
                    (Dynamic::Scalar(x), Dynamic::Scalar(y)) => x == y,
                    _ => false,
                };
                Ok(Dynamic::scalar(if equal { "1" } else { "0" }))
            }
            "not" => {
                if rest.len() != 1 {
                    return Err(arity_error("not"));
                }
                let value = self.eval(&rest[0])?;
                Ok(Dynamic::scalar(if value.truthy() { "0" } else { "1" }))
            }
            "error" => {
                if rest.len() != 1 {
                    return Err(arity_error("error"));
                }
                Err(ScriptError::Runtime(scalar_text(&self.eval(&rest[0])?)?))
            }
            "catch" => {
                if rest.len() != 1 {
                    return Err(arity_error("catch"));
                }
                let mut map = IndexMap::new();
                match self.eval(&rest[0]) {
                    Ok(value) => map.insert("ok".to_string(), value),
                    Err(e) => map.insert("error".to_string(), Dynamic::scalar(e.to_string())),
                };
                Ok(Dynamic::Mapping(map))
            }
            "arg" => {
                if rest.len() != 1 {
                    return Err(arity_error("arg"));
                }
                let index = self.index(&self.eval(&rest[0])?)?;
                Ok(self.args.get(index).cloned().unwrap_or(Dynamic::Null))
            }
            "argc" => Ok(Dynamic::scalar(self.args.len().to_string())),
            "td" => Ok(self
                .binding
                .map(|cell| cell.borrow().clone())
                .unwrap_or(Dynamic::Null)),
            "set-td" => {
                if rest.len() != 1 {
                    return Err(arity_error("set-td"));
                }
                let value = self.eval(&rest[0])?;
                let cell = self
                    .binding
                    .ok_or_else(|| ScriptError::Runtime("set-td: no trigger data bound".into()))?;
                *cell.borrow_mut() = value;
                Ok(Dynamic::Null)
            }
            "emit" => {
                if rest.len() != 1 {
                    return Err(arity_error("emit"));
                }
                let value = self.eval(&rest[0])?;
                self.host.emit(value)?;
                Ok(Dynamic::Null)
            }
            "exec" => {
                if rest.is_empty() || rest.len() > 2 {
                    return Err(arity_error("exec"));
                }
                let sql = scalar_text(&self.eval(&rest[0])?)?;
                let limit = match rest.get(1) {
                    Some(expr) => number(&self.eval(expr)?)? as u64,
                    None => 0,
                };
                self.host.execute(&sql, limit)
            }
            "query" => {
                if rest.len() != 1 {
                    return Err(arity_error("query"));
                }
                let sql = scalar_text(&self.eval(&rest[0])?)?;
                self.host.open_cursor(&sql)
            }
            "fetch" => {
                if rest.len() != 1 {
                    return Err(arity_error("fetch"));
                }
                let cursor = scalar_text(&self.eval(&rest[0])?)?;
                self.host.fetch(&cursor)
            }
            "close" => {
                if rest.len() != 1 {
                    return Err(arity_error("close"));
                }
                let cursor = scalar_text(&self.eval(&rest[0])?)?;
                self.host.close_cursor(&cursor)?;
                Ok(Dynamic::Null)
            }
            "prepare" => {
                if rest.is_empty() {
                    return Err(arity_error("prepare"));
                }
                let sql = scalar_text(&self.eval(&rest[0])?)?;
                let mut types = Vec::with_capacity(rest.len() - 1);
                for expr in &rest[1..] {
                    types.push(scalar_text(&self.eval(expr)?)?);
                }
                self.host.prepare(&sql, &types)
            }
            "exec-prepared" => {
                if rest.len() < 2 {
                    return Err(arity_error("exec-prepared"));
                }
                let name = scalar_text(&self.eval(&rest[0])?)?;
                let limit = number(&self.eval(&rest[1])?)? as u64;
                let mut args = Vec::with_capacity(rest.len() - 2);
                for expr in &rest[2..] {
                    args.push(self.eval(expr)?);
                }
                self.host.execute_prepared(&name, limit, &args)
            }
            "query-prepared" => {
                if rest.is_empty() {
                    return Err(arity_error("query-prepared"));
                }
                let name = scalar_text(&self.eval(&rest[0])?)?;
                let mut args = Vec::with_capacity(rest.len() - 1);
                for expr in &rest[1..] {
                    args.push(self.eval(expr)?);
                }
                self.host.open_cursor_prepared(&name, &args)
            }
            "free-prepared" => {
                if rest.len() != 1 {
                    return Err(arity_error("free-prepared"));
                }
                let name = scalar_text(&self.eval(&rest[0])?)?;
                self.host.free_prepared(&name)?;
                Ok(Dynamic::Null)
            }
            "eval" => {
                if rest.len() != 1 {
                    return Err(arity_error("eval"));
                }
                if self.engine.is_restricted() {
                    return Err(ScriptError::Trust(
                        "eval is disabled in the restricted engine".into(),
                    ));
                }
                let source = scalar_text(&self.eval(&rest[0])?)?;
                let body = self.engine.parse_checked(&source)?;
                self.eval_body(&body)
            }
            "load" => {
                if rest.len() != 1 {
                    return Err(arity_error("load"));
                }
                let name = scalar_text(&self.eval(&rest[0])?)?;
                self.load(&name)
            }
            "at-exit" => {
                self.engine.add_at_exit(Rc::new(Program {
                    body: rest.to_vec(),
                }));
                Ok(Dynamic::Null)
            }
            other => Err(ScriptError::Runtime(format!("unknown form: {other}"))),
        }
    }

    fn load(&self, name: &str) -> Result<Dynamic, ScriptError> {
        if self.engine.loaded.borrow().contains(name) {
            return Ok(Dynamic::Null);
        }
        let module = self.engine.modules.borrow().get(name).cloned();
        match module {
            Some(program) => {
                // Mark first so a self-referential module cannot loop.
                self.engine.loaded.borrow_mut().insert(name.to_string());
                self.eval_body(&program.body)?;
                Ok(Dynamic::Null)
            }
            None if self.engine.is_restricted() => Err(ScriptError::Trust(format!(
                "module \"{name}\" is not available in the restricted engine"
            ))),
            None => Err(ScriptError::Runtime(format!("module not found: {name}"))),
        }
    }

    fn put_indexed(
        &self,
        mut items: Vec<Dynamic>,
        key: &Dynamic,
        value: Dynamic,
    ) -> Result<Vec<Dynamic>, ScriptError> {
        let index = self.index(key)?;
        if index < items.len() {
            items[index] = value;
        } else if index == items.len() {
            items.push(value);
        } else {
            return Err(ScriptError::Runtime(format!(
                "put: index {index} is past the end of a sequence of {}",
                items.len()
            )));
        }
        Ok(items)
    }

    fn index(&self, key: &Dynamic) -> Result<usize, ScriptError> {
        key.as_scalar()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| ScriptError::Runtime(format!("expected an index, got {key:?}")))
    }
}
