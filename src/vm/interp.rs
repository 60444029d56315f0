//! Tree-walking execution engine.
//!
//! Scope model matches the normalized source: one global table plus one
//! flat local table per call frame (`var` is function-scoped, blocks do
//! not scope). The wall-clock budget is checked per statement and per
//! loop iteration.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::vm::EvalError;
use crate::vm::ast::*;
use crate::vm::value::Value;

const MAX_CALL_DEPTH: usize = 128;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: BTreeMap<String, Value>,
    scopes: Vec<HashMap<String, Value>>,
    deadline: Instant,
    budget: Duration,
    depth: usize,
    line: usize,
}

impl Interpreter {
    pub fn new(budget: Duration) -> Self {
        Self {
            globals: BTreeMap::new(),
            scopes: Vec::new(),
            deadline: Instant::now() + budget,
            budget,
            depth: 0,
            line: 0,
        }
    }

    pub fn globals_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.globals
    }

    pub fn into_globals(self) -> BTreeMap<String, Value> {
        self.globals
    }

    pub fn run(&mut self, program: &[Stmt]) -> Result<(), EvalError> {
        for stmt in program {
            if !matches!(self.exec_stmt(stmt)?, Flow::Normal) {
                break;
            }
        }
        Ok(())
    }

    fn check_budget(&self) -> Result<(), EvalError> {
        if Instant::now() >= self.deadline {
            Err(EvalError::Timeout {
                budget: self.budget,
            })
        } else {
            Ok(())
        }
    }

    fn type_err(&self, message: String) -> EvalError {
        EvalError::Type {
            line: self.line,
            message,
        }
    }

    // ── statements ─────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, EvalError> {
        self.check_budget()?;
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Var(decls) => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    self.declare(name, value);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Func(func) => {
                self.declare(&func.name, Value::Function(func.clone()));
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(cond)?.truthy() {
                    self.exec_block(then_body)
                } else if let Some(body) = else_body {
                    self.exec_block(body)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                loop {
                    self.check_budget()?;
                    if !self.eval(cond)?.truthy() {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(stmt) = init {
                    self.exec_stmt(stmt)?;
                }
                loop {
                    self.check_budget()?;
                    if let Some(c) = cond {
                        if !self.eval(c)?.truthy() {
                            break;
                        }
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(u) = update {
                        self.eval(u)?;
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::ForIn { var, object, body } => {
                let keys = match self.eval(object)? {
                    Value::Object(map) => map.borrow().keys().cloned().collect::<Vec<_>>(),
                    Value::Array(items) => {
                        (0..items.borrow().len()).map(|i| i.to_string()).collect()
                    }
                    other => {
                        return Err(self.type_err(format!(
                            "cannot enumerate a {}",
                            other.type_name()
                        )));
                    }
                };
                for key in keys {
                    self.check_budget()?;
                    self.declare(var, Value::Str(key));
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Block(stmts) => self.exec_block(stmts),
        }
    }

    // ── scope ──────────────────────────────────────────────────────

    fn declare(&mut self, name: &str, value: Value) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn lookup(&self, name: &str, line: usize) -> Result<Value, EvalError> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Ok(v.clone());
            }
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined {
                name: name.to_string(),
                line,
            })
    }

    /// Write through the nearest existing binding; an unknown name
    /// becomes a new global, as the source language would make it.
    fn assign_name(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), value);
                return;
            }
        }
        self.globals.insert(name.to_string(), value);
    }

    // ── expressions ────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name, line) => self.lookup(name, *line),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::array(out))
            }
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::object(map))
            }
            Expr::Function(func) => Ok(Value::Function(func.clone())),
            Expr::Member(object, name, line) => {
                let obj = self.eval(object)?;
                self.line = *line;
                self.get_member(&obj, name)
            }
            Expr::Index(object, index, line) => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                self.line = *line;
                self.get_index(&obj, &idx)
            }
            Expr::Call { callee, args, line } => {
                let mut argv = Vec::with_capacity(args.len());
                match &**callee {
                    // method call: evaluate the receiver once
                    Expr::Member(object, name, _) => {
                        let obj = self.eval(object)?;
                        for arg in args {
                            argv.push(self.eval(arg)?);
                        }
                        self.line = *line;
                        self.call_member(&obj, name, argv)
                    }
                    _ => {
                        let callee = self.eval(callee)?;
                        for arg in args {
                            argv.push(self.eval(arg)?);
                        }
                        self.line = *line;
                        self.call_value(&callee, argv)
                    }
                }
            }
            Expr::Unary(op, inner) => {
                let v = self.eval(inner)?;
                Ok(match op {
                    UnOp::Neg => Value::Num(-v.as_num()),
                    UnOp::Not => Value::Bool(!v.truthy()),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                Ok(apply_binop(*op, &l, &r))
            }
            Expr::Logical(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                match (op, l.truthy()) {
                    (LogOp::And, false) | (LogOp::Or, true) => Ok(l),
                    _ => self.eval(rhs),
                }
            }
            Expr::Cond(cond, then, other) => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(other)
                }
            }
            Expr::Assign {
                target,
                op,
                value,
                line,
            } => {
                let mut rhs = self.eval(value)?;
                if *op != AssignOp::Set {
                    let current = self.eval(target)?;
                    let bin = match op {
                        AssignOp::Add => BinOp::Add,
                        AssignOp::Sub => BinOp::Sub,
                        AssignOp::Mul => BinOp::Mul,
                        AssignOp::Div => BinOp::Div,
                        AssignOp::Set => unreachable!(),
                    };
                    rhs = apply_binop(bin, &current, &rhs);
                }
                self.line = *line;
                self.store(target, rhs.clone())?;
                Ok(rhs)
            }
            Expr::Postfix(op, target, line) => {
                let old = self.eval(target)?.as_num();
                let new = match op {
                    PostOp::Inc => old + 1.0,
                    PostOp::Dec => old - 1.0,
                };
                self.line = *line;
                self.store(target, Value::Num(new))?;
                Ok(Value::Num(old))
            }
        }
    }

    fn store(&mut self, target: &Expr, value: Value) -> Result<(), EvalError> {
        match target {
            Expr::Ident(name, _) => {
                self.assign_name(name, value);
                Ok(())
            }
            Expr::Member(object, name, _) => {
                let obj = self.eval(object)?;
                self.set_key(&obj, name.clone(), value)
            }
            Expr::Index(object, index, _) => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                match &obj {
                    Value::Array(items) => {
                        let n = idx.as_num();
                        if n.fract() == 0.0 && n >= 0.0 {
                            let i = n as usize;
                            let mut items = items.borrow_mut();
                            if i >= items.len() {
                                items.resize(i + 1, Value::Undefined);
                            }
                            items[i] = value;
                            Ok(())
                        } else {
                            Err(self.type_err(format!(
                                "bad array index `{}`",
                                idx.to_display_string()
                            )))
                        }
                    }
                    _ => self.set_key(&obj, idx.to_display_string(), value),
                }
            }
            _ => Err(self.type_err("invalid assignment target".into())),
        }
    }

    fn set_key(&self, obj: &Value, key: String, value: Value) -> Result<(), EvalError> {
        match obj {
            Value::Object(map) => {
                map.borrow_mut().insert(key, value);
                Ok(())
            }
            other => Err(self.type_err(format!(
                "cannot set property `{key}` on a {}",
                other.type_name()
            ))),
        }
    }

    fn get_member(&self, obj: &Value, name: &str) -> Result<Value, EvalError> {
        match obj {
            Value::Object(map) => Ok(map.borrow().get(name).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) => match name {
                "length" => Ok(Value::Num(items.borrow().len() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Str(s) => match name {
                "length" => Ok(Value::Num(s.chars().count() as f64)),
                _ => Ok(Value::Undefined),
            },
            Value::Undefined | Value::Null => Err(self.type_err(format!(
                "cannot read property `{name}` of {}",
                obj.type_name()
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    fn get_index(&self, obj: &Value, idx: &Value) -> Result<Value, EvalError> {
        match obj {
            Value::Array(items) => {
                let n = idx.as_num();
                if n.fract() == 0.0 && n >= 0.0 {
                    Ok(items
                        .borrow()
                        .get(n as usize)
                        .cloned()
                        .unwrap_or(Value::Undefined))
                } else {
                    Ok(Value::Undefined)
                }
            }
            Value::Object(map) => Ok(map
                .borrow()
                .get(&idx.to_display_string())
                .cloned()
                .unwrap_or(Value::Undefined)),
            Value::Str(s) => {
                let n = idx.as_num();
                if n.fract() == 0.0 && n >= 0.0 {
                    Ok(s.chars()
                        .nth(n as usize)
                        .map(|c| Value::Str(c.to_string()))
                        .unwrap_or(Value::Undefined))
                } else {
                    Ok(Value::Undefined)
                }
            }
            Value::Undefined | Value::Null => {
                Err(self.type_err(format!("cannot index {}", obj.type_name())))
            }
            _ => Ok(Value::Undefined),
        }
    }

    // ── calls ──────────────────────────────────────────────────────

    pub(crate) fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        self.check_budget()?;
        match callee {
            Value::Native { f, .. } => f(&args).map_err(|e| self.pin_line(e)),
            Value::Function(func) => {
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(self.type_err(format!(
                        "call depth exceeded in `{}`",
                        func.name
                    )));
                }
                let mut frame = HashMap::new();
                for (i, param) in func.params.iter().enumerate() {
                    frame.insert(
                        param.clone(),
                        args.get(i).cloned().unwrap_or(Value::Undefined),
                    );
                }
                self.scopes.push(frame);
                self.depth += 1;
                let flow = self.exec_block(&func.body);
                self.depth -= 1;
                self.scopes.pop();
                match flow? {
                    Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
            other => Err(self.type_err(format!("a {} is not callable", other.type_name()))),
        }
    }

    fn call_member(&mut self, obj: &Value, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        // a callable own property wins over built-in methods
        if let Some(prop) = obj.get_property(name) {
            if prop.is_callable() {
                return self.call_value(&prop, args);
            }
        }
        match (obj, name) {
            (Value::Array(items), "push") => {
                items.borrow_mut().extend(args);
                Ok(Value::Num(items.borrow().len() as f64))
            }
            (Value::Array(items), "concat") => {
                let mut out = items.borrow().clone();
                for arg in args {
                    match arg {
                        Value::Array(more) => out.extend(more.borrow().iter().cloned()),
                        other => out.push(other),
                    }
                }
                Ok(Value::array(out))
            }
            (Value::Array(items), "join") => {
                let sep = args
                    .first()
                    .map(Value::to_display_string)
                    .unwrap_or_else(|| ",".into());
                Ok(Value::Str(
                    items
                        .borrow()
                        .iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(&sep),
                ))
            }
            (Value::Array(items), "indexOf") => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                let pos = items.borrow().iter().position(|v| *v == needle);
                Ok(Value::Num(pos.map(|i| i as f64).unwrap_or(-1.0)))
            }
            (Value::Str(s), "toUpperCase") => Ok(Value::Str(s.to_uppercase())),
            (Value::Str(s), "toLowerCase") => Ok(Value::Str(s.to_lowercase())),
            (Value::Str(s), "split") => {
                let sep = args.first().map(Value::to_display_string).unwrap_or_default();
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::Str(c.to_string())).collect()
                } else {
                    s.split(&sep).map(|p| Value::Str(p.to_string())).collect()
                };
                Ok(Value::array(parts))
            }
            _ => Err(self.type_err(format!(
                "`{name}` is not a function on a {}",
                obj.type_name()
            ))),
        }
    }

    /// Native stubs raise type errors with no position; pin them to the
    /// statement being executed.
    fn pin_line(&self, err: EvalError) -> EvalError {
        match err {
            EvalError::Type { line: 0, message } => EvalError::Type {
                line: self.line,
                message,
            },
            other => other,
        }
    }
}

fn apply_binop(op: BinOp, l: &Value, r: &Value) -> Value {
    match op {
        BinOp::Add => match (l, r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Value::Str(l.to_display_string() + &r.to_display_string())
            }
            _ => Value::Num(l.as_num() + r.as_num()),
        },
        BinOp::Sub => Value::Num(l.as_num() - r.as_num()),
        BinOp::Mul => Value::Num(l.as_num() * r.as_num()),
        BinOp::Div => Value::Num(l.as_num() / r.as_num()),
        BinOp::Rem => Value::Num(l.as_num() % r.as_num()),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ok = match (l, r) {
                (Value::Str(a), Value::Str(b)) => match op {
                    BinOp::Lt => a < b,
                    BinOp::Gt => a > b,
                    BinOp::Le => a <= b,
                    _ => a >= b,
                },
                _ => {
                    let (a, b) = (l.as_num(), r.as_num());
                    match op {
                        BinOp::Lt => a < b,
                        BinOp::Gt => a > b,
                        BinOp::Le => a <= b,
                        _ => a >= b,
                    }
                }
            };
            Value::Bool(ok)
        }
        BinOp::Eq => Value::Bool(loose_eq(l, r)),
        BinOp::NotEq => Value::Bool(!loose_eq(l, r)),
        BinOp::StrictEq => Value::Bool(strict_eq(l, r)),
        BinOp::StrictNotEq => Value::Bool(!strict_eq(l, r)),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
        (Value::Num(_), Value::Str(_)) | (Value::Str(_), Value::Num(_)) => l.as_num() == r.as_num(),
        (Value::Bool(_), Value::Num(_)) | (Value::Num(_), Value::Bool(_)) => {
            l.as_num() == r.as_num()
        }
        _ => strict_eq(l, r),
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    std::mem::discriminant(l) == std::mem::discriminant(r) && l == r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{DEFAULT_BUDGET, evaluate};
    use crate::vm::value::Value;

    fn global(src: &str, name: &str) -> Value {
        let bindings = evaluate(src, DEFAULT_BUDGET).unwrap();
        bindings.get(name).cloned().unwrap()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(global("var x = 2 + 3 * 4;", "x"), Value::Num(14.0));
        assert_eq!(global("var x = (2 + 3) * 4;", "x"), Value::Num(20.0));
        assert_eq!(global("var x = 10 % 4 - 1;", "x"), Value::Num(1.0));
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            global("var x = 'lvl ' + 3;", "x"),
            Value::Str("lvl 3".into())
        );
    }

    #[test]
    fn test_registry_builder() {
        let src = "\
var ITEMS = {};
var ItemType = { ORE: 'ore', BAR: 'bar' };
function defineItem(id, p) { ITEMS[id] = Object.assign({ id: id }, p); }
defineItem('ore1', { type: ItemType.ORE });
";
        let items = global(src, "ITEMS");
        let ore = items.get_property("ore1").unwrap();
        assert_eq!(ore.get_property("id"), Some(Value::Str("ore1".into())));
        assert_eq!(ore.get_property("type"), Some(Value::Str("ore".into())));
    }

    #[test]
    fn test_for_loop_builds_table() {
        let src = "\
var T = [];
for (var i = 1; i <= 3; i++) {
  T.push({ n: i, sq: i * i });
}
";
        let t = global(src, "T");
        match t {
            Value::Array(items) => {
                let items = items.borrow();
                assert_eq!(items.len(), 3);
                assert_eq!(items[2].get_property("sq"), Some(Value::Num(9.0)));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_for_in_is_sorted() {
        let src = "\
var SRC = { b: 2, a: 1, c: 3 };
var ORDER = [];
for (var k in SRC) { ORDER.push(k); }
var JOINED = ORDER.join('-');
";
        assert_eq!(global(src, "JOINED"), Value::Str("a-b-c".into()));
    }

    #[test]
    fn test_functions_and_conditionals() {
        let src = "\
function clampName(s) { return s.length > 3 ? s.toUpperCase() : s; }
var A = clampName('ok');
var B = clampName('longer');
";
        assert_eq!(global(src, "A"), Value::Str("ok".into()));
        assert_eq!(global(src, "B"), Value::Str("LONGER".into()));
    }

    #[test]
    fn test_compound_assignment_and_postfix() {
        let src = "var x = 1; x += 4; x *= 2; var y = x++; var z = x;";
        assert_eq!(global(src, "y"), Value::Num(10.0));
        assert_eq!(global(src, "z"), Value::Num(11.0));
    }

    #[test]
    fn test_locals_do_not_leak() {
        let src = "function f() { var hidden = 1; return hidden; } var x = f();";
        let bindings = evaluate(src, DEFAULT_BUDGET).unwrap();
        assert_eq!(bindings.get("x"), Some(&Value::Num(1.0)));
        assert!(bindings.get("hidden").is_none());
    }

    #[test]
    fn test_member_of_undefined_is_an_error() {
        let err = evaluate("var a = {}; var b = a.missing.deep;", DEFAULT_BUDGET).unwrap_err();
        assert!(matches!(err, EvalError::Type { line: 1, .. }));
    }

    #[test]
    fn test_runaway_recursion_is_cut_off() {
        let err = evaluate("function f() { return f(); } f();", DEFAULT_BUDGET).unwrap_err();
        match err {
            EvalError::Type { message, .. } => assert!(message.contains("call depth")),
            other => panic!("expected type error, got {other:?}"),
        }
    }

    #[test]
    fn test_array_helpers() {
        let src = "\
var a = [1, 2].concat([3], 4);
var i = a.indexOf(3);
var n = a.length;
";
        assert_eq!(global(src, "i"), Value::Num(2.0));
        assert_eq!(global(src, "n"), Value::Num(4.0));
    }
}
