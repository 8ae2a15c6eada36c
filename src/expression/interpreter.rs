//! Tree-walking evaluator with a step budget and a call-depth ceiling.
//!
//! Evaluation is single-threaded and synchronous. Control flow that is not a
//! plain value (exceptions, optional-chain short circuits) travels as an
//! [`Interrupt`] until a `try`, a chain boundary or the public entry point
//! absorbs it.

use std::cell::Cell;
use std::rc::Rc;

use super::ast::*;
use super::builtins::{self, Method};
use super::error::ExprError;
use super::value::{Callable, Env, MAX_VALUE_DEPTH, Object, Scope, Value, lookup, with_binding};

/// Default number of evaluation steps a single compile or script run may take.
pub const DEFAULT_STEP_BUDGET: u64 = 100_000;
/// Maximum nesting of user-function calls.
pub const MAX_CALL_DEPTH: usize = 64;

pub(crate) enum Interrupt {
    Error(ExprError),
    Throw(Value),
    /// Optional chaining hit a nullish value.
    ShortCircuit,
}

impl From<ExprError> for Interrupt {
    fn from(e: ExprError) -> Self {
        Interrupt::Error(e)
    }
}

pub(crate) type Eval<T> = Result<T, Interrupt>;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    budget: u64,
    max_depth: usize,
    steps: Cell<u64>,
    depth: Cell<usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_STEP_BUDGET)
    }

    pub fn with_budget(budget: u64) -> Self {
        Self {
            budget,
            max_depth: MAX_CALL_DEPTH,
            steps: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    pub fn steps_used(&self) -> u64 {
        self.steps.get()
    }

    /// Evaluate a single expression.
    pub fn evaluate(&self, expr: &Expr, env: &Env) -> Result<Value, ExprError> {
        match self.eval(expr, env) {
            Ok(v) => Ok(v),
            Err(Interrupt::ShortCircuit) => Ok(Value::Undefined),
            Err(i) => Err(into_error(i)),
        }
    }

    /// Run a statement list. A top-level `return` yields its value.
    pub fn run(&self, body: &[Stmt], env: &Env) -> Result<Value, ExprError> {
        match self.exec_block_in(body, env) {
            Ok(Flow::Return(v)) => Ok(v),
            Ok(_) => Ok(Value::Undefined),
            Err(i) => Err(into_error(i)),
        }
    }

    /// Invoke a function value with already-evaluated arguments.
    pub fn call_function(&self, f: &Value, args: Vec<Value>) -> Result<Value, ExprError> {
        self.call(f, args).map_err(into_error)
    }

    fn tick(&self) -> Eval<()> {
        let n = self.steps.get() + 1;
        self.steps.set(n);
        if n > self.budget {
            return Err(ExprError::Budget(self.budget).into());
        }
        Ok(())
    }

    pub(crate) fn call(&self, f: &Value, args: Vec<Value>) -> Eval<Value> {
        let Value::Function(callable) = f else {
            return Err(ExprError::type_error(format!("{} is not a function", f.type_of())).into());
        };
        let value = match callable.as_ref() {
            Callable::Intrinsic(i) => builtins::call_intrinsic(self, *i, args)?,
            Callable::Host { func, .. } => func(&args)?,
            Callable::Closure { def, env } => {
                let depth = self.depth.get() + 1;
                if depth > self.max_depth {
                    return Err(ExprError::Depth(self.max_depth).into());
                }
                self.depth.set(depth);
                let result = self.invoke(def, env, args);
                self.depth.set(depth - 1);
                result?
            }
        };
        Ok(value.within_depth()?)
    }

    fn invoke(&self, def: &FunctionDef, closure_env: &Env, args: Vec<Value>) -> Eval<Value> {
        let scope = Scope::child(closure_env);
        let mut args = args.into_iter();
        for param in &def.params {
            let arg = if param.rest {
                Value::Array(args.by_ref().collect()).within_depth()?
            } else {
                args.next().unwrap_or(Value::Undefined)
            };
            let arg = match (&param.default, arg) {
                (Some(default), Value::Undefined) => self.eval(default, &scope)?,
                (_, arg) => arg,
            };
            scope.borrow_mut().declare(param.name.clone(), arg, true);
        }
        match &def.body {
            FnBody::Expr(expr) => self.eval(expr, &scope),
            FnBody::Block(stmts) => match self.exec_block_in(stmts, &scope)? {
                Flow::Return(v) => Ok(v),
                _ => Ok(Value::Undefined),
            },
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn exec_block_in(&self, stmts: &[Stmt], scope: &Env) -> Eval<Flow> {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let f = Value::Function(Rc::new(Callable::Closure {
                        def: def.clone(),
                        env: scope.clone(),
                    }));
                    scope.borrow_mut().declare(name.clone(), f, true);
                }
            }
        }
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, env: &Env) -> Eval<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Decl { kind, decls } => {
                for (name, init) in decls {
                    let value = match init {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::Undefined,
                    };
                    env.borrow_mut()
                        .declare(name.clone(), value, *kind != DeclKind::Const);
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Flow::Normal),
            Stmt::Return(arg) => Ok(Flow::Return(match arg {
                Some(expr) => self.eval(expr, env)?,
                None => Value::Undefined,
            })),
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Block(stmts) => self.exec_block_in(stmts, &Scope::child(env)),
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            } => {
                let items = builtins::iterate(self.eval(iterable, env)?)?;
                for item in items {
                    let scope = Scope::child(env);
                    scope
                        .borrow_mut()
                        .declare(name.clone(), item, *kind != DeclKind::Const);
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.exec(init, &scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::While { test, body } => {
                while self.eval(test, env)?.truthy() {
                    match self.exec(body, env)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(expr) => Err(Interrupt::Throw(self.eval(expr, env)?)),
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_deref(), handler.as_deref(), finalizer.as_deref(), env),
        }
    }

    fn exec_try(
        &self,
        block: &[Stmt],
        param: Option<&str>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        env: &Env,
    ) -> Eval<Flow> {
        let mut outcome = self.exec_block_in(block, &Scope::child(env));
        if let Some(handler) = handler {
            let caught = match &outcome {
                Err(Interrupt::Throw(v)) => Some(v.clone()),
                Err(Interrupt::Error(e)) if e.is_catchable() => Some(error_value(e)),
                _ => None,
            };
            if let Some(caught) = caught {
                let scope = Scope::child(env);
                if let Some(param) = param {
                    scope.borrow_mut().declare(param, caught, true);
                }
                outcome = self.exec_block_in(handler, &scope);
            }
        }
        if let Some(finalizer) = finalizer {
            match self.exec_block_in(finalizer, &Scope::child(env))? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        outcome
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    fn eval(&self, expr: &Expr, env: &Env) -> Eval<Value> {
        self.tick()?;
        match expr {
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        TemplateSegment::Lit(s) => out.push_str(s),
                        TemplateSegment::Expr(e) => out.push_str(&self.eval(e, env)?.to_string()),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Array(items) => Ok(Value::Array(self.eval_items(items, env)?).within_depth()?),
            Expr::Object(props) => Ok(self.eval_object(props, env)?.within_depth()?),
            Expr::Ident(name) => {
                lookup(env, name).ok_or_else(|| ExprError::Reference(name.clone()).into())
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let target = self.eval(object, env)?;
                if *optional && target.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                let key = self.member_key(property, env)?;
                Ok(builtins::get_property(&target, &key)?)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional, env),
            Expr::New { callee, args } => {
                let ctor = lookup(env, callee).ok_or_else(|| ExprError::Reference(callee.clone()))?;
                if !matches!(ctor, Value::Function(_)) {
                    return Err(ExprError::type_error(format!("{callee} is not a constructor")).into());
                }
                let args = self.eval_items(args, env)?;
                self.call(&ctor, args)
            }
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, env),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                Ok(binary_op(*op, &l, &r)?)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left, env)?;
                let take_left = match op {
                    LogicalOp::And => !l.truthy(),
                    LogicalOp::Or => l.truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if take_left { Ok(l) } else { self.eval(right, env) }
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Assign { op, target, value } => {
                let rhs = self.eval(value, env)?;
                let new = match op {
                    AssignOp::Assign => rhs,
                    compound => {
                        let current = self.eval(target, env)?;
                        let bin = match compound {
                            AssignOp::Add => BinaryOp::Add,
                            AssignOp::Sub => BinaryOp::Sub,
                            AssignOp::Mul => BinaryOp::Mul,
                            _ => BinaryOp::Div,
                        };
                        binary_op(bin, &current, &rhs)?
                    }
                };
                self.store(target, new.clone(), env, false)?;
                Ok(new)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target, env)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, Value::Number(new), env, false)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, env)?;
                }
                Ok(last)
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Callable::Closure {
                def: def.clone(),
                env: env.clone(),
            }))),
            Expr::Chain(inner) => match self.eval(inner, env) {
                Err(Interrupt::ShortCircuit) => Ok(Value::Undefined),
                other => other,
            },
        }
    }

    fn member_key(&self, key: &MemberKey, env: &Env) -> Eval<String> {
        Ok(match key {
            MemberKey::Static(name) => name.clone(),
            MemberKey::Computed(expr) => self.eval(expr, env)?.to_string(),
        })
    }

    fn eval_items(&self, items: &[ArrayItem], env: &Env) -> Eval<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => out.push(self.eval(expr, env)?),
                ArrayItem::Spread(expr) => out.extend(builtins::iterate(self.eval(expr, env)?)?),
                ArrayItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    fn eval_object(&self, props: &[Property], env: &Env) -> Eval<Value> {
        let mut map = Object::new();
        for prop in props {
            match prop {
                Property::KeyValue(key, expr) => {
                    let key = match key {
                        PropKey::Static(s) => s.clone(),
                        PropKey::Computed(e) => self.eval(e, env)?.to_string(),
                    };
                    let value = self.eval(expr, env)?;
                    map.insert(key, value);
                }
                Property::Spread(expr) => match self.eval(expr, env)? {
                    Value::Object(other) => map.extend(other),
                    Value::Array(items) => {
                        map.extend(items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)))
                    }
                    Value::String(s) => map.extend(
                        s.chars()
                            .enumerate()
                            .map(|(i, c)| (i.to_string(), Value::String(c.to_string()))),
                    ),
                    _ => {}
                },
            }
        }
        Ok(Value::Object(map))
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr, env: &Env) -> Eval<Value> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = operand {
                return Ok(Value::str(
                    lookup(env, name).map(|v| v.type_of()).unwrap_or("undefined"),
                ));
            }
        }
        let v = self.eval(operand, env)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!v.truthy()),
            UnaryOp::Neg => Value::Number(-v.to_number()),
            UnaryOp::Plus => Value::Number(v.to_number()),
            UnaryOp::TypeOf => Value::str(v.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn eval_call(&self, callee: &Expr, args: &[ArrayItem], optional: bool, env: &Env) -> Eval<Value> {
        let Expr::Member {
            object,
            property,
            optional: member_optional,
        } = callee
        else {
            let f = self.eval(callee, env)?;
            if optional && f.is_nullish() {
                return Err(Interrupt::ShortCircuit);
            }
            if !matches!(f, Value::Function(_)) {
                return Err(not_a_function(callee).into());
            }
            let args = self.eval_items(args, env)?;
            return self.call(&f, args);
        };

        let this = self.eval(object, env)?;
        if *member_optional && this.is_nullish() {
            return Err(Interrupt::ShortCircuit);
        }
        let key = self.member_key(property, env)?;
        if let Value::Object(map) = &this {
            if let Some(f) = map.get(&key) {
                if optional && f.is_nullish() {
                    return Err(Interrupt::ShortCircuit);
                }
                if !matches!(f, Value::Function(_)) {
                    return Err(not_a_function(callee).into());
                }
                let f = f.clone();
                let args = self.eval_items(args, env)?;
                return self.call(&f, args);
            }
        }
        if this.is_nullish() {
            // Surface the "cannot read" error rather than "not a function".
            builtins::get_property(&this, &key)?;
        }
        let args = self.eval_items(args, env)?;
        match builtins::call_method(self, &this, &key, args)? {
            Method::Value(v) => Ok(v),
            Method::Mutated { result, updated } => {
                if is_place(object) {
                    self.store(object, updated, env, true)?;
                }
                Ok(result)
            }
            Method::NotFound if optional => Err(Interrupt::ShortCircuit),
            Method::NotFound => Err(not_a_function(callee).into()),
        }
    }

    /// [`Self::assign`], refusing values that would push the target's root
    /// container past [`MAX_VALUE_DEPTH`].
    fn store(&self, target: &Expr, value: Value, env: &Env, through_member: bool) -> Eval<()> {
        let limit = MAX_VALUE_DEPTH.saturating_sub(member_path_len(target));
        if value.nests_deeper_than(limit) {
            return Err(ExprError::Nesting(MAX_VALUE_DEPTH).into());
        }
        self.assign(target, value, env, through_member)
    }

    /// Store `value` into `target`, writing nested containers back up the path.
    fn assign(&self, target: &Expr, value: Value, env: &Env, through_member: bool) -> Eval<()> {
        match target {
            Expr::Ident(name) => {
                let outcome = with_binding(env, name, |binding| {
                    if !binding.mutable && !through_member {
                        return Err(ExprError::type_error("Assignment to constant variable."));
                    }
                    binding.value = value;
                    Ok(())
                });
                match outcome {
                    Some(result) => Ok(result?),
                    None => Err(ExprError::Reference(name.clone()).into()),
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                let key = self.member_key(property, env)?;
                let mut container = self.eval(object, env)?;
                builtins::set_property(&mut container, &key, value)?;
                if is_place(object) {
                    self.assign(object, container, env, true)
                } else {
                    Ok(())
                }
            }
            _ => Err(ExprError::type_error("invalid assignment target").into()),
        }
    }
}

fn member_path_len(expr: &Expr) -> usize {
    match expr {
        Expr::Member { object, .. } => 1 + member_path_len(object),
        _ => 0,
    }
}

fn is_place(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) => true,
        Expr::Member {
            object,
            optional: false,
            ..
        } => is_place(object),
        _ => false,
    }
}

fn not_a_function(callee: &Expr) -> ExprError {
    ExprError::type_error(format!("{} is not a function", describe_callee(callee)))
}

fn describe_callee(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object,
            property: MemberKey::Static(name),
            ..
        } => format!("{}.{name}", describe_callee(object)),
        Expr::Member { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::Chain(inner) => describe_callee(inner),
        _ => "expression".to_string(),
    }
}

pub(crate) fn binary_op(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    use BinaryOp::*;
    Ok(match op {
        Add => {
            let stringy = |v: &Value| {
                matches!(
                    v,
                    Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Function(_)
                )
            };
            if stringy(l) || stringy(r) {
                Value::String(format!("{l}{r}"))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        Sub => Value::Number(l.to_number() - r.to_number()),
        Mul => Value::Number(l.to_number() * r.to_number()),
        Div => Value::Number(l.to_number() / r.to_number()),
        Rem => Value::Number(l.to_number() % r.to_number()),
        Pow => Value::Number(l.to_number().powf(r.to_number())),
        Eq => Value::Bool(l.loose_eq(r)),
        NotEq => Value::Bool(!l.loose_eq(r)),
        StrictEq => Value::Bool(l.strict_eq(r)),
        StrictNotEq => Value::Bool(!l.strict_eq(r)),
        Lt | Gt | LtEq | GtEq => {
            let ord = match (l, r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            Value::Bool(match ord {
                None => false,
                Some(o) => match op {
                    Lt => o.is_lt(),
                    Gt => o.is_gt(),
                    LtEq => o.is_le(),
                    _ => o.is_ge(),
                },
            })
        }
        In => {
            let key = l.to_string();
            match r {
                Value::Object(map) => Value::Bool(map.contains_key(&key)),
                Value::Array(items) => Value::Bool(
                    key == "length" || key.parse::<usize>().is_ok_and(|i| i < items.len()),
                ),
                other => {
                    return Err(ExprError::type_error(format!(
                        "Cannot use 'in' operator to search for '{key}' in {other}"
                    )));
                }
            }
        }
        InstanceOf => match r {
            Value::Function(f) => match f.as_ref() {
                Callable::Host { name, .. } if name.ends_with("Error") => {
                    let Value::Object(map) = l else {
                        return Ok(Value::Bool(false));
                    };
                    let matches_name = *name == "Error"
                        || matches!(map.get("name"), Some(Value::String(n)) if n == name);
                    Value::Bool(map.contains_key("message") && matches_name)
                }
                _ => Value::Bool(false),
            },
            _ => {
                return Err(ExprError::type_error(
                    "Right-hand side of 'instanceof' is not callable",
                ));
            }
        },
    })
}

/// Script-visible error object for a caught evaluation error.
pub(crate) fn error_value(e: &ExprError) -> Value {
    let (name, message) = match e {
        ExprError::Reference(name) => ("ReferenceError", format!("{name} is not defined")),
        ExprError::Type(msg) => ("TypeError", msg.clone()),
        ExprError::Syntax { message, .. } => ("SyntaxError", message.clone()),
        other => ("Error", other.to_string()),
    };
    error_object(name, message)
}

pub(crate) fn error_object(name: &str, message: String) -> Value {
    let mut map = Object::new();
    map.insert("name".into(), Value::str(name));
    map.insert("message".into(), Value::String(message));
    Value::Object(map)
}

/// Message for an uncaught thrown value.
pub(crate) fn thrown_message(v: &Value) -> String {
    match v {
        Value::Object(map) => match (map.get("name"), map.get("message")) {
            (Some(name), Some(message)) => format!("{name}: {message}"),
            (None, Some(message)) => message.to_string(),
            _ => format!("{v:?}"),
        },
        other => other.to_string(),
    }
}

fn into_error(i: Interrupt) -> ExprError {
    match i {
        Interrupt::Error(e) => e,
        Interrupt::Throw(v) => ExprError::Thrown(thrown_message(&v)),
        Interrupt::ShortCircuit => ExprError::type_error("optional chain escaped its boundary"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::builtins::install_globals;
    use crate::expression::parser::{parse_expression, parse_program};

    fn globals() -> Env {
        let env = Scope::root();
        install_globals(&env);
        env
    }

    fn eval(src: &str) -> Result<Value, ExprError> {
        let expr = parse_expression(src)?;
        Interpreter::new().evaluate(&expr, &globals())
    }

    fn run(src: &str) -> Result<Value, ExprError> {
        let prog = parse_program(src)?;
        Interpreter::new().run(&prog, &globals())
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3").unwrap().to_string(), "7");
        assert_eq!(eval("'a' + 1").unwrap().to_string(), "a1");
        assert_eq!(eval("2 ** 10").unwrap().to_string(), "1024");
        assert_eq!(eval("`x=${1 + 1}`").unwrap().to_string(), "x=2");
    }

    #[test]
    fn test_optional_chaining_yields_undefined() {
        assert!(matches!(eval("({}).a?.b.c"), Ok(Value::Undefined)));
        assert!(matches!(eval("null?.x"), Ok(Value::Undefined)));
        assert!(eval("({}).a.b").is_err());
    }

    #[test]
    fn test_closures_and_array_methods() {
        let v = run(
            "const xs = [1, 2, 3]\n\
             const double = x => x * 2\n\
             return xs.map(double).filter(x => x > 2).reduce((a, b) => a + b, 0)",
        )
        .unwrap();
        assert_eq!(v.to_string(), "10");
    }

    #[test]
    fn test_nested_member_assignment_writes_back() {
        let v = run("const o = { a: { b: 1 } }; o.a.b = 5; o.a.c = [1]; o.a.c.push(2); return o").unwrap();
        assert_eq!(
            v.to_json(),
            Some(serde_json::json!({"a": {"b": 5, "c": [1, 2]}}))
        );
    }

    #[test]
    fn test_const_rebinding_is_rejected() {
        let err = run("const a = 1; a = 2").unwrap_err();
        assert!(matches!(err, ExprError::Type(_)));
    }

    #[test]
    fn test_try_catch_and_throw() {
        let v = run("try { throw new Error('boom') } catch (e) { return e.message }").unwrap();
        assert_eq!(v.to_string(), "boom");

        let v = run("try { missing() } catch (e) { return e.name }").unwrap();
        assert_eq!(v.to_string(), "ReferenceError");

        let err = run("throw new Error('bad')").unwrap_err();
        assert_eq!(err, ExprError::Thrown("Error: bad".into()));
    }

    #[test]
    fn test_finally_runs() {
        let v = run("let n = 0; try { n = 1 } finally { n = n + 10 }; return n").unwrap();
        assert_eq!(v.to_string(), "11");
    }

    #[test]
    fn test_loops() {
        let v = run(
            "let total = 0\n\
             for (let i = 0; i < 5; i++) { if (i === 3) continue; total += i }\n\
             let j = 0\n\
             while (true) { j++; if (j > 2) break }\n\
             for (const k in { a: 1, b: 2 }) total += k.length\n\
             return total + j",
        )
        .unwrap();
        assert_eq!(v.to_string(), "12");
    }

    #[test]
    fn test_hoisted_function_declarations() {
        let v = run("return twice(4); function twice(x) { return x * 2 }").unwrap();
        assert_eq!(v.to_string(), "8");
    }

    #[test]
    fn test_step_budget_stops_infinite_loops() {
        let prog = parse_program("while (true) {}").unwrap();
        let err = Interpreter::with_budget(500).run(&prog, &globals()).unwrap_err();
        assert_eq!(err, ExprError::Budget(500));
    }

    #[test]
    fn test_budget_errors_are_not_catchable() {
        let prog = parse_program("try { while (true) {} } catch (e) { return 1 }").unwrap();
        let err = Interpreter::with_budget(500).run(&prog, &globals()).unwrap_err();
        assert!(matches!(err, ExprError::Budget(_)));
    }

    #[test]
    fn test_recursion_depth_is_bounded() {
        let err = run("function f(n) { return f(n + 1) } return f(0)").unwrap_err();
        assert_eq!(err, ExprError::Depth(MAX_CALL_DEPTH));
    }

    #[test]
    fn test_value_nesting_is_bounded() {
        let err = run("let a = []; for (let i = 0; i < 20000; i++) { a = [a] } return JSON.stringify(a)")
            .unwrap_err();
        assert_eq!(err, ExprError::Nesting(MAX_VALUE_DEPTH));

        let err = run("let o = {}; try { for (;;) { o = { next: o } } } catch (e) { return 1 }").unwrap_err();
        assert_eq!(err, ExprError::Nesting(MAX_VALUE_DEPTH));

        let err = run("let a = [[]]; let b = []; for (let i = 0; i < 300; i++) { a[0] = b; b = [b] }")
            .unwrap_err();
        assert_eq!(err, ExprError::Nesting(MAX_VALUE_DEPTH));
    }

    #[test]
    fn test_moderate_nesting_round_trips() {
        let v = run("let a = 1; for (let i = 0; i < 100; i++) { a = [a] } return JSON.parse(JSON.stringify(a))")
            .unwrap();
        assert!(!v.nests_deeper_than(100));
        assert!(v.nests_deeper_than(99));
    }

    #[test]
    fn test_typeof_undeclared_is_undefined() {
        assert_eq!(eval("typeof nothingHere").unwrap().to_string(), "undefined");
        assert!(matches!(eval("nothingHere"), Err(ExprError::Reference(_))));
    }

    #[test]
    fn test_spread_and_rest() {
        let v = run(
            "const sum = (...xs) => xs.reduce((a, b) => a + b, 0)\n\
             const base = { a: 1 }\n\
             const merged = { ...base, b: 2 }\n\
             return sum(...[1, 2, 3]) + Object.keys(merged).length",
        )
        .unwrap();
        assert_eq!(v.to_string(), "8");
    }
}
