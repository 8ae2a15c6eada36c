//! Runtime values of the expression interpreter.
//!
//! Arrays and objects have value semantics: assigning one to another binding
//! copies it. Objects are key-ordered maps.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Number, Value as Json};

use super::ast::FunctionDef;
use super::error::ExprError;

pub type Object = BTreeMap<String, Value>;

/// Deepest array/object nesting a value may reach.
pub const MAX_VALUE_DEPTH: usize = 128;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Function(Rc<Callable>),
}

/// Host-provided function. Receives already-evaluated arguments.
pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Value, ExprError>>;

pub enum Callable {
    Closure {
        def: Rc<FunctionDef>,
        env: Env,
    },
    Intrinsic(Intrinsic),
    Host {
        name: &'static str,
        func: HostFn,
    },
}

/// Pure built-in functions. None of them reach outside the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    JsonStringify,
    JsonParse,
    MathFloor,
    MathCeil,
    MathRound,
    MathAbs,
    MathMin,
    MathMax,
    MathPow,
    MathSqrt,
    MathTrunc,
    MathSign,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ObjectFromEntries,
    ArrayIsArray,
    ArrayFrom,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ParseInt,
    ParseFloat,
    IsNaN,
    FormatDate,
    FormatJson,
    IsNull,
    IsUndefined,
    IsEmpty,
}

pub type Env = Rc<RefCell<Scope>>;

pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.vars.insert(name.into(), Binding { value, mutable });
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// Walk the scope chain looking for `name`.
pub fn lookup(env: &Env, name: &str) -> Option<Value> {
    let scope = env.borrow();
    match scope.vars.get(name) {
        Some(b) => Some(b.value.clone()),
        None => scope.parent.as_ref().and_then(|p| lookup(p, name)),
    }
}

/// Run `f` against the binding for `name`, wherever it lives in the chain.
pub fn with_binding<R>(env: &Env, name: &str, f: impl FnOnce(&mut Binding) -> R) -> Option<R> {
    let mut scope = env.borrow_mut();
    if let Some(b) = scope.vars.get_mut(name) {
        return Some(f(b));
    }
    let parent = scope.parent.clone();
    drop(scope);
    parent.and_then(|p| with_binding(&p, name, f))
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn host(name: &'static str, func: impl Fn(&[Value]) -> Result<Value, ExprError> + 'static) -> Self {
        Value::Function(Rc::new(Callable::Host {
            name,
            func: Rc::new(func),
        }))
    }

    pub fn intrinsic(i: Intrinsic) -> Self {
        Value::Function(Rc::new(Callable::Intrinsic(i)))
    }

    /// Convert host JSON. Containers nested deeper than [`MAX_VALUE_DEPTH`]
    /// are replaced by `null`.
    pub fn from_json(json: &Json) -> Self {
        Self::from_json_at(json, 0, false).unwrap_or(Value::Null)
    }

    /// Like [`Value::from_json`] but fails instead of truncating.
    pub fn try_from_json(json: &Json) -> Result<Self, ExprError> {
        Self::from_json_at(json, 0, true)
    }

    fn from_json_at(json: &Json, depth: usize, strict: bool) -> Result<Self, ExprError> {
        let nested = matches!(json, Json::Array(_) | Json::Object(_));
        if nested && depth >= MAX_VALUE_DEPTH {
            return if strict {
                Err(ExprError::Nesting(MAX_VALUE_DEPTH))
            } else {
                Ok(Value::Null)
            };
        }
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| Self::from_json_at(v, depth + 1, strict))
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::from_json_at(v, depth + 1, strict)?)))
                    .collect::<Result<_, ExprError>>()?,
            ),
        })
    }

    /// JSON view following `JSON.stringify` rules: `undefined` and functions
    /// vanish (become `null` inside arrays), non-finite numbers become `null`.
    /// Values nested too deeply have no JSON view; see [`Value::try_to_json`].
    pub fn to_json(&self) -> Option<Json> {
        self.try_to_json().unwrap_or(None)
    }

    pub fn try_to_json(&self) -> Result<Option<Json>, ExprError> {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Result<Option<Json>, ExprError> {
        if matches!(self, Value::Array(_) | Value::Object(_)) && depth >= MAX_VALUE_DEPTH {
            return Err(ExprError::Nesting(MAX_VALUE_DEPTH));
        }
        Ok(match self {
            Value::Undefined | Value::Function(_) => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(number_to_json(*n)),
            Value::String(s) => Some(Json::String(s.clone())),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    out.push(v.to_json_at(depth + 1)?.unwrap_or(Json::Null));
                }
                Some(Json::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    if let Some(j) = v.to_json_at(depth + 1)? {
                        out.insert(k.clone(), j);
                    }
                }
                Some(Json::Object(out))
            }
        })
    }

    /// Whether arrays/objects nest more than `limit` levels deep. Never
    /// descends past `limit`.
    pub fn nests_deeper_than(&self, limit: usize) -> bool {
        match self {
            Value::Array(items) => limit == 0 || items.iter().any(|v| v.nests_deeper_than(limit - 1)),
            Value::Object(map) => limit == 0 || map.values().any(|v| v.nests_deeper_than(limit - 1)),
            _ => false,
        }
    }

    /// `Err(Nesting)` when the value exceeds [`MAX_VALUE_DEPTH`].
    pub(crate) fn within_depth(self) -> Result<Self, ExprError> {
        if self.nests_deeper_than(MAX_VALUE_DEPTH) {
            Err(ExprError::Nesting(MAX_VALUE_DEPTH))
        } else {
            Ok(self)
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) if items.is_empty() => 0.0,
            Value::Array(items) if items.len() == 1 => items[0].to_number(),
            _ => f64::NAN,
        }
    }

    /// Strict equality. Arrays and objects compare structurally.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_eq(vb))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if matches!(self, Value::Array(_) | Value::Object(_))
                    || matches!(other, Value::Array(_) | Value::Object(_))
                {
                    return self.to_string() == other.to_string();
                }
                self.to_number() == other.to_number()
            }
            _ => self.strict_eq(other),
        }
    }
}

/// Integers within the safe range serialize without a fraction.
pub fn number_to_json(n: f64) -> Json {
    if !n.is_finite() {
        return Json::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Json::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// `String(value)` semantics.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(c) => match c.as_ref() {
                Callable::Closure { def, .. } => {
                    write!(f, "function {}() {{ [code] }}", def.name.as_deref().unwrap_or(""))
                }
                Callable::Intrinsic(i) => write!(f, "function {i:?}() {{ [native code] }}"),
                Callable::Host { name, .. } => write!(f, "function {name}() {{ [native code] }}"),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Function(_) => f.write_str("[Function]"),
            other => match other.to_json() {
                Some(j) => write!(f, "{j}"),
                None => f.write_str("undefined"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_integers_integral() {
        let v = Value::from_json(&json!({"a": 1, "b": [1.5, null, "x"], "c": true}));
        assert_eq!(v.to_json(), Some(json!({"a": 1, "b": [1.5, null, "x"], "c": true})));
    }

    #[test]
    fn test_undefined_members_are_dropped_from_json() {
        let mut obj = Object::new();
        obj.insert("keep".into(), Value::Number(2.0));
        obj.insert("drop".into(), Value::Undefined);
        let arr = Value::Array(vec![Value::Undefined, Value::Object(obj)]);
        assert_eq!(arr.to_json(), Some(json!([null, {"keep": 2}])));
        assert_eq!(Value::Undefined.to_json(), None);
    }

    fn nested_array(levels: usize) -> Value {
        let mut v = Value::Number(1.0);
        for _ in 0..levels {
            v = Value::Array(vec![v]);
        }
        v
    }

    #[test]
    fn test_json_conversion_caps_nesting() {
        assert!(nested_array(MAX_VALUE_DEPTH).try_to_json().unwrap().is_some());
        let deep = nested_array(20_000);
        assert_eq!(deep.try_to_json(), Err(ExprError::Nesting(MAX_VALUE_DEPTH)));
        assert_eq!(deep.to_json(), None);
        assert!(deep.nests_deeper_than(MAX_VALUE_DEPTH));
        assert!(!nested_array(3).nests_deeper_than(3));
        assert!(nested_array(MAX_VALUE_DEPTH + 1).within_depth().is_err());
        // dropping a 20k-deep value recurses too
        std::mem::forget(deep);
    }

    #[test]
    fn test_from_json_caps_nesting() {
        let mut json = json!(1);
        for _ in 0..(MAX_VALUE_DEPTH + 5) {
            json = json!([json]);
        }
        assert_eq!(Value::try_from_json(&json).unwrap_err(), ExprError::Nesting(MAX_VALUE_DEPTH));
        let truncated = Value::from_json(&json);
        assert!(!truncated.nests_deeper_than(MAX_VALUE_DEPTH));
        assert!(Value::try_from_json(&json!({"a": [1, {"b": null}]})).is_ok());
    }

    #[test]
    fn test_display_follows_string_conversion() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(0.25).to_string(), "0.25");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(
            Value::Array(vec![Value::Number(1.0), Value::Null, Value::str("a")]).to_string(),
            "1,,a"
        );
        assert_eq!(Value::Object(Object::new()).to_string(), "[object Object]");
    }

    #[test]
    fn test_equality_rules() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(Value::str("1").loose_eq(&Value::Number(1.0)));
        assert!(Value::Bool(true).loose_eq(&Value::Number(1.0)));
        assert!(!Value::str("1").strict_eq(&Value::Number(1.0)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::str("").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::Array(vec![]).truthy());
        assert!(!Value::Undefined.truthy());
    }
}
