//! Global objects, intrinsic functions and value methods.
//!
//! Only pure helpers live here: nothing in this module can reach the network,
//! the file system, timers or randomness.

use std::cmp::Ordering;
use std::fmt::Write as _;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, error, info, warn};

use super::error::ExprError;
use super::interpreter::{Eval, Interpreter, error_object};
use super::value::{Callable, Env, Intrinsic, Object, Value, format_number};

/// Outcome of looking up a method on a value.
pub(crate) enum Method {
    NotFound,
    Value(Value),
    /// An in-place array method: `updated` must be written back to the receiver.
    Mutated { result: Value, updated: Value },
}

fn object<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Declare the standard globals in `env`.
pub fn install_globals(env: &Env) {
    use Intrinsic::*;
    let i = Value::intrinsic;
    let mut scope = env.borrow_mut();
    scope.declare(
        "JSON",
        object([("stringify", i(JsonStringify)), ("parse", i(JsonParse))]),
        false,
    );
    scope.declare(
        "Math",
        object([
            ("floor", i(MathFloor)),
            ("ceil", i(MathCeil)),
            ("round", i(MathRound)),
            ("abs", i(MathAbs)),
            ("min", i(MathMin)),
            ("max", i(MathMax)),
            ("pow", i(MathPow)),
            ("sqrt", i(MathSqrt)),
            ("trunc", i(MathTrunc)),
            ("sign", i(MathSign)),
            ("PI", Value::Number(std::f64::consts::PI)),
            ("E", Value::Number(std::f64::consts::E)),
        ]),
        false,
    );
    scope.declare(
        "Object",
        object([
            ("keys", i(ObjectKeys)),
            ("values", i(ObjectValues)),
            ("entries", i(ObjectEntries)),
            ("assign", i(ObjectAssign)),
            ("fromEntries", i(ObjectFromEntries)),
        ]),
        false,
    );
    scope.declare(
        "Array",
        object([("isArray", i(ArrayIsArray)), ("from", i(ArrayFrom))]),
        false,
    );
    scope.declare("String", i(StringCtor), false);
    scope.declare("Number", i(NumberCtor), false);
    scope.declare("Boolean", i(BooleanCtor), false);
    scope.declare("parseInt", i(ParseInt), false);
    scope.declare("parseFloat", i(ParseFloat), false);
    scope.declare("isNaN", i(IsNaN), false);
    scope.declare("NaN", Value::Number(f64::NAN), false);
    scope.declare("Infinity", Value::Number(f64::INFINITY), false);
    for name in ["Error", "TypeError", "RangeError", "SyntaxError"] {
        scope.declare(
            name,
            Value::host(name, move |args| {
                let message = args.first().map(|m| m.to_string()).unwrap_or_default();
                Ok(error_object(name, message))
            }),
            false,
        );
    }
    scope.declare("console", console("uiflow::script"), false);
}

/// The `$utils` helper object.
pub fn utils_object() -> Value {
    use Intrinsic::*;
    object([
        ("formatDate", Value::intrinsic(FormatDate)),
        ("formatJSON", Value::intrinsic(FormatJson)),
        ("isNull", Value::intrinsic(IsNull)),
        ("isUndefined", Value::intrinsic(IsUndefined)),
        ("isEmpty", Value::intrinsic(IsEmpty)),
    ])
}

/// A `console` object forwarding to `tracing`.
pub fn console(target: &'static str) -> Value {
    // `tracing` macros need a literal target, so the target is recorded as a field.
    object([
        (
            "log",
            Value::host("log", move |args| {
                debug!(target: "uiflow::script", source = target, "{}", console_text(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "debug",
            Value::host("debug", move |args| {
                debug!(target: "uiflow::script", source = target, "{}", console_text(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "info",
            Value::host("info", move |args| {
                info!(target: "uiflow::script", source = target, "{}", console_text(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn",
            Value::host("warn", move |args| {
                warn!(target: "uiflow::script", source = target, "{}", console_text(args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error",
            Value::host("error", move |args| {
                error!(target: "uiflow::script", source = target, "{}", console_text(args));
                Ok(Value::Undefined)
            }),
        ),
    ])
}

pub(crate) fn console_text(args: &[Value]) -> String {
    args.iter()
        .map(|a| match a {
            Value::Array(_) | Value::Object(_) => a
                .to_json()
                .map(|j| j.to_string())
                .unwrap_or_else(|| a.to_string()),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spread/for-of view of a value.
pub(crate) fn iterate(v: Value) -> Result<Vec<Value>, ExprError> {
    match v {
        Value::Array(items) => Ok(items),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ExprError::type_error(format!(
            "{} is not iterable",
            match other {
                Value::Undefined | Value::Null => other.to_string(),
                _ => other.type_of().to_string(),
            }
        ))),
    }
}

pub(crate) fn get_property(target: &Value, key: &str) -> Result<Value, ExprError> {
    Ok(match target {
        Value::Undefined | Value::Null => {
            return Err(ExprError::type_error(format!(
                "Cannot read properties of {target} (reading '{key}')"
            )));
        }
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
        Value::Array(items) => match key {
            "length" => Value::Number(items.len() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undefined),
        },
        Value::String(s) => match key {
            "length" => Value::Number(s.chars().count() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Undefined),
        },
        Value::Function(f) => match (key, f.as_ref()) {
            ("name", Callable::Host { name, .. }) => Value::str(*name),
            ("name", Callable::Closure { def, .. }) => {
                Value::str(def.name.clone().unwrap_or_default())
            }
            _ => Value::Undefined,
        },
        Value::Bool(_) | Value::Number(_) => Value::Undefined,
    })
}

pub(crate) fn set_property(target: &mut Value, key: &str, value: Value) -> Result<(), ExprError> {
    match target {
        Value::Undefined | Value::Null => Err(ExprError::type_error(format!(
            "Cannot set properties of {target} (setting '{key}')"
        ))),
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if key == "length" {
                let len = value.to_number();
                if len < 0.0 || len.fract() != 0.0 || !len.is_finite() {
                    return Err(ExprError::type_error("Invalid array length"));
                }
                items.resize(len as usize, Value::Undefined);
            } else if let Ok(i) = key.parse::<usize>() {
                if i >= items.len() {
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// -------------------------------------------------------------------------
// Methods
// -------------------------------------------------------------------------

pub(crate) fn call_method(
    interp: &Interpreter,
    this: &Value,
    name: &str,
    args: Vec<Value>,
) -> Eval<Method> {
    if name == "toString" && args.is_empty() && !matches!(this, Value::Number(_)) {
        return Ok(Method::Value(Value::String(this.to_string())));
    }
    match this {
        Value::Array(items) => array_method(interp, items, name, args),
        Value::String(s) => Ok(string_method(s, name, &args)?),
        Value::Number(n) => Ok(number_method(*n, name, &args)?),
        Value::Object(map) => Ok(match name {
            "hasOwnProperty" => Method::Value(Value::Bool(
                args.first().is_some_and(|k| map.contains_key(&k.to_string())),
            )),
            _ => Method::NotFound,
        }),
        _ => Ok(Method::NotFound),
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Resolve a possibly negative relative index against `len`.
fn rel_index(v: Option<&Value>, len: usize, default: usize) -> usize {
    match v {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    }
}

fn array_method(
    interp: &Interpreter,
    items: &[Value],
    name: &str,
    args: Vec<Value>,
) -> Eval<Method> {
    let each = |f: &Value, item: &Value, i: usize| -> Eval<Value> {
        interp.call(f, vec![item.clone(), Value::Number(i as f64)])
    };
    let value = match name {
        "map" => {
            let f = arg(&args, 0);
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(each(&f, item, i)?);
            }
            Value::Array(out)
        }
        "filter" => {
            let f = arg(&args, 0);
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Value::Array(out)
        }
        "forEach" => {
            let f = arg(&args, 0);
            for (i, item) in items.iter().enumerate() {
                each(&f, item, i)?;
            }
            Value::Undefined
        }
        "find" | "findIndex" => {
            let f = arg(&args, 0);
            let mut found = None;
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() {
                    found = Some(i);
                    break;
                }
            }
            match (name, found) {
                ("find", Some(i)) => items[i].clone(),
                ("find", None) => Value::Undefined,
                (_, Some(i)) => Value::Number(i as f64),
                (_, None) => Value::Number(-1.0),
            }
        }
        "some" | "every" => {
            let f = arg(&args, 0);
            let want = name == "some";
            let mut hit = !want;
            for (i, item) in items.iter().enumerate() {
                if each(&f, item, i)?.truthy() == want {
                    hit = want;
                    break;
                }
            }
            Value::Bool(hit)
        }
        "reduce" => {
            let f = arg(&args, 0);
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(init) => init.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(ExprError::type_error(
                            "Reduce of empty array with no initial value",
                        )
                        .into());
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, vec![acc, item.clone(), Value::Number(i as f64)])?;
            }
            acc
        }
        "includes" => {
            let needle = arg(&args, 0);
            Value::Bool(items.iter().any(|v| {
                v.strict_eq(&needle) || matches!((v, &needle), (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan())
            }))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            Value::Number(
                items
                    .iter()
                    .position(|v| v.strict_eq(&needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0),
            )
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(s) => s.to_string(),
            };
            Value::String(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let start = rel_index(args.first(), items.len(), 0);
            let end = rel_index(args.get(1), items.len(), items.len());
            Value::Array(if start < end { items[start..end].to_vec() } else { Vec::new() })
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more),
                    other => out.push(other),
                }
            }
            Value::Array(out)
        }
        "flat" => {
            let depth = match args.first() {
                None | Some(Value::Undefined) => 1,
                Some(v) => v.to_number().max(0.0) as usize,
            };
            Value::Array(flatten(items, depth))
        }
        "flatMap" => {
            let f = arg(&args, 0);
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                match each(&f, item, i)? {
                    Value::Array(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Value::Array(out)
        }
        "at" => {
            let n = arg(&args, 0).to_number().trunc();
            let idx = if n < 0.0 { items.len() as f64 + n } else { n };
            if idx >= 0.0 {
                items.get(idx as usize).cloned().unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            }
        }
        "push" => {
            let mut updated = items.to_vec();
            updated.extend(args);
            return Ok(Method::Mutated {
                result: Value::Number(updated.len() as f64),
                updated: Value::Array(updated),
            });
        }
        "unshift" => {
            let mut updated = args;
            updated.extend(items.iter().cloned());
            return Ok(Method::Mutated {
                result: Value::Number(updated.len() as f64),
                updated: Value::Array(updated),
            });
        }
        "pop" => {
            let mut updated = items.to_vec();
            let result = updated.pop().unwrap_or(Value::Undefined);
            return Ok(Method::Mutated {
                result,
                updated: Value::Array(updated),
            });
        }
        "shift" => {
            let mut updated = items.to_vec();
            let result = if updated.is_empty() {
                Value::Undefined
            } else {
                updated.remove(0)
            };
            return Ok(Method::Mutated {
                result,
                updated: Value::Array(updated),
            });
        }
        "reverse" => {
            let mut updated = items.to_vec();
            updated.reverse();
            let result = Value::Array(updated);
            return Ok(Method::Mutated {
                result: result.clone(),
                updated: result,
            });
        }
        "splice" => {
            let start = rel_index(args.first(), items.len(), 0);
            let count = match args.get(1) {
                None => items.len() - start,
                Some(v) => (v.to_number().max(0.0) as usize).min(items.len() - start),
            };
            let mut updated = items.to_vec();
            let removed: Vec<Value> = updated
                .splice(start..start + count, args.into_iter().skip(2))
                .collect();
            return Ok(Method::Mutated {
                result: Value::Array(removed),
                updated: Value::Array(updated),
            });
        }
        "sort" => {
            let sorted = sort_values(interp, items, args.first())?;
            return Ok(Method::Mutated {
                result: sorted.clone(),
                updated: sorted,
            });
        }
        _ => return Ok(Method::NotFound),
    };
    Ok(Method::Value(value))
}

fn flatten(items: &[Value], depth: usize) -> Vec<Value> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(inner, depth - 1)),
            other => out.push(other.clone()),
        }
    }
    out
}

fn sort_values(interp: &Interpreter, items: &[Value], comparator: Option<&Value>) -> Eval<Value> {
    let mut sorted = items.to_vec();
    match comparator {
        Some(f @ Value::Function(_)) => {
            // Insertion sort so comparator errors can propagate.
            for i in 1..sorted.len() {
                let mut j = i;
                while j > 0 {
                    let ord = interp
                        .call(f, vec![sorted[j - 1].clone(), sorted[j].clone()])?
                        .to_number();
                    if ord > 0.0 {
                        sorted.swap(j - 1, j);
                        j -= 1;
                    } else {
                        break;
                    }
                }
            }
        }
        _ => sorted.sort_by(|a, b| match (a.is_nullish(), b.is_nullish()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => a.to_string().cmp(&b.to_string()),
        }),
    }
    Ok(Value::Array(sorted))
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Method, ExprError> {
    let text = |i: usize| args.get(i).map(|v| v.to_string()).unwrap_or_default();
    let chars = || s.chars().collect::<Vec<_>>();
    let value = match name {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "trimStart" => Value::str(s.trim_start()),
        "trimEnd" => Value::str(s.trim_end()),
        "includes" => Value::Bool(s.contains(&text(0))),
        "startsWith" => Value::Bool(s.starts_with(&text(0))),
        "endsWith" => Value::Bool(s.ends_with(&text(0))),
        "indexOf" | "lastIndexOf" => {
            let needle = text(0);
            let found = if name == "indexOf" {
                s.find(&needle)
            } else {
                s.rfind(&needle)
            };
            Value::Number(
                found
                    .map(|byte| s[..byte].chars().count() as f64)
                    .unwrap_or(-1.0),
            )
        }
        "split" => match args.first() {
            None | Some(Value::Undefined) => Value::Array(vec![Value::str(s)]),
            Some(sep) => {
                let sep = sep.to_string();
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(Value::str).collect()
                };
                match args.get(1) {
                    Some(limit) if !limit.is_nullish() => {
                        Value::Array(parts.into_iter().take(limit.to_number() as usize).collect())
                    }
                    _ => Value::Array(parts),
                }
            }
        },
        "slice" => {
            let cs = chars();
            let start = rel_index(args.first(), cs.len(), 0);
            let end = rel_index(args.get(1), cs.len(), cs.len());
            Value::String(if start < end {
                cs[start..end].iter().collect()
            } else {
                String::new()
            })
        }
        "substring" => {
            let cs = chars();
            let clamp = |v: Option<&Value>, default: usize| match v {
                None | Some(Value::Undefined) => default,
                Some(v) => {
                    let n = v.to_number();
                    if n.is_nan() || n < 0.0 { 0 } else { (n as usize).min(cs.len()) }
                }
            };
            let a = clamp(args.first(), 0);
            let b = clamp(args.get(1), cs.len());
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Value::String(cs[lo..hi].iter().collect())
        }
        "replace" => Value::String(s.replacen(&text(0), &text(1), 1)),
        "replaceAll" => Value::String(s.replace(&text(0), &text(1))),
        "padStart" | "padEnd" => {
            let width = arg(args, 0).to_number().max(0.0) as usize;
            let fill = match args.get(1) {
                None | Some(Value::Undefined) => " ".to_string(),
                Some(f) => f.to_string(),
            };
            let len = s.chars().count();
            if width <= len || fill.is_empty() {
                Value::str(s)
            } else {
                let pad: String = fill.chars().cycle().take(width - len).collect();
                Value::String(if name == "padStart" {
                    format!("{pad}{s}")
                } else {
                    format!("{s}{pad}")
                })
            }
        }
        "repeat" => {
            let n = arg(args, 0).to_number();
            if n < 0.0 || !n.is_finite() {
                return Err(ExprError::type_error(format!("Invalid count value: {n}")));
            }
            Value::String(s.repeat(n as usize))
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0 } else { i as usize };
            Value::String(s.chars().nth(i).map(String::from).unwrap_or_default())
        }
        "at" => {
            let cs = chars();
            let n = arg(args, 0).to_number().trunc();
            let idx = if n < 0.0 { cs.len() as f64 + n } else { n };
            if idx >= 0.0 {
                cs.get(idx as usize)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Undefined)
            } else {
                Value::Undefined
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&a.to_string());
            }
            Value::String(out)
        }
        _ => return Ok(Method::NotFound),
    };
    Ok(Method::Value(value))
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Method, ExprError> {
    Ok(Method::Value(match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            if digits > 100 {
                return Err(ExprError::type_error("toFixed() digits argument must be between 0 and 100"));
            }
            if n.is_finite() {
                Value::String(format!("{n:.digits$}"))
            } else {
                Value::String(format_number(n))
            }
        }
        "toString" => {
            let radix = match args.first() {
                None | Some(Value::Undefined) => 10,
                Some(r) => r.to_number() as u32,
            };
            match radix {
                10 => Value::String(format_number(n)),
                2..=36 if n.fract() == 0.0 && n.is_finite() => Value::String(to_radix(n as i64, radix)),
                2..=36 => Value::String(format_number(n)),
                _ => return Err(ExprError::type_error("toString() radix must be between 2 and 36")),
            }
        }
        _ => return Ok(Method::NotFound),
    }))
}

fn to_radix(n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut m = n.unsigned_abs();
    while m > 0 {
        let d = (m % radix as u64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap_or('?'));
        m /= radix as u64;
    }
    if n < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

// -------------------------------------------------------------------------
// Intrinsics
// -------------------------------------------------------------------------

pub(crate) fn call_intrinsic(interp: &Interpreter, i: Intrinsic, args: Vec<Value>) -> Eval<Value> {
    use Intrinsic::*;
    let num = |idx: usize| arg(&args, idx).to_number();
    Ok(match i {
        JsonStringify => {
            let indent = match args.get(2) {
                Some(Value::Number(n)) => " ".repeat(n.clamp(0.0, 10.0) as usize),
                Some(Value::String(s)) => s.chars().take(10).collect(),
                _ => String::new(),
            };
            match stringify(&arg(&args, 0), &indent)? {
                Some(s) => Value::String(s),
                None => Value::Undefined,
            }
        }
        JsonParse => {
            let text = arg(&args, 0).to_string();
            let json: Json = serde_json::from_str(&text)
                .map_err(|e| ExprError::Thrown(format!("SyntaxError: {e}")))?;
            Value::try_from_json(&json)?
        }
        MathFloor => Value::Number(num(0).floor()),
        MathCeil => Value::Number(num(0).ceil()),
        MathRound => Value::Number((num(0) + 0.5).floor()),
        MathAbs => Value::Number(num(0).abs()),
        MathMin => Value::Number(
            args.iter()
                .map(Value::to_number)
                .fold(f64::INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }),
        ),
        MathMax => Value::Number(
            args.iter()
                .map(Value::to_number)
                .fold(f64::NEG_INFINITY, |a, b| if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }),
        ),
        MathPow => Value::Number(num(0).powf(num(1))),
        MathSqrt => Value::Number(num(0).sqrt()),
        MathTrunc => Value::Number(num(0).trunc()),
        MathSign => {
            let n = num(0);
            Value::Number(if n.is_nan() || n == 0.0 { n } else { n.signum() })
        }
        ObjectKeys | ObjectValues | ObjectEntries => {
            let pairs: Vec<(String, Value)> = match arg(&args, 0) {
                Value::Object(map) => map.into_iter().collect(),
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
                Value::String(s) => s
                    .chars()
                    .enumerate()
                    .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
                    .collect(),
                v @ (Value::Undefined | Value::Null) => {
                    return Err(ExprError::type_error(format!(
                        "Cannot convert {v} to object"
                    ))
                    .into());
                }
                _ => Vec::new(),
            };
            Value::Array(
                pairs
                    .into_iter()
                    .map(|(k, v)| match i {
                        ObjectKeys => Value::String(k),
                        ObjectValues => v,
                        _ => Value::Array(vec![Value::String(k), v]),
                    })
                    .collect(),
            )
        }
        ObjectAssign => {
            let mut target = match args.first() {
                Some(Value::Object(map)) => map.clone(),
                None | Some(Value::Undefined | Value::Null) => {
                    return Err(ExprError::type_error("Cannot convert undefined or null to object").into());
                }
                _ => Object::new(),
            };
            for source in args.iter().skip(1) {
                if let Value::Object(map) = source {
                    target.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            Value::Object(target)
        }
        ObjectFromEntries => {
            let mut out = Object::new();
            for entry in iterate(arg(&args, 0))? {
                if let Value::Array(pair) = entry {
                    let key = pair.first().map(|k| k.to_string()).unwrap_or_default();
                    out.insert(key, pair.get(1).cloned().unwrap_or(Value::Undefined));
                }
            }
            Value::Object(out)
        }
        ArrayIsArray => Value::Bool(matches!(args.first(), Some(Value::Array(_)))),
        ArrayFrom => {
            let items = match arg(&args, 0) {
                Value::Object(map) => {
                    let len = map.get("length").map(Value::to_number).unwrap_or(0.0);
                    vec![Value::Undefined; if len.is_finite() && len > 0.0 { len as usize } else { 0 }]
                }
                Value::Undefined | Value::Null => {
                    return Err(ExprError::type_error("Array.from requires an array-like object").into());
                }
                v @ (Value::Array(_) | Value::String(_)) => iterate(v)?,
                _ => Vec::new(),
            };
            match args.get(1) {
                Some(f @ Value::Function(_)) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (idx, item) in items.into_iter().enumerate() {
                        out.push(interp.call(f, vec![item, Value::Number(idx as f64)])?);
                    }
                    Value::Array(out)
                }
                _ => Value::Array(items),
            }
        }
        StringCtor => match args.first() {
            None => Value::str(""),
            Some(v) => Value::String(v.to_string()),
        },
        NumberCtor => Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)),
        BooleanCtor => Value::Bool(args.first().is_some_and(Value::truthy)),
        ParseInt => Value::Number(parse_int(&arg(&args, 0).to_string(), args.get(1))),
        ParseFloat => Value::Number(parse_float(&arg(&args, 0).to_string())),
        IsNaN => Value::Bool(num(0).is_nan()),
        FormatDate => format_date(&args),
        FormatJson => {
            let space = match args.get(1) {
                Some(v) if v.truthy() => v.to_number().clamp(0.0, 10.0) as usize,
                _ => 2,
            };
            let target = arg(&args, 0);
            Value::String(
                stringify(&target, &" ".repeat(space))?.unwrap_or_else(|| target.to_string()),
            )
        }
        IsNull => Value::Bool(matches!(args.first(), Some(Value::Null))),
        IsUndefined => Value::Bool(matches!(args.first(), None | Some(Value::Undefined))),
        IsEmpty => Value::Bool(match args.first() {
            None | Some(Value::Undefined) | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }),
    })
}

/// `JSON.stringify`; `None` when the value has no JSON form.
pub(crate) fn stringify(v: &Value, indent: &str) -> Result<Option<String>, ExprError> {
    let Some(json) = v.try_to_json()? else {
        return Ok(None);
    };
    if indent.is_empty() {
        return Ok(Some(json.to_string()));
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    json.serialize(&mut ser)
        .map_err(|e| ExprError::type_error(e.to_string()))?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn parse_int(s: &str, radix: Option<&Value>) -> f64 {
    let t = s.trim();
    let (negative, mut t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let explicit = match radix {
        None | Some(Value::Undefined) => None,
        Some(r) => Some(r.to_number() as u32).filter(|r| *r != 0),
    };
    let mut radix = explicit.unwrap_or(10);
    if matches!(explicit, None | Some(16)) && (t.starts_with("0x") || t.starts_with("0X")) {
        radix = 16;
        t = &t[2..];
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut n = 0f64;
    let mut any = false;
    for d in t.chars().map_while(|c| c.to_digit(radix)) {
        n = n * radix as f64 + d as f64;
        any = true;
    }
    if !any {
        return f64::NAN;
    }
    if negative { -n } else { n }
}

fn parse_float(s: &str) -> f64 {
    let t = s.trim_start();
    for prefix in ["Infinity", "+Infinity"] {
        if t.starts_with(prefix) {
            return f64::INFINITY;
        }
    }
    if t.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let end = t
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    (1..=end)
        .rev()
        .find_map(|len| t[..len].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

fn parse_date(v: &Value) -> Option<DateTime<Local>> {
    match v {
        Value::Number(ms) if ms.is_finite() => Local.timestamp_millis_opt(*ms as i64).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Local));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Local.from_local_datetime(&naive).single();
                }
            }
            for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
                if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                    return date
                        .and_hms_opt(0, 0, 0)
                        .and_then(|naive| Local.from_local_datetime(&naive).single());
                }
            }
            None
        }
        _ => None,
    }
}

/// `$utils.formatDate(date, format?)`. Unparseable input is echoed back.
fn format_date(args: &[Value]) -> Value {
    let input = arg(args, 0);
    let Some(dt) = parse_date(&input) else {
        return Value::String(input.to_string());
    };
    let mut out = String::new();
    let written = match args.get(1) {
        Some(Value::String(f)) if f.contains('%') => write!(out, "{}", dt.format(f)),
        Some(Value::String(_)) => write!(out, "{}", dt.format("%Y/%-m/%-d")),
        _ => write!(out, "{}", dt.format("%Y/%-m/%-d %H:%M:%S")),
    };
    if written.is_err() {
        return Value::String(input.to_string());
    }
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::parser::parse_expression;
    use crate::expression::value::Scope;

    fn eval(src: &str) -> Value {
        let env = Scope::root();
        install_globals(&env);
        env.borrow_mut().declare("$utils", utils_object(), false);
        let expr = parse_expression(src).unwrap();
        Interpreter::new().evaluate(&expr, &env).unwrap()
    }

    #[test]
    fn test_json_helpers() {
        assert_eq!(eval("JSON.stringify({ b: 1, a: [true, null] })").to_string(), r#"{"a":[true,null],"b":1}"#);
        assert_eq!(eval("JSON.stringify({ a: 1 }, null, 2)").to_string(), "{\n  \"a\": 1\n}");
        assert_eq!(eval("JSON.parse('[1, 2]').length").to_string(), "2");
        assert!(matches!(eval("JSON.stringify(undefined)"), Value::Undefined));
    }

    #[test]
    fn test_math_helpers() {
        assert_eq!(eval("Math.round(2.5)").to_string(), "3");
        assert_eq!(eval("Math.round(-2.5)").to_string(), "-2");
        assert_eq!(eval("Math.max(1, 7, 3)").to_string(), "7");
        assert_eq!(eval("Math.min()").to_string(), "Infinity");
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(eval("'a,b,c'.split(',').join('|')").to_string(), "a|b|c");
        assert_eq!(eval("'  hi '.trim().toUpperCase()").to_string(), "HI");
        assert_eq!(eval("'abcdef'.slice(-3)").to_string(), "def");
        assert_eq!(eval("'7'.padStart(3, '0')").to_string(), "007");
        assert_eq!(eval("'hello'.indexOf('l')").to_string(), "2");
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(eval("(3.14159).toFixed(2)").to_string(), "3.14");
        assert_eq!(eval("(255).toString(16)").to_string(), "ff");
        assert_eq!(eval("parseInt('42px')").to_string(), "42");
        assert_eq!(eval("parseFloat('3.5kg')").to_string(), "3.5");
        assert!(eval("isNaN(parseInt('x'))").truthy());
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(eval("[3, 1, 2].sort().join()").to_string(), "1,2,3");
        assert_eq!(eval("[3, 1, 10].sort((a, b) => a - b).join()").to_string(), "1,3,10");
        assert_eq!(eval("[[1], [2, [3]]].flat().length").to_string(), "3");
        assert_eq!(eval("[1, 2, 3].find(x => x > 1)").to_string(), "2");
        assert_eq!(eval("[1, 2, 3].some(x => x > 2)").to_string(), "true");
        assert_eq!(eval("[1, 2, 3].every(x => x > 2)").to_string(), "false");
        assert_eq!(eval("Array.from('ab').length").to_string(), "2");
        assert_eq!(eval("Object.fromEntries([['a', 1]]).a").to_string(), "1");
    }

    #[test]
    fn test_utils_helpers() {
        assert!(eval("$utils.isEmpty([])").truthy());
        assert!(eval("$utils.isEmpty('  ')").truthy());
        assert!(!eval("$utils.isEmpty({ a: 1 })").truthy());
        assert!(eval("$utils.isNull(null)").truthy());
        assert!(eval("$utils.isUndefined(undefined)").truthy());
        assert_eq!(eval("$utils.formatJSON({ a: 1 })").to_string(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_format_date_variants() {
        assert_eq!(eval("$utils.formatDate('2024-03-05 14:07:09')").to_string(), "2024/3/5 14:07:09");
        assert_eq!(eval("$utils.formatDate('2024-03-05', 'YYYY-MM-DD')").to_string(), "2024/3/5");
        assert_eq!(eval("$utils.formatDate('2024-03-05', '%d.%m.%Y')").to_string(), "05.03.2024");
        assert_eq!(eval("$utils.formatDate('not a date')").to_string(), "not a date");
    }

    #[test]
    fn test_error_constructors() {
        let v = eval("new TypeError('nope')");
        assert_eq!(get_property(&v, "name").unwrap().to_string(), "TypeError");
        assert!(eval("new Error('x') instanceof Error").truthy());
    }
}
