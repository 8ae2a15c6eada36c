//! `{{ expression }}` placeholder substitution.
//!
//! Each placeholder is evaluated against a compile scope holding exactly three
//! bindings (`$context`, `$system`, `$utils`) plus the pure intrinsics. A
//! placeholder that fails, or evaluates to `undefined`/`null`, is kept verbatim.

use chrono::{Local, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};
use tracing::{trace, warn};

use super::builtins::{install_globals, utils_object};
use super::interpreter::Interpreter;
use super::parser::parse_expression;
use super::value::{Env, Scope, Value};
use crate::runtime::ExecutionContext;

/// Compile a template. Non-string values are returned unchanged.
pub fn compile(template: &Json, ctx: &ExecutionContext) -> Json {
    match template {
        Json::String(s) => Json::String(compile_str(s, ctx)),
        other => other.clone(),
    }
}

/// Substitute every placeholder in `template`.
pub fn compile_str(template: &str, ctx: &ExecutionContext) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let mut compiler = Compiler::new(ctx);
    compiler.compile_str(template)
}

/// Compile every string leaf of `value`; structure and keys are preserved.
pub fn compile_object(value: &Json, ctx: &ExecutionContext) -> Json {
    let mut compiler = Compiler::new(ctx);
    compiler.compile_value(value)
}

/// Shares one compile scope across every placeholder of a call. The scope is
/// built lazily so that templates without placeholders cost nothing.
struct Compiler<'a> {
    ctx: &'a ExecutionContext,
    env: Option<Env>,
}

impl<'a> Compiler<'a> {
    fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx, env: None }
    }

    fn env(&mut self) -> Env {
        self.env
            .get_or_insert_with(|| compile_scope(self.ctx))
            .clone()
    }

    fn compile_value(&mut self, value: &Json) -> Json {
        match value {
            Json::String(s) => Json::String(self.compile_str(s)),
            Json::Array(items) => Json::Array(items.iter().map(|v| self.compile_value(v)).collect()),
            Json::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.compile_value(v));
                }
                Json::Object(out)
            }
            other => other.clone(),
        }
    }

    fn compile_str(&mut self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut idx = 0;

        while let Some(rel) = template[idx..].find("{{") {
            let start = idx + rel;
            out.push_str(&template[idx..start]);

            let content_start = start + 2;
            let Some(end_rel) = template[content_start..].find("}}") else {
                // No closing delimiter: the rest is literal.
                out.push_str(&template[start..]);
                return out;
            };
            let end = content_start + end_rel;
            let placeholder = &template[start..end + 2];
            let expr = template[content_start..end].trim();

            if expr.is_empty() {
                out.push_str(placeholder);
            } else {
                match self.evaluate(expr) {
                    Some(text) => out.push_str(&text),
                    None => out.push_str(placeholder),
                }
            }
            idx = end + 2;
        }

        out.push_str(&template[idx..]);
        out
    }

    /// Render one placeholder, or `None` to keep it verbatim.
    fn evaluate(&mut self, expr: &str) -> Option<String> {
        let env = self.env();
        let result = parse_expression(expr).and_then(|ast| Interpreter::new().evaluate(&ast, &env));
        match result {
            Ok(value) => {
                trace!(target: "uiflow::compile", %expr, ?value, "Evaluated placeholder");
                format_result(&value)
            }
            Err(error) => {
                warn!(target: "uiflow::compile", %expr, %error, "Failed to compile expression");
                None
            }
        }
    }
}

fn format_result(value: &Value) -> Option<String> {
    match value {
        Value::Undefined | Value::Null => None,
        Value::Array(_) | Value::Object(_) => value.to_json().map(|j| j.to_string()),
        other => Some(other.to_string()),
    }
}

/// Drop top-level keys starting with `_` (framework internals).
pub(crate) fn sanitize_trigger(trigger: &Json) -> Json {
    match trigger {
        Json::Object(map) => Json::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn compile_scope(ctx: &ExecutionContext) -> Env {
    let env = Scope::root();
    install_globals(&env);

    let mut context = ctx.data();
    if let Json::Object(map) = &mut context {
        let trigger = map.get("trigger").map(sanitize_trigger).unwrap_or(Json::Null);
        map.insert("trigger".into(), trigger);
    }

    let mut scope = env.borrow_mut();
    scope.declare("$context", Value::from_json(&context), false);
    scope.declare("$system", Value::from_json(&system_info()), false);
    scope.declare("$utils", utils_object(), false);
    drop(scope);
    env
}

fn system_info() -> Json {
    let timezone = std::env::var("TZ")
        .ok()
        .filter(|tz| !tz.is_empty())
        .unwrap_or_else(|| Local::now().format("%:z").to_string());
    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .ok()
        .and_then(|l| l.split('.').next().map(|s| s.replace('_', "-")))
        .filter(|l| !l.is_empty() && l != "C" && l != "POSIX")
        .unwrap_or_else(|| "en-US".to_string());
    serde_json::json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "timezone": timezone,
        "locale": locale,
    })
}
