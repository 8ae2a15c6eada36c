use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value as Json, json};
use tracing::{debug, warn};

use super::{ExecutorDefinition, ExecutorError, ExecutorResult};
use crate::expression::{ExprError, Object, UserCode, Value, console};
use crate::host::FormHandle;
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

/// Runs user code as `(trigger, context)`.
///
/// `context` is `{form, executors, timestamp, config, console}`; `form`
/// exposes `getValue(name)`, `setValue(name, value)` and `values()` when the
/// host supplied a form.
pub struct ScriptExecutor;

impl ScriptExecutor {
    fn run(&self, source: &str, trigger: &Json, ctx: &ExecutionContext) -> Result<Json, ExprError> {
        let code = UserCode::parse(source, &["trigger", "context"], None)?;
        debug!(target: "uiflow::executors", executor = "script", shape = ?code.shape(), "Running script");
        let args = vec![Value::from_json(trigger), script_context(ctx)];
        let out = code.invoke(args)?;
        Ok(normalize(&out))
    }
}

/// Reduce a script's return value to `{success, data, message, metadata}`.
fn normalize(out: &Value) -> Json {
    match out {
        Value::Object(map) => {
            let success = !matches!(map.get("success"), Some(Value::Bool(false)));
            let data = match map.get("data") {
                Some(d) if d.truthy() => d.to_json().unwrap_or(Json::Null),
                _ => out.to_json().unwrap_or(Json::Null),
            };
            let mut metadata = Map::new();
            if let Some(message) = map.get("message").and_then(Value::to_json) {
                metadata.insert("message".into(), message);
            }
            if let Some(Json::Object(extra)) = map.get("metadata").and_then(Value::to_json) {
                metadata.extend(extra);
            }
            json!({ "success": success, "data": data, "metadata": metadata })
        }
        other => {
            let message = match other {
                Value::String(s) => s.clone(),
                _ => "Script executed".to_string(),
            };
            json!({
                "success": true,
                "data": other.to_json().unwrap_or(Json::Null),
                "metadata": { "message": message },
            })
        }
    }
}

fn script_context(ctx: &ExecutionContext) -> Value {
    let mut map = Object::new();
    map.insert(
        "form".into(),
        ctx.form().map(|f| form_object(f.clone())).unwrap_or(Value::Null),
    );
    map.insert(
        "executors".into(),
        Value::from_json(&serde_json::to_value(&ctx.executors).unwrap_or_else(|_| json!([]))),
    );
    map.insert("timestamp".into(), Value::Number(ctx.timestamp_millis() as f64));
    map.insert("config".into(), Value::from_json(&ctx.config));
    map.insert("console".into(), console("uiflow::executors::script"));
    Value::Object(map)
}

fn form_object(form: Arc<dyn FormHandle>) -> Value {
    let mut map = Object::new();
    let getter = form.clone();
    map.insert(
        "getValue".into(),
        Value::host("getValue", move |args| {
            let name = args.first().map(|a| a.to_string()).unwrap_or_default();
            Ok(getter.get_value(&name).map(|v| Value::from_json(&v)).unwrap_or(Value::Undefined))
        }),
    );
    let setter = form.clone();
    map.insert(
        "setValue".into(),
        Value::host("setValue", move |args| {
            let name = args.first().map(|a| a.to_string()).unwrap_or_default();
            let value = args.get(1).and_then(Value::to_json).unwrap_or(Json::Null);
            setter
                .set_value(&name, value)
                .map_err(|e| ExprError::Thrown(format!("Error: {e}")))?;
            Ok(Value::Undefined)
        }),
    );
    map.insert(
        "values".into(),
        Value::host("values", move |_| Ok(Value::from_json(&Json::Object(form.values())))),
    );
    Value::Object(map)
}

#[async_trait]
impl ExecutorDefinition for ScriptExecutor {
    fn label(&self) -> &str {
        "Script"
    }

    fn description(&self) -> Option<&str> {
        Some("Run a custom script over the trigger payload and previous results")
    }

    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let source = ctx
            .config
            .get("script")
            .and_then(Json::as_str)
            .filter(|s| !s.trim().is_empty());
        let Some(source) = source else {
            return Ok(ExecutorResult::failure(self.key(), "script is empty")
                .with_metadata(json!({ "error": "script is empty" })));
        };

        match self.run(source, trigger, ctx) {
            Ok(out) => {
                let result = ExecutorResult::ok(self.key(), out["data"].clone())
                    .with_metadata(out["metadata"].clone());
                Ok(ExecutorResult {
                    success: out["success"].as_bool().unwrap_or(true),
                    ..result
                })
            }
            Err(e) => {
                warn!(target: "uiflow::executors", executor = "script", error = %e, "Script failed");
                Ok(ExecutorResult::failure(self.key(), &e).with_metadata(json!({ "error": e.to_string() })))
            }
        }
    }
}

impl Keyed for ScriptExecutor {
    fn key(&self) -> &str {
        "script"
    }
}
