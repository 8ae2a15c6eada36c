//! Human-in-the-loop parameter collection.
//!
//! The field list comes either from the step config (`ui` mode) or from a
//! user function (`function` mode). The host prompt then suspends the chain
//! until the user submits or dismisses the form; dismissal surfaces as
//! [`CollectionError::Cancelled`].

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::{debug, info, warn};

use super::{CollectionError, ExecutorDefinition, ExecutorError, ExecutorKind, ExecutorResult};
use crate::expression::{UserCode, Value};
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

const DEFAULT_TITLE: &str = "Enter parameters";
/// Function a bare builder body may define instead of returning directly.
const BUILDER_FN: &str = "buildParameters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    #[default]
    Ui,
    Function,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectOption {
    pub label: String,
    pub value: Json,
}

/// A field as authored in the step config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    pub field_key: String,
    pub field_label: Option<String>,
    pub field_type: Option<String>,
    pub options: Option<Vec<SelectOption>>,
    pub required: Option<bool>,
    pub placeholder: Option<String>,
    pub default_value: Option<Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterBuilderConfig {
    pub title: Option<String>,
    pub mode: ParameterMode,
    pub fields: Vec<FieldConfig>,
    pub function_code: String,
}

/// A normalized field handed to the host prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParameterField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Json>,
}

impl From<FieldConfig> for ParameterField {
    fn from(c: FieldConfig) -> Self {
        let field_type = c
            .field_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "input".into());
        let options = if field_type == "select" {
            c.options.unwrap_or_default()
        } else {
            Vec::new()
        };
        Self {
            label: c.field_label.filter(|l| !l.is_empty()).unwrap_or_else(|| c.field_key.clone()),
            key: c.field_key,
            field_type,
            required: c.required.unwrap_or(true),
            options,
            placeholder: c.placeholder,
            default_value: c.default_value,
        }
    }
}

/// Normalize authored fields; entries without a key are dropped.
pub fn normalize_fields(configs: Vec<FieldConfig>) -> Vec<ParameterField> {
    configs
        .into_iter()
        .filter(|c| {
            let keep = !c.field_key.trim().is_empty();
            if !keep {
                warn!(target: "uiflow::executors", "Parameter field without fieldKey ignored");
            }
            keep
        })
        .map(ParameterField::from)
        .collect()
}

/// Run a builder function and decode the field list it returns.
fn build_fields(code: &str, trigger: &Json, ctx: &ExecutionContext) -> Result<Vec<FieldConfig>, String> {
    let snippet = UserCode::parse(code, &["context"], Some(BUILDER_FN)).map_err(|e| e.to_string())?;

    let mut builder_ctx = match ctx.data() {
        Json::Object(map) => map,
        _ => Map::new(),
    };
    builder_ctx.insert("trigger".into(), trigger.clone());
    builder_ctx.insert("event".into(), json!({ "type": ctx.event, "data": trigger }));
    builder_ctx.insert("timestamp".into(), json!(ctx.timestamp_millis()));

    let out = snippet
        .invoke(vec![Value::from_json(&Json::Object(builder_ctx))])
        .map_err(|e| e.to_string())?;
    match out.to_json() {
        Some(Json::Array(items)) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| format!("invalid parameter field: {e}")))
            .collect(),
        _ => Err("function must return an array of parameter fields".into()),
    }
}

fn is_blank(v: Option<&Json>) -> bool {
    match v {
        None | Some(Json::Null) => true,
        Some(Json::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Check required fields and convert submitted values back to their types.
pub fn process_values(
    fields: &[ParameterField],
    mut values: Map<String, Json>,
) -> Result<Map<String, Json>, CollectionError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|f| f.required && is_blank(values.get(&f.key)))
        .map(|f| f.label.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(CollectionError::Failed(format!(
            "required fields are empty: {}",
            missing.join(", ")
        )));
    }

    for field in fields {
        let Some(Json::String(raw)) = values.get(&field.key) else {
            continue;
        };
        let converted = match field.field_type.as_str() {
            // Object-valued options travel as JSON strings.
            "select" => match serde_json::from_str::<Json>(raw) {
                Ok(v @ (Json::Object(_) | Json::Array(_))) => Some(v),
                _ => None,
            },
            "number" if !raw.trim().is_empty() => match raw.trim().parse::<f64>() {
                Ok(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Some(json!(n as i64)),
                Ok(n) => serde_json::Number::from_f64(n).map(Json::Number),
                Err(_) => {
                    warn!(target: "uiflow::executors", field = %field.key, value = %raw, "Not a number; keeping text");
                    None
                }
            },
            _ => None,
        };
        if let Some(v) = converted {
            values.insert(field.key.clone(), v);
        }
    }
    Ok(values)
}

/// Prompts the user for parameters before the rest of the chain runs.
pub struct ParameterBuilderExecutor;

#[async_trait]
impl ExecutorDefinition for ParameterBuilderExecutor {
    fn label(&self) -> &str {
        "Parameter Builder"
    }

    fn description(&self) -> Option<&str> {
        Some("Collect input parameters from the user, from a field list or a builder function")
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::ParameterCollection
    }

    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config: ParameterBuilderConfig = serde_json::from_value(ctx.config.clone())
            .map_err(|e| CollectionError::Failed(format!("invalid parameter-builder config: {e}")))?;

        let configs = if config.mode == ParameterMode::Function && !config.function_code.trim().is_empty() {
            build_fields(&config.function_code, trigger, ctx)
                .map_err(|e| CollectionError::Failed(format!("builder function failed: {e}")))?
        } else {
            config.fields.clone()
        };
        let fields = normalize_fields(configs);
        let mode = serde_json::to_value(config.mode).unwrap_or(Json::Null);

        if fields.is_empty() {
            debug!(target: "uiflow::executors", executor = "parameter-builder", "No fields; skipping prompt");
            return Ok(ExecutorResult::ok(self.key(), json!({}))
                .with_metadata(json!({ "fields": [], "mode": mode })));
        }

        let title = config
            .title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE);
        info!(target: "uiflow::executors", executor = "parameter-builder", %title, fields = fields.len(), "Prompting for parameters");

        let submitted = ctx.host.prompt.collect(title, &fields).await?;
        let values = process_values(&fields, submitted)?;

        Ok(ExecutorResult::ok(self.key(), Json::Object(values))
            .with_metadata(json!({ "fields": fields, "mode": mode })))
    }
}

impl Keyed for ParameterBuilderExecutor {
    fn key(&self) -> &str {
        "parameter-builder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHost, test_context_with};
    use std::sync::Arc;

    fn ctx_with(host: Arc<RecordingHost>, config: Json) -> ExecutionContext {
        let mut ctx = test_context_with(host, "onClick", json!({"id": 1}));
        ctx.config = config;
        ctx
    }

    #[test]
    fn test_field_normalization() {
        let fields = normalize_fields(vec![
            FieldConfig {
                field_key: "kind".into(),
                field_type: Some("select".into()),
                options: Some(vec![SelectOption { label: "A".into(), value: json!("a") }]),
                ..FieldConfig::default()
            },
            FieldConfig {
                field_key: "note".into(),
                field_label: Some("Note".into()),
                field_type: Some("textarea".into()),
                options: Some(vec![SelectOption { label: "x".into(), value: json!(1) }]),
                required: Some(false),
                ..FieldConfig::default()
            },
            FieldConfig::default(),
        ]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].label, "kind");
        assert!(fields[0].required);
        assert_eq!(fields[0].options.len(), 1);
        assert_eq!(fields[1].field_type, "textarea");
        assert!(fields[1].options.is_empty());
        assert!(!fields[1].required);
    }

    #[test]
    fn test_value_processing() {
        let fields = normalize_fields(serde_json::from_value(json!([
            {"fieldKey": "who", "fieldType": "select"},
            {"fieldKey": "n", "fieldType": "number"},
            {"fieldKey": "ratio", "fieldType": "number", "required": false},
            {"fieldKey": "opt", "required": false},
        ]))
        .unwrap());
        let values = json!({"who": "{\"id\": 3}", "n": "42", "ratio": "0.5"});
        let Json::Object(values) = values else { unreachable!() };
        let out = process_values(&fields, values).unwrap();
        assert_eq!(out["who"], json!({"id": 3}));
        assert_eq!(out["n"], json!(42));
        assert_eq!(out["ratio"], json!(0.5));

        let Json::Object(values) = json!({"who": "x", "n": "  "}) else { unreachable!() };
        let err = process_values(&fields, values).unwrap_err();
        assert!(matches!(err, CollectionError::Failed(m) if m.ends_with(": n")));
    }

    #[tokio::test]
    async fn test_no_fields_skips_prompt() {
        let host = Arc::new(RecordingHost::default());
        let ctx = ctx_with(host.clone(), json!({"fields": []}));
        let r = ParameterBuilderExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert!(r.success);
        assert_eq!(r.data, json!({}));
        assert!(host.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_values_are_returned() {
        let host = Arc::new(RecordingHost::default().answering(json!({"name": "Ada"})));
        let ctx = ctx_with(
            host.clone(),
            json!({"title": "Who?", "fields": [{"fieldKey": "name", "fieldLabel": "Name"}]}),
        );
        let r = ParameterBuilderExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(r.data, json!({"name": "Ada"}));
        assert_eq!(r.metadata.as_ref().unwrap()["mode"], json!("ui"));
        assert_eq!(host.prompts(), vec![("Who?".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_cancel_is_distinguished() {
        let host = Arc::new(RecordingHost::default().cancelling());
        let ctx = ctx_with(host, json!({"fields": [{"fieldKey": "name"}]}));
        let err = ParameterBuilderExecutor.execute(&json!({}), &ctx).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_function_mode() {
        let host = Arc::new(RecordingHost::default().answering(json!({"user": "u1"})));
        for code in [
            "(context) => [{ fieldKey: 'user', fieldLabel: 'User ' + context.trigger.id }]",
            "function buildParameters(context) { return [{ fieldKey: 'user' }] }",
            "function buildParameters(context) { return [{ fieldKey: 'user' }] }\nconst unused = 1",
            "return [{ fieldKey: 'user', fieldType: context.event.type === 'onClick' ? 'input' : 'number' }]",
        ] {
            let ctx = ctx_with(host.clone(), json!({"mode": "function", "functionCode": code}));
            let r = ParameterBuilderExecutor.execute(&json!({"id": 1}), &ctx).await.unwrap();
            assert_eq!(r.data, json!({"user": "u1"}), "{code}");
            assert_eq!(r.metadata.unwrap()["fields"][0]["key"], json!("user"));
        }
    }

    #[tokio::test]
    async fn test_function_must_return_array() {
        let host = Arc::new(RecordingHost::default());
        let ctx = ctx_with(host, json!({"mode": "function", "functionCode": "() => 'nope'"}));
        let err = ParameterBuilderExecutor.execute(&json!({}), &ctx).await.unwrap_err();
        assert!(!err.is_cancellation());
        assert!(err.to_string().contains("array"));
    }
}
