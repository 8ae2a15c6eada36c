use async_trait::async_trait;
use serde_json::{Value as Json, json};
use tracing::info;

use super::{ExecutorDefinition, ExecutorError, ExecutorResult, compiled_config};
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

/// Passes the trigger payload through, with an optional compiled message.
pub struct EchoExecutor;

#[async_trait]
impl ExecutorDefinition for EchoExecutor {
    fn label(&self) -> &str {
        "Echo Executor"
    }

    fn description(&self) -> Option<&str> {
        Some("Log the trigger context and pass it through to actions")
    }

    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError> {
        let config = compiled_config(ctx);
        let message = config
            .get("message")
            .and_then(Json::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("No custom message configured")
            .to_string();
        info!(target: "uiflow::executors", executor = "echo", event = %ctx.event, %message, "Echo");
        Ok(ExecutorResult::ok(
            self.key(),
            json!({
                "triggerParams": trigger,
                "message": message,
                "compiledConfig": config,
            }),
        ))
    }
}

impl Keyed for EchoExecutor {
    fn key(&self) -> &str {
        "echo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_echo_compiles_message() {
        let mut ctx = test_context("onClick", json!({"x": 1}));
        ctx.config = json!({"message": "x is {{$context.trigger.x}}"});
        let r = EchoExecutor.execute(&json!({"x": 1}), &ctx).await.unwrap();
        assert!(r.success);
        assert_eq!(r.executor_key, "echo");
        assert_eq!(r.data["triggerParams"], json!({"x": 1}));
        assert_eq!(r.data["message"], json!("x is 1"));
        assert_eq!(r.data["compiledConfig"]["message"], json!("x is 1"));
    }

    #[tokio::test]
    async fn test_echo_default_message() {
        let ctx = test_context("onClick", json!({}));
        let r = EchoExecutor.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(r.data["message"], json!("No custom message configured"));
    }
}
