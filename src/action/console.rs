use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::info;

use super::{ActionDefinition, ActionError, compiled_config};
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConsoleConfig {
    message: Option<String>,
    show_details: bool,
}

/// Logs a message; with `showDetails` the trigger payload and executor
/// results are logged too.
pub struct ConsoleAction;

#[async_trait]
impl ActionDefinition for ConsoleAction {
    fn label(&self) -> &str {
        "Console Log"
    }

    fn description(&self) -> Option<&str> {
        Some("Write a message to the log")
    }

    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: ConsoleConfig = compiled_config(self.key(), ctx)?;
        let message = config.message.unwrap_or_else(|| "Automation triggered".into());
        if config.show_details {
            let executors = serde_json::to_string(&ctx.executors).unwrap_or_default();
            info!(
                target: "uiflow::actions::console",
                event = %ctx.event,
                trigger_id = ?ctx.trigger_id,
                %trigger,
                %executors,
                "{message}"
            );
        } else {
            info!(target: "uiflow::actions::console", event = %ctx.event, "{message}");
        }
        Ok(())
    }
}

impl Keyed for ConsoleAction {
    fn key(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use serde_json::json;

    #[tokio::test]
    async fn test_logs_without_failing() {
        let mut ctx = test_context("onClick", json!({"id": 1}));
        ctx.config = json!({"message": "clicked {{$context.trigger.id}}", "showDetails": true});
        assert!(ConsoleAction.execute(&json!({"id": 1}), &ctx).await.is_ok());

        ctx.config = json!({});
        assert!(ConsoleAction.execute(&json!({}), &ctx).await.is_ok());
    }
}
