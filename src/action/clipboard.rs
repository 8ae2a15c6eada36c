use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::info;

use super::{ActionDefinition, ActionError, compiled_config};
use crate::host::NoticeLevel;
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClipboardConfig {
    content: Json,
}

pub struct ClipboardWriteAction;

#[async_trait]
impl ActionDefinition for ClipboardWriteAction {
    fn label(&self) -> &str {
        "Copy to Clipboard"
    }

    fn description(&self) -> Option<&str> {
        Some("Write the configured content to the clipboard")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: ClipboardConfig = compiled_config(self.key(), ctx)?;
        let content = match config.content {
            Json::Null => String::new(),
            Json::String(s) => s,
            other => other.to_string(),
        };
        if content.is_empty() {
            ctx.host
                .notifier
                .notify(NoticeLevel::Error, "Clipboard content must not be empty", None);
            return Err(ActionError::failed("clipboard content must not be empty"));
        }

        ctx.host.ui.write_clipboard(&content)?;
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        info!(target: "uiflow::actions", action = "clipboard-write", chars = content.chars().count(), %preview, "Copied");
        ctx.host
            .notifier
            .notify(NoticeLevel::Success, "Content copied to clipboard", None);
        Ok(())
    }
}

impl Keyed for ClipboardWriteAction {
    fn key(&self) -> &str {
        "clipboard-write"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHost, test_context_with};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_writes_and_notifies() {
        let host = Arc::new(RecordingHost::default());
        let mut ctx = test_context_with(host.clone(), "onClick", json!({"code": "X-1"}));
        ctx.config = json!({"content": "code={{$context.trigger.code}}"});
        ClipboardWriteAction.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(host.clipboard(), vec!["code=X-1".to_string()]);
        assert_eq!(host.notices()[0].0, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_empty_content_fails_with_notice() {
        let host = Arc::new(RecordingHost::default());
        let ctx = test_context_with(host.clone(), "onClick", json!({}));
        let err = ClipboardWriteAction.execute(&json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::Failed(_)));
        assert!(host.clipboard().is_empty());
        assert_eq!(host.notices()[0].0, NoticeLevel::Error);
    }
}
