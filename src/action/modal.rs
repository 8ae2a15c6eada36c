use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use super::{ActionDefinition, ActionError, raw_config};
use crate::content::{ContentConfig, render};
use crate::expression::compile_str;
use crate::host::{ModalKind, ModalSpec};
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ModalConfig {
    title: String,
    #[serde(flatten)]
    content: ContentConfig,
    width: u32,
    #[serde(rename = "type")]
    kind: ModalKind,
    ok_text: String,
    cancel_text: String,
    show_cancel: bool,
    auto_close: bool,
    /// Milliseconds.
    auto_close_delay: u64,
}

impl Default for ModalConfig {
    fn default() -> Self {
        Self {
            title: "Notice".into(),
            content: ContentConfig::default(),
            width: 520,
            kind: ModalKind::Info,
            ok_text: "OK".into(),
            cancel_text: "Cancel".into(),
            show_cancel: false,
            auto_close: false,
            auto_close_delay: 3000,
        }
    }
}

impl ModalConfig {
    fn into_spec(self, ctx: &ExecutionContext) -> ModalSpec {
        ModalSpec {
            title: compile_str(&self.title, ctx),
            content: render(&self.content, ctx),
            width: self.width,
            show_cancel: self.show_cancel || self.kind == ModalKind::Confirm,
            kind: self.kind,
            ok_text: self.ok_text,
            cancel_text: self.cancel_text,
            auto_close: (self.auto_close && self.auto_close_delay > 0)
                .then(|| Duration::from_millis(self.auto_close_delay)),
        }
    }
}

/// Modal dialog with rendered content.
pub struct ModalAction;

#[async_trait]
impl ActionDefinition for ModalAction {
    fn label(&self) -> &str {
        "Modal"
    }

    fn description(&self) -> Option<&str> {
        Some("Show a modal dialog")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: ModalConfig = raw_config(self.key(), ctx)?;
        let spec = config.into_spec(ctx);
        debug!(target: "uiflow::actions", action = "modal", title = %spec.title, kind = ?spec.kind, "Showing modal");
        ctx.host.ui.show_modal(spec)?;
        Ok(())
    }
}

impl Keyed for ModalAction {
    fn key(&self) -> &str {
        "modal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentResult;
    use crate::testing::{RecordingHost, test_context_with};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_defaults() {
        let host = Arc::new(RecordingHost::default());
        let ctx = test_context_with(host.clone(), "onClick", json!({}));
        ModalAction.execute(&json!({}), &ctx).await.unwrap();
        let modal = &host.modals()[0];
        assert_eq!(modal.title, "Notice");
        assert_eq!(modal.width, 520);
        assert!(!modal.show_cancel);
        assert_eq!(modal.auto_close, None);
    }

    #[tokio::test]
    async fn test_confirm_with_markdown_and_auto_close() {
        let host = Arc::new(RecordingHost::default());
        let mut ctx = test_context_with(host.clone(), "onClick", json!({"n": 3}));
        ctx.config = json!({
            "title": "Delete {{$context.trigger.n}} rows?",
            "type": "confirm",
            "contentType": "function",
            "contentFunction": "return { type: 'MD', content: '**sure?**' }",
            "autoClose": true,
            "autoCloseDelay": 1500,
        });
        ModalAction.execute(&json!({}), &ctx).await.unwrap();

        let modal = &host.modals()[0];
        assert_eq!(modal.title, "Delete 3 rows?");
        assert_eq!(modal.kind, ModalKind::Confirm);
        assert!(modal.show_cancel);
        assert_eq!(modal.auto_close, Some(Duration::from_millis(1500)));
        assert!(modal.content.is_html());
        assert!(modal.content.content.contains("<strong>sure?</strong>"));
    }

    #[tokio::test]
    async fn test_plain_content() {
        let host = Arc::new(RecordingHost::default());
        let mut ctx = test_context_with(host.clone(), "onClick", json!({}));
        ctx.config = json!({"content": "Hello", "width": 300});
        ModalAction.execute(&json!({}), &ctx).await.unwrap();
        let modal = &host.modals()[0];
        assert_eq!(modal.content, ContentResult::text("Hello"));
        assert_eq!(modal.width, 300);
    }
}
