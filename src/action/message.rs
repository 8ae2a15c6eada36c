use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use super::{ActionDefinition, ActionError, raw_config};
use crate::content::{ContentConfig, render};
use crate::host::NoticeLevel;
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageConfig {
    #[serde(rename = "type")]
    level: NoticeLevel,
    /// Seconds.
    duration: f64,
    #[serde(flatten)]
    content: ContentConfig,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            level: NoticeLevel::Info,
            duration: 3.0,
            content: ContentConfig::default(),
        }
    }
}

/// Toast notification. Notifications are plain text, so HTML content is
/// stripped before sending.
pub struct MessageAction;

#[async_trait]
impl ActionDefinition for MessageAction {
    fn label(&self) -> &str {
        "Message"
    }

    fn description(&self) -> Option<&str> {
        Some("Show a notification message")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: MessageConfig = raw_config(self.key(), ctx)?;
        let text = render(&config.content, ctx).plain_text();
        let duration = (config.duration > 0.0).then(|| Duration::from_secs_f64(config.duration));
        debug!(target: "uiflow::actions", action = "message", level = ?config.level, "Notifying");
        ctx.host.notifier.notify(config.level, &text, duration);
        Ok(())
    }
}

impl Keyed for MessageAction {
    fn key(&self) -> &str {
        "message"
    }
}
