use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, info};

use super::{ActionDefinition, ActionError, raw_config};
use crate::content::{ContentConfig, render};
use crate::host::LinkTarget;
use crate::registry::Keyed;
use crate::runtime::ExecutionContext;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OpenLinkConfig {
    link: String,
    target: LinkTarget,
}

pub struct OpenLinkAction;

#[async_trait]
impl ActionDefinition for OpenLinkAction {
    fn label(&self) -> &str {
        "Open Link"
    }

    fn description(&self) -> Option<&str> {
        Some("Open the configured link")
    }

    async fn execute(&self, _trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let config: OpenLinkConfig = raw_config(self.key(), ctx)?;
        let url = render(&ContentConfig::text(config.link), ctx).content;
        let url = url.trim();
        if url.is_empty() {
            debug!(target: "uiflow::actions", action = "open-link", "Link is empty, nothing to open");
            return Ok(());
        }
        info!(target: "uiflow::actions", action = "open-link", %url, target = ?config.target, "Opening link");
        ctx.host.ui.open_link(url, config.target)?;
        Ok(())
    }
}

impl Keyed for OpenLinkAction {
    fn key(&self) -> &str {
        "open-link"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingHost, test_context_with};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_opens_compiled_link() {
        let host = Arc::new(RecordingHost::default());
        let mut ctx = test_context_with(host.clone(), "onClick", json!({"id": 12}));
        ctx.config = json!({"link": "https://example.com/orders/{{$context.trigger.id}}", "target": "_self"});
        OpenLinkAction.execute(&json!({}), &ctx).await.unwrap();
        assert_eq!(
            host.links(),
            vec![("https://example.com/orders/12".to_string(), LinkTarget::SelfTarget)]
        );
    }

    #[tokio::test]
    async fn test_empty_link_is_a_no_op() {
        let host = Arc::new(RecordingHost::default());
        let ctx = test_context_with(host.clone(), "onClick", json!({}));
        OpenLinkAction.execute(&json!({}), &ctx).await.unwrap();
        assert!(host.links().is_empty());
    }
}
