/*!
Actions: the side-effecting steps that run after every executor.

An action sees the trigger payload and the accumulated executor results
through its [`ExecutionContext`], returns nothing on success and may fail.
The orchestrator reports a failed action to the user and keeps going with
the next one.

Built-in actions:
- `console`: log a message with optional details
- `message`: toast notification with rendered content
- `open-link`: open a rendered URL through the host
- `clipboard-write`: copy text to the host clipboard
- `form-value-setter`: write compiled values into form fields
- `modal`: modal dialog with rendered content
- `popover`: anchored overlay, at most one visible at a time
*/

pub mod clipboard;
pub mod console;
pub mod form_value;
pub mod message;
pub mod modal;
pub mod open_link;
pub mod popover;

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, error};

use crate::host::HostError;
use crate::registry::{Keyed, Registry};
use crate::runtime::ExecutionContext;

pub use clipboard::ClipboardWriteAction;
pub use console::ConsoleAction;
pub use form_value::FormValueSetterAction;
pub use message::MessageAction;
pub use modal::ModalAction;
pub use open_link::OpenLinkAction;
pub use popover::PopoverAction;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("action \"{0}\" not found")]
    NotFound(String),
    #[error("invalid configuration for action \"{key}\": {message}")]
    InvalidConfig { key: String, message: String },
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

/// A side-effecting step.
#[async_trait]
pub trait ActionDefinition: Keyed {
    fn label(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// `ctx.config` holds this step's raw (uncompiled) parameters.
    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError>;
}

/// Registry of actions keyed by [`Keyed::key`].
pub struct ActionRegistry {
    inner: Registry<dyn ActionDefinition>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ActionRegistry {
    type Target = Registry<dyn ActionDefinition>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("actions"),
        }
    }

    /// Registry preloaded with every built-in action.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    pub fn register_builtins(&self) {
        self.register(Arc::new(ConsoleAction));
        self.register(Arc::new(MessageAction));
        self.register(Arc::new(OpenLinkAction));
        self.register(Arc::new(ClipboardWriteAction));
        self.register(Arc::new(FormValueSetterAction));
        self.register(Arc::new(ModalAction));
        self.register(Arc::new(PopoverAction::new()));
    }

    pub async fn execute(&self, key: &str, trigger: &Json, ctx: &ExecutionContext) -> Result<(), ActionError> {
        let action = self
            .get(key)
            .ok_or_else(|| ActionError::NotFound(key.to_string()))?;
        match action.execute(trigger, ctx).await {
            Ok(()) => {
                debug!(target: "uiflow::actions", %key, "Action finished");
                Ok(())
            }
            Err(e) => {
                error!(target: "uiflow::actions", %key, error = %e, "Action failed");
                Err(e)
            }
        }
    }
}

/// Compile `ctx.config` and deserialize it into the action's config type.
pub(crate) fn compiled_config<T: DeserializeOwned>(key: &str, ctx: &ExecutionContext) -> Result<T, ActionError> {
    let compiled = crate::expression::compile_object(&ctx.config, ctx);
    parse(key, compiled)
}

/// Deserialize `ctx.config` as authored. Used by actions whose text goes
/// through [`crate::content::render`], which compiles it exactly once.
pub(crate) fn raw_config<T: DeserializeOwned>(key: &str, ctx: &ExecutionContext) -> Result<T, ActionError> {
    parse(key, ctx.config.clone())
}

fn parse<T: DeserializeOwned>(key: &str, value: Json) -> Result<T, ActionError> {
    serde_json::from_value(value).map_err(|e| ActionError::InvalidConfig {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let registry = ActionRegistry::with_builtins();
        for key in [
            "console",
            "message",
            "open-link",
            "clipboard-write",
            "form-value-setter",
            "modal",
            "popover",
        ] {
            assert!(registry.has(key), "{key}");
        }
        assert_eq!(registry.len(), 7);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let registry = ActionRegistry::new();
        let ctx = test_context("onClick", json!({}));
        let err = registry.execute("nope", &json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound(k) if k == "nope"));
    }

    #[tokio::test]
    async fn test_bad_config_is_reported() {
        let registry = ActionRegistry::with_builtins();
        let mut ctx = test_context("onClick", json!({}));
        ctx.config = json!({"fieldMappings": "not a list"});
        let err = registry
            .execute("form-value-setter", &json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig { .. }));
    }
}
