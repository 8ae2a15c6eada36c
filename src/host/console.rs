use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info, trace, warn};

use super::{
    FormHandle, HostError, LinkTarget, ModalSpec, NoticeLevel, Notifier, OverlayId, OverlaySpec,
    ParameterPrompt, UiHost,
};
use crate::executor::CollectionError;
use crate::executor::parameter::ParameterField;

/// Headless host: every UI effect is logged instead of displayed.
///
/// The form is an in-memory map. The parameter prompt answers with each
/// field's default value, and cancels when a required field has none.
#[derive(Default)]
pub struct ConsoleHost {
    form: Mutex<Map<String, Value>>,
    overlays: Mutex<HashSet<OverlayId>>,
    next_overlay: Mutex<u64>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the in-memory form.
    pub fn with_form_values(values: Map<String, Value>) -> Self {
        Self {
            form: Mutex::new(values),
            ..Self::default()
        }
    }
}

impl Notifier for ConsoleHost {
    fn notify(&self, level: NoticeLevel, message: &str, duration: Option<Duration>) {
        let duration_ms = duration.map(|d| d.as_millis() as u64);
        match level {
            NoticeLevel::Error => error!(target: "uiflow::host", ?duration_ms, "{message}"),
            NoticeLevel::Warning => warn!(target: "uiflow::host", ?duration_ms, "{message}"),
            NoticeLevel::Loading => debug!(target: "uiflow::host", ?duration_ms, "(loading) {message}"),
            NoticeLevel::Info | NoticeLevel::Success => {
                info!(target: "uiflow::host", ?level, ?duration_ms, "{message}")
            }
        }
    }
}

impl FormHandle for ConsoleHost {
    fn get_value(&self, field: &str) -> Option<Value> {
        self.form.lock().get(field).cloned()
    }

    fn set_value(&self, field: &str, value: Value) -> Result<(), HostError> {
        info!(target: "uiflow::host", %field, %value, "Form value set");
        self.form.lock().insert(field.to_string(), value);
        Ok(())
    }

    fn values(&self) -> Map<String, Value> {
        self.form.lock().clone()
    }
}

impl UiHost for ConsoleHost {
    fn open_link(&self, url: &str, target: LinkTarget) -> Result<(), HostError> {
        info!(target: "uiflow::host", %url, ?target, "Open link");
        Ok(())
    }

    fn write_clipboard(&self, text: &str) -> Result<(), HostError> {
        info!(target: "uiflow::host", chars = text.chars().count(), "Clipboard write");
        trace!(target: "uiflow::host", %text, "Clipboard content");
        Ok(())
    }

    fn show_modal(&self, modal: ModalSpec) -> Result<(), HostError> {
        info!(
            target: "uiflow::host",
            title = %modal.title,
            kind = ?modal.kind,
            width = modal.width,
            auto_close_ms = ?modal.auto_close.map(|d| d.as_millis() as u64),
            "Modal: {}",
            modal.content.content
        );
        Ok(())
    }

    fn show_overlay(&self, overlay: OverlaySpec) -> Result<OverlayId, HostError> {
        let id = {
            let mut next = self.next_overlay.lock();
            *next += 1;
            OverlayId(*next)
        };
        self.overlays.lock().insert(id);
        info!(
            target: "uiflow::host",
            %id,
            identity = %overlay.identity,
            x = overlay.position.x,
            y = overlay.position.y,
            "Overlay: {}",
            overlay.content.content
        );
        Ok(id)
    }

    fn remove_overlay(&self, id: OverlayId) {
        if self.overlays.lock().remove(&id) {
            debug!(target: "uiflow::host", %id, "Overlay removed");
        }
    }

    fn overlay_visible(&self, id: OverlayId) -> bool {
        self.overlays.lock().contains(&id)
    }
}

#[async_trait]
impl ParameterPrompt for ConsoleHost {
    async fn collect(
        &self,
        title: &str,
        fields: &[ParameterField],
    ) -> Result<Map<String, Value>, CollectionError> {
        info!(target: "uiflow::host", %title, fields = fields.len(), "Parameter prompt");
        let mut values = Map::new();
        for field in fields {
            match &field.default_value {
                Some(v) if !v.is_null() => {
                    values.insert(field.key.clone(), v.clone());
                }
                _ if field.required => {
                    warn!(
                        target: "uiflow::host",
                        field = %field.key,
                        "Required parameter has no default; cancelling prompt"
                    );
                    return Err(CollectionError::Cancelled);
                }
                _ => {}
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentResult;
    use crate::host::pointer::Point;
    use serde_json::json;

    fn field(key: &str, required: bool, default: Option<Value>) -> ParameterField {
        ParameterField {
            key: key.into(),
            label: key.into(),
            field_type: "input".into(),
            required,
            options: Vec::new(),
            placeholder: None,
            default_value: default,
        }
    }

    #[test]
    fn test_form_roundtrip() {
        let host = ConsoleHost::new();
        host.set_value("name", json!("Ada")).unwrap();
        assert_eq!(host.get_value("name"), Some(json!("Ada")));
        assert_eq!(host.values().len(), 1);
        assert!(host.get_value("missing").is_none());
    }

    #[test]
    fn test_overlay_lifecycle() {
        let host = ConsoleHost::new();
        let id = host
            .show_overlay(OverlaySpec {
                identity: "t#onClick".into(),
                title: None,
                content: ContentResult::text("hello"),
                position: Point::new(1.0, 2.0),
                width: 300,
                closable: true,
            })
            .unwrap();
        assert!(host.overlay_visible(id));
        host.remove_overlay(id);
        assert!(!host.overlay_visible(id));
    }

    #[tokio::test]
    async fn test_prompt_uses_defaults() {
        let host = ConsoleHost::new();
        let out = host
            .collect("t", &[field("a", true, Some(json!(1))), field("b", false, None)])
            .await
            .unwrap();
        assert_eq!(Value::Object(out), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_prompt_cancels_without_required_default() {
        let host = ConsoleHost::new();
        let err = host.collect("t", &[field("a", true, None)]).await.unwrap_err();
        assert_eq!(err, CollectionError::Cancelled);
    }
}
