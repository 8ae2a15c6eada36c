//! Recording test doubles for the host and remote boundaries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::executor::{CollectionError, ParameterField};
use crate::host::{
    FormHandle, HostError, HostServices, LinkTarget, ModalSpec, NoticeLevel, Notifier, OverlayId,
    OverlaySpec, ParameterPrompt, UiHost,
};
use crate::remote::{RemoteClient, RemoteError, RemoteRequest};
use crate::runtime::ExecutionContext;

/// Context backed by a fresh [`RecordingHost`] and no remote client.
pub fn test_context(event: &str, payload: Value) -> ExecutionContext {
    test_context_with(Arc::new(RecordingHost::default()), event, payload)
}

pub fn test_context_with(host: Arc<RecordingHost>, event: &str, payload: Value) -> ExecutionContext {
    ExecutionContext::new(event, payload, HostServices::from_host(host))
}

#[derive(Default)]
enum PromptReply {
    #[default]
    Empty,
    Answer(Map<String, Value>),
    Cancel,
}

/// Host that records every effect.
#[derive(Default)]
pub struct RecordingHost {
    notices: Mutex<Vec<(NoticeLevel, String, Option<Duration>)>>,
    form: Mutex<Map<String, Value>>,
    links: Mutex<Vec<(String, LinkTarget)>>,
    clipboard: Mutex<Vec<String>>,
    modals: Mutex<Vec<ModalSpec>>,
    overlays: Mutex<Vec<(OverlayId, OverlaySpec)>>,
    visible: Mutex<Vec<OverlayId>>,
    prompts: Mutex<Vec<(String, usize)>>,
    reply: PromptReply,
}

impl RecordingHost {
    /// Answer every prompt with `values` (an object).
    pub fn answering(mut self, values: Value) -> Self {
        self.reply = PromptReply::Answer(values.as_object().cloned().unwrap_or_default());
        self
    }

    /// Dismiss every prompt.
    pub fn cancelling(mut self) -> Self {
        self.reply = PromptReply::Cancel;
        self
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String, Option<Duration>)> {
        self.notices.lock().clone()
    }

    pub fn form_values(&self) -> Map<String, Value> {
        self.form.lock().clone()
    }

    pub fn links(&self) -> Vec<(String, LinkTarget)> {
        self.links.lock().clone()
    }

    pub fn clipboard(&self) -> Vec<String> {
        self.clipboard.lock().clone()
    }

    pub fn modals(&self) -> Vec<ModalSpec> {
        self.modals.lock().clone()
    }

    /// Every overlay ever shown, visible or not.
    pub fn overlays(&self) -> Vec<OverlaySpec> {
        self.overlays.lock().iter().map(|(_, spec)| spec.clone()).collect()
    }

    pub fn visible_overlays(&self) -> usize {
        self.visible.lock().len()
    }

    /// `(title, field count)` of every prompt.
    pub fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().clone()
    }
}

impl Notifier for RecordingHost {
    fn notify(&self, level: NoticeLevel, message: &str, duration: Option<Duration>) {
        self.notices.lock().push((level, message.to_string(), duration));
    }
}

impl FormHandle for RecordingHost {
    fn get_value(&self, field: &str) -> Option<Value> {
        self.form.lock().get(field).cloned()
    }

    fn set_value(&self, field: &str, value: Value) -> Result<(), HostError> {
        self.form.lock().insert(field.to_string(), value);
        Ok(())
    }

    fn values(&self) -> Map<String, Value> {
        self.form_values()
    }
}

impl UiHost for RecordingHost {
    fn open_link(&self, url: &str, target: LinkTarget) -> Result<(), HostError> {
        self.links.lock().push((url.to_string(), target));
        Ok(())
    }

    fn write_clipboard(&self, text: &str) -> Result<(), HostError> {
        self.clipboard.lock().push(text.to_string());
        Ok(())
    }

    fn show_modal(&self, modal: ModalSpec) -> Result<(), HostError> {
        self.modals.lock().push(modal);
        Ok(())
    }

    fn show_overlay(&self, overlay: OverlaySpec) -> Result<OverlayId, HostError> {
        let mut overlays = self.overlays.lock();
        let id = OverlayId(overlays.len() as u64 + 1);
        overlays.push((id, overlay));
        self.visible.lock().push(id);
        Ok(id)
    }

    fn remove_overlay(&self, id: OverlayId) {
        self.visible.lock().retain(|v| *v != id);
    }

    fn overlay_visible(&self, id: OverlayId) -> bool {
        self.visible.lock().contains(&id)
    }
}

#[async_trait]
impl ParameterPrompt for RecordingHost {
    async fn collect(&self, title: &str, fields: &[ParameterField]) -> Result<Map<String, Value>, CollectionError> {
        self.prompts.lock().push((title.to_string(), fields.len()));
        match &self.reply {
            PromptReply::Empty => Ok(Map::new()),
            PromptReply::Answer(values) => Ok(values.clone()),
            PromptReply::Cancel => Err(CollectionError::Cancelled),
        }
    }
}

/// Remote client that records requests and replies with a fixed result.
pub struct RecordingRemote {
    reply: Result<Value, RemoteError>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl RecordingRemote {
    pub fn replying(value: Value) -> Self {
        Self {
            reply: Ok(value),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: RemoteError) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RemoteClient for RecordingRemote {
    async fn fetch(&self, request: RemoteRequest) -> Result<Value, RemoteError> {
        self.requests.lock().push(request);
        self.reply.clone()
    }
}
