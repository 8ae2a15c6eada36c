//! Capabilities the embedding UI runtime provides to automation steps.
//!
//! The engine never assumes anything about the host beyond these traits: a
//! form that can be read and written by field name, a notification sink, a few
//! UI primitives (links, clipboard, modal, overlays) and a parameter prompt.

pub mod console;
pub mod pointer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::content::ContentResult;
use crate::executor::CollectionError;
use crate::executor::parameter::ParameterField;
use pointer::Point;

pub use console::ConsoleHost;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("host capability unavailable: {0}")]
    Unavailable(String),
    #[error("host rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Loading,
}

/// Non-blocking user notifications (toasts).
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str, duration: Option<Duration>);
}

/// Handle on the form the triggering component lives in.
pub trait FormHandle: Send + Sync {
    fn get_value(&self, field: &str) -> Option<Value>;
    fn set_value(&self, field: &str, value: Value) -> Result<(), HostError>;
    /// Snapshot of every field value.
    fn values(&self) -> Map<String, Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum LinkTarget {
    #[default]
    #[serde(rename = "_blank")]
    Blank,
    #[serde(rename = "_self")]
    SelfTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModalKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Confirm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModalSpec {
    pub title: String,
    pub content: ContentResult,
    pub width: u32,
    pub kind: ModalKind,
    pub ok_text: String,
    pub cancel_text: String,
    pub show_cancel: bool,
    pub auto_close: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    /// Identity of the trigger invocation owning the overlay.
    pub identity: String,
    pub title: Option<String>,
    pub content: ContentResult,
    pub position: Point,
    pub width: u32,
    pub closable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// UI primitives used by the built-in actions.
pub trait UiHost: Send + Sync {
    fn open_link(&self, url: &str, target: LinkTarget) -> Result<(), HostError>;
    fn write_clipboard(&self, text: &str) -> Result<(), HostError>;
    fn show_modal(&self, modal: ModalSpec) -> Result<(), HostError>;
    fn show_overlay(&self, overlay: OverlaySpec) -> Result<OverlayId, HostError>;
    fn remove_overlay(&self, id: OverlayId);
    fn overlay_visible(&self, id: OverlayId) -> bool;
}

/// Suspends a chain until the user fills in (or dismisses) a parameter form.
#[async_trait]
pub trait ParameterPrompt: Send + Sync {
    async fn collect(
        &self,
        title: &str,
        fields: &[ParameterField],
    ) -> Result<Map<String, Value>, CollectionError>;
}

/// Bundle of host capabilities threaded through every execution context.
#[derive(Clone)]
pub struct HostServices {
    pub notifier: Arc<dyn Notifier>,
    pub ui: Arc<dyn UiHost>,
    pub prompt: Arc<dyn ParameterPrompt>,
    pub form: Option<Arc<dyn FormHandle>>,
}

impl HostServices {
    /// Every capability backed by one host object.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: Notifier + UiHost + ParameterPrompt + FormHandle + 'static,
    {
        Self {
            notifier: host.clone(),
            ui: host.clone(),
            prompt: host.clone(),
            form: Some(host),
        }
    }

    /// Logging-only host.
    pub fn console() -> Self {
        Self::from_host(Arc::new(ConsoleHost::default()))
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("form", &self.form.is_some())
            .finish_non_exhaustive()
    }
}
