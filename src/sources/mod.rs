/*!
Event sources: where trigger events come from when `uiflow` runs headless.

Each source decodes raw input into [`TriggerEvent`]s and pushes them through
a channel, respecting backpressure (`send().await`). Sources log and skip
malformed input and end quietly when the receiver goes away.

- `file.rs`         -> `FileSource`  (poll a single file)
- `stdin_source.rs` -> `StdinSource` (newline-delimited JSON from standard input)
*/

use serde::Deserialize;
use serde_json::Value;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, warn};

use crate::config::{RuntimeConfig, SourceConfig};
use crate::host::pointer::{Point, Rect, UiPointerState};

pub mod file;
pub mod stdin_source;

pub use file::FileSource;
pub use stdin_source::StdinSource;

/// A UI event fired on an automatable component instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    #[serde(alias = "component")]
    pub trigger_id: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    /// Pointer position at the time of the event.
    #[serde(default)]
    pub pointer: Option<PointerHint>,
    /// Bounds of the component that fired the event.
    #[serde(default)]
    pub bounds: Option<BoundsHint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PointerHint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundsHint {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl TriggerEvent {
    pub fn new(trigger_id: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            event: event.into(),
            payload,
            pointer: None,
            bounds: None,
        }
    }

    /// Feed the positional hints into the process-wide pointer state.
    pub fn record_position(&self) {
        if let Some(p) = self.pointer {
            UiPointerState::record_pointer(Point::new(p.x, p.y));
        }
        if let Some(b) = self.bounds {
            UiPointerState::record_focus(Rect::new(b.x, b.y, b.width, b.height));
        }
    }
}

/// Decode a chunk of input: a JSON object, a JSON array of objects, or
/// newline-delimited objects. Undecodable entries are logged and skipped.
pub fn decode_events(text: &str) -> Vec<TriggerEvent> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(decode_value).collect(),
        Ok(value) => decode_value(value).into_iter().collect(),
        Err(_) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|line| match serde_json::from_str::<Value>(line) {
                Ok(value) => decode_value(value),
                Err(e) => {
                    warn!(target: "uiflow::sources", error = %e, %line, "Skipping malformed JSON line");
                    None
                }
            })
            .collect(),
    }
}

fn decode_value(value: Value) -> Option<TriggerEvent> {
    match serde_json::from_value::<TriggerEvent>(value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(target: "uiflow::sources", error = %e, "Skipping value that is not a trigger event");
            None
        }
    }
}

/// Trait implemented by all event sources.
pub trait EventSource: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start the source in the background.
    fn start(&self, sender: Sender<TriggerEvent>) -> JoinHandle<()>;
}

/// Construct all configured sources, in configuration order.
pub fn build_sources_from_config(cfg: &RuntimeConfig) -> Vec<Box<dyn EventSource>> {
    cfg.sources
        .iter()
        .map(|sc| -> Box<dyn EventSource> {
            match sc {
                SourceConfig::File {
                    path,
                    poll_ms,
                    delete_on_success,
                } => Box::new(FileSource::new(path.clone(), *poll_ms, *delete_on_success)),
                SourceConfig::Stdin => Box::new(StdinSource::new()),
            }
        })
        .collect()
}

/// Spawn every source, returning their `JoinHandle`s.
pub fn spawn_all_sources(sources: &[Box<dyn EventSource>], sender: Sender<TriggerEvent>) -> Vec<JoinHandle<()>> {
    sources
        .iter()
        .map(|src| {
            info!(
                target: "uiflow::sources",
                source = %src.name(),
                "Starting source task"
            );
            src.start(sender.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_single_array_and_lines() {
        let one = decode_events(r#"{"triggerId": "btn", "event": "onClick", "payload": {"a": 1}}"#);
        assert_eq!(one, vec![TriggerEvent::new("btn", "onClick", json!({"a": 1}))]);

        let many = decode_events(
            r#"[{"component": "a", "event": "onClick"}, {"nope": true}, {"triggerId": "b", "event": "onChange"}]"#,
        );
        assert_eq!(many.len(), 2);
        assert_eq!(many[0].trigger_id, "a");
        assert_eq!(many[0].payload, Value::Null);

        let lines = decode_events(
            "{\"triggerId\": \"a\", \"event\": \"onClick\"}\nnot json\n\n{\"triggerId\": \"b\", \"event\": \"onClick\"}\n",
        );
        assert_eq!(lines.len(), 2);
        assert!(decode_events("   ").is_empty());
    }

    #[test]
    fn test_position_hints() {
        let events = decode_events(
            r#"{"triggerId": "t", "event": "onClick", "pointer": {"x": 3, "y": 4}, "bounds": {"x": 1, "y": 2, "width": 30, "height": 10}}"#,
        );
        assert_eq!(events[0].pointer, Some(PointerHint { x: 3.0, y: 4.0 }));
        assert_eq!(events[0].bounds.map(|b| b.width), Some(30.0));
    }

    #[test]
    fn test_build_sources() {
        let cfg: RuntimeConfig = serde_json::from_value(json!({
            "sources": [{"type": "stdin"}, {"type": "file", "path": "events.json"}]
        }))
        .unwrap();
        let names: Vec<_> = build_sources_from_config(&cfg).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["stdin", "file"]);
    }
}
