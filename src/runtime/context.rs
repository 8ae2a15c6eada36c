use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json, json};

use crate::executor::ExecutorResult;
use crate::host::{FormHandle, HostServices};
use crate::remote::RemoteClient;

/// Record threaded through one trigger invocation.
///
/// Each step receives its own clone: `config` holds that step's parameters
/// and `executors` the results accumulated before it. Only the orchestrator
/// appends to `executors`.
#[derive(Clone)]
pub struct ExecutionContext {
    pub event: String,
    /// Payload of the UI event, as handed to `trigger`.
    pub trigger: Json,
    pub original_event: Json,
    pub timestamp: DateTime<Utc>,
    pub executors: Vec<ExecutorResult>,
    pub config: Json,
    pub trigger_id: Option<String>,
    pub step_index: Option<usize>,
    /// Additional host-supplied data, exposed under `$context`.
    pub extras: Map<String, Json>,
    pub host: HostServices,
    pub remote: Option<Arc<dyn RemoteClient>>,
}

impl ExecutionContext {
    pub fn new(event: impl Into<String>, payload: Json, host: HostServices) -> Self {
        Self {
            event: event.into(),
            original_event: payload.clone(),
            trigger: payload,
            timestamp: Utc::now(),
            executors: Vec::new(),
            config: Json::Object(Map::new()),
            trigger_id: None,
            step_index: None,
            extras: Map::new(),
            host,
            remote: None,
        }
    }

    pub fn with_trigger_id(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Json) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Per-step snapshot of this context.
    pub fn for_step(&self, index: usize, config: Json, executors: &[ExecutorResult]) -> Self {
        let mut ctx = self.clone();
        ctx.step_index = Some(index);
        ctx.config = if config.is_null() {
            Json::Object(Map::new())
        } else {
            config
        };
        ctx.executors = executors.to_vec();
        ctx
    }

    pub fn form(&self) -> Option<&Arc<dyn FormHandle>> {
        self.host.form.as_ref()
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Plain-data view handed to expressions and user snippets.
    pub fn data(&self) -> Json {
        let mut map = self.extras.clone();
        let executors = serde_json::to_value(&self.executors).unwrap_or_else(|_| json!([]));
        map.insert("event".into(), Json::String(self.event.clone()));
        map.insert("trigger".into(), self.trigger.clone());
        map.insert("originalEvent".into(), self.original_event.clone());
        map.insert(
            "timestamp".into(),
            Json::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("executors".into(), executors);
        map.insert("config".into(), self.config.clone());
        map.insert(
            "triggerId".into(),
            self.trigger_id.clone().map(Json::String).unwrap_or(Json::Null),
        );
        map.insert(
            "stepIndex".into(),
            self.step_index.map(|i| json!(i)).unwrap_or(Json::Null),
        );
        Json::Object(map)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("event", &self.event)
            .field("trigger_id", &self.trigger_id)
            .field("step_index", &self.step_index)
            .field("executors", &self.executors.len())
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}
