use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_valid::Validate;
use std::collections::BTreeMap;

/// One configured executor or action.
///
/// `params` is stored as authored: placeholders are resolved per step, at
/// trigger time, against that invocation's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct StepConfig {
    /// Registry key of the executor or action.
    #[validate(min_length = 1)]
    pub key: String,

    /// Step parameters, handed to the step as `context.config`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,

    /// Disabled executors still occupy their slot in the results array.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StepConfig {
    pub fn new(key: impl Into<String>, params: Value) -> Self {
        Self {
            key: key.into(),
            params,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Executors and actions bound to one event of a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct EventConfig {
    #[serde(default)]
    #[validate]
    pub executors: Vec<StepConfig>,
    #[serde(default)]
    #[validate]
    pub actions: Vec<StepConfig>,
}

/// Event key (e.g. `onClick`) -> chain, for one automatable component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    #[serde(default)]
    pub event_configs: BTreeMap<String, EventConfig>,
}

impl AutomationConfig {
    pub fn event(&self, event: &str) -> Option<&EventConfig> {
        self.event_configs.get(event)
    }
}

/// Root configuration of the `uiflow` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Where trigger events come from.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Automatable component instances, keyed by trigger id.
    #[serde(default)]
    pub components: BTreeMap<String, ComponentConfig>,

    /// Remote data service used by the http/sql/workflow/data-query executors.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Quiet period for `onChange` events, in milliseconds (default: 300).
    #[serde(default)]
    pub debounce_ms: Option<u64>,

    /// Initial values of the headless host's form.
    #[serde(default)]
    pub form: BTreeMap<String, Value>,
}

/// An automatable component instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    /// Trigger component type (e.g. `GeneralActionComponent`, `Automation_Trigger_Select`).
    #[serde(default)]
    pub component: Option<String>,

    #[serde(default)]
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Base URL of the host application API, e.g. `http://localhost:13000/api/`.
    pub base_url: String,
    /// Retries on transport errors (default: 2).
    #[serde(default)]
    pub retries: Option<u32>,
}

/// Event source configuration.
/// Use `type` to select a variant:
/// - "file": poll a single file for newline-delimited trigger events
/// - "stdin": read newline-delimited trigger events from standard input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    File {
        /// Absolute or relative path to the file.
        path: String,
        /// Poll interval in milliseconds (default: 100).
        #[serde(default)]
        poll_ms: Option<u64>,
        /// Delete the file after a successful read (default: false).
        #[serde(default)]
        delete_on_success: Option<bool>,
    },

    Stdin,
}

/// Logging level enumeration.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
