/*!
Executors: the data-producing steps of an automation chain.

Every executor returns the same [`ExecutorResult`] envelope so that later
steps can address any earlier result by index
(`{{$context.executors[0].data}}`). The orchestrator, not the registry,
decides what a failure means for the rest of the chain; the registry only
logs and passes errors along.

Built-in executors:
- `echo`: compiles its config and echoes the trigger payload
- `http`: proxied HTTP request through the remote data service
- `sql` / `workflow`: remote SQL query / workflow execution
- `data-query`: collection listing with filters, sorting and paging
- `script`: user-authored code over the trigger and prior results
- `parameter-builder`: asks the user for parameters (may be cancelled)
*/

pub mod data_query;
pub mod echo;
pub mod http;
pub mod parameter;
pub mod script;
pub mod sql;

use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, error};

use crate::registry::{Keyed, Registry};
use crate::remote::{RemoteClient, RemoteError};
use crate::runtime::ExecutionContext;

pub use data_query::DataQueryExecutor;
pub use echo::EchoExecutor;
pub use http::HttpExecutor;
pub use parameter::{ParameterBuilderExecutor, ParameterField};
pub use script::ScriptExecutor;
pub use sql::{SqlExecutor, WorkflowExecutor};

/// Outcome of a human-in-the-loop parameter prompt that did not produce values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionError {
    /// The user dismissed the prompt. Aborts the chain without any error report.
    #[error("parameter collection was cancelled")]
    Cancelled,
    #[error("parameter collection failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    Failed(String),
    #[error("executor \"{0}\" not found")]
    NotFound(String),
}

impl ExecutorError {
    /// Generic failure carrying a user-facing message.
    pub fn failed(message: impl Into<String>) -> Self {
        ExecutorError::Failed(message.into())
    }

    /// True when the user dismissed a parameter prompt. The orchestrator
    /// stops the chain quietly instead of reporting an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecutorError::Collection(CollectionError::Cancelled))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorKind {
    #[default]
    Data,
    /// Suspends the chain on user input; its failures abort the chain.
    ParameterCollection,
}

/// Uniform result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorResult {
    pub success: bool,
    #[serde(default)]
    pub data: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub executor_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Json>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

impl ExecutorResult {
    /// Successful result stamped with the current time.
    ///
    /// ```
    /// use serde_json::json;
    /// use uiflow::executor::ExecutorResult;
    ///
    /// let r = ExecutorResult::ok("echo", json!({"n": 1}));
    /// assert!(r.success && r.error.is_none());
    /// ```
    pub fn ok(key: impl Into<String>, data: Json) -> Self {
        Self {
            success: true,
            data,
            error: None,
            executed_at: Utc::now(),
            executor_key: key.into(),
            metadata: None,
            disabled: false,
        }
    }

    /// `success: false` with `data: null`.
    pub fn failure(key: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: Json::Null,
            error: Some(error.to_string()),
            executed_at: Utc::now(),
            executor_key: key.into(),
            metadata: None,
            disabled: false,
        }
    }

    /// Placeholder for a skipped step.
    pub fn disabled(key: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Json::Null,
            error: None,
            executed_at: Utc::now(),
            executor_key: key.into(),
            metadata: None,
            disabled: true,
        }
    }

    /// Attach executor-specific metadata (row counts, timings).
    pub fn with_metadata(mut self, metadata: Json) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_data(mut self, data: Json) -> Self {
        self.data = data;
        self
    }
}

/// A data-producing step.
#[async_trait]
pub trait ExecutorDefinition: Keyed {
    fn label(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Data
    }

    /// `ctx.config` holds this step's raw (uncompiled) parameters.
    async fn execute(&self, trigger: &Json, ctx: &ExecutionContext) -> Result<ExecutorResult, ExecutorError>;
}

/// Registry of executors keyed by [`Keyed::key`].
pub struct ExecutorRegistry {
    inner: Registry<dyn ExecutorDefinition>,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ExecutorRegistry {
    type Target = Registry<dyn ExecutorDefinition>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("executors"),
        }
    }

    /// Registry preloaded with every built-in executor.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register the built-in executors, replacing same-keyed entries.
    pub fn register_builtins(&self) {
        self.register(Arc::new(EchoExecutor));
        self.register(Arc::new(HttpExecutor));
        self.register(Arc::new(SqlExecutor));
        self.register(Arc::new(WorkflowExecutor));
        self.register(Arc::new(DataQueryExecutor));
        self.register(Arc::new(ScriptExecutor));
        self.register(Arc::new(ParameterBuilderExecutor));
    }

    /// Kind of executor `key`, `None` if it is not registered.
    pub fn kind_of(&self, key: &str) -> Option<ExecutorKind> {
        self.get(key).map(|e| e.kind())
    }

    /// Run executor `key`, attaching `remote` to the context it sees.
    pub async fn execute(
        &self,
        key: &str,
        trigger: &Json,
        ctx: &ExecutionContext,
        remote: Option<Arc<dyn RemoteClient>>,
    ) -> Result<ExecutorResult, ExecutorError> {
        let executor = self
            .get(key)
            .ok_or_else(|| ExecutorError::NotFound(key.to_string()))?;

        let mut ctx = ctx.clone();
        if remote.is_some() {
            ctx.remote = remote;
        }

        match executor.execute(trigger, &ctx).await {
            Ok(result) => {
                debug!(target: "uiflow::executors", %key, success = result.success, "Executor finished");
                Ok(result)
            }
            Err(e) => {
                if e.is_cancellation() {
                    debug!(target: "uiflow::executors", %key, "Executor cancelled by user");
                } else {
                    error!(target: "uiflow::executors", %key, error = %e, "Executor failed");
                }
                Err(e)
            }
        }
    }
}

/// Remote client attached to `ctx`.
///
/// Fails with [`RemoteError::Unavailable`] when the runtime runs offline.
pub(crate) fn require_remote(ctx: &ExecutionContext) -> Result<Arc<dyn RemoteClient>, ExecutorError> {
    ctx.remote.clone().ok_or(ExecutorError::Remote(RemoteError::Unavailable))
}

/// `ctx.config` with every `{{ }}` placeholder resolved against `ctx`.
/// Unresolvable placeholders stay verbatim.
pub(crate) fn compiled_config(ctx: &ExecutionContext) -> Json {
    crate::expression::compile_object(&ctx.config, ctx)
}
