use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::context::ExecutionContext;
use super::guard::TriggerGuard;
use crate::action::ActionRegistry;
use crate::config::{AutomationConfig, EventConfig};
use crate::executor::{ExecutorKind, ExecutorRegistry, ExecutorResult};
use crate::host::{HostServices, NoticeLevel};
use crate::remote::RemoteClient;

#[derive(Debug, Error)]
pub enum AutomationError {
    /// A step panicked. The invocation is abandoned.
    #[error("automation panicked: {0}")]
    Panicked(String),
    #[error("trigger \"{0}\" is already running")]
    Busy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub key: String,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    fn new(key: &str, status: ActionStatus, error: Option<String>) -> Self {
        Self {
            key: key.to_string(),
            status,
            error,
        }
    }
}

/// Everything one completed invocation produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub event: String,
    pub trigger_id: Option<String>,
    /// One entry per configured executor, in configured order.
    pub executors: Vec<ExecutorResult>,
    pub actions: Vec<ActionOutcome>,
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// No chain is configured for the event.
    NotConfigured,
    Completed(ExecutionReport),
    /// The user dismissed a parameter prompt at executor `step`.
    Cancelled { step: usize },
    /// A parameter-collection executor failed at `step`.
    Aborted { step: usize, error: String },
}

impl TriggerOutcome {
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            TriggerOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Runs configured automation chains against the executor and action
/// registries.
///
/// Chains are looked up by trigger id (the component instance) and event key.
/// Bindings can be replaced at any time; an invocation keeps the chain it
/// started with.
pub struct Runtime {
    executors: Arc<ExecutorRegistry>,
    actions: Arc<ActionRegistry>,
    host: HostServices,
    remote: Option<Arc<dyn RemoteClient>>,
    bindings: RwLock<BTreeMap<String, AutomationConfig>>,
}

impl Runtime {
    pub fn new(executors: Arc<ExecutorRegistry>, actions: Arc<ActionRegistry>, host: HostServices) -> Self {
        Self {
            executors,
            actions,
            host,
            remote: None,
            bindings: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    /// Bind `config` to `trigger_id`, replacing any previous binding.
    pub fn bind(&self, trigger_id: impl Into<String>, config: AutomationConfig) {
        self.bindings.write().insert(trigger_id.into(), config);
    }

    /// Replace every binding at once.
    pub fn replace_bindings(&self, bindings: BTreeMap<String, AutomationConfig>) {
        info!(target: "uiflow::runtime", components = bindings.len(), "Bindings replaced");
        *self.bindings.write() = bindings;
    }

    pub fn bound_triggers(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }

    fn event_config(&self, trigger_id: &str, event: &str) -> Option<EventConfig> {
        self.bindings
            .read()
            .get(trigger_id)
            .and_then(|c| c.event(event))
            .cloned()
    }

    /// Fire `event` on the component bound as `trigger_id`.
    pub async fn trigger(&self, trigger_id: &str, event: &str, payload: Json) -> Result<TriggerOutcome, AutomationError> {
        let Some(config) = self.event_config(trigger_id, event) else {
            debug!(target: "uiflow::runtime", %trigger_id, %event, "No automation configured");
            return Ok(TriggerOutcome::NotConfigured);
        };
        let mut ctx = ExecutionContext::new(event, payload, self.host.clone()).with_trigger_id(trigger_id);
        ctx.remote = self.remote.clone();
        self.run(&config, ctx).await
    }

    /// [`Runtime::trigger`] unless `guard` shows the call site still busy.
    pub async fn trigger_guarded(
        &self,
        guard: &TriggerGuard,
        trigger_id: &str,
        event: &str,
        payload: Json,
    ) -> Result<TriggerOutcome, AutomationError> {
        let Some(_token) = guard.try_acquire() else {
            debug!(target: "uiflow::runtime", %trigger_id, %event, "Trigger busy, ignoring");
            return Err(AutomationError::Busy(trigger_id.to_string()));
        };
        self.trigger(trigger_id, event, payload).await
    }

    /// Run one event chain from a caller-built base context.
    pub async fn run(&self, config: &EventConfig, base: ExecutionContext) -> Result<TriggerOutcome, AutomationError> {
        let event = base.event.clone();
        match AssertUnwindSafe(self.run_chain(config, base)).catch_unwind().await {
            Ok(outcome) => Ok(outcome),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(target: "uiflow::runtime", %event, %message, "Automation panicked");
                self.host
                    .notifier
                    .notify(NoticeLevel::Error, &format!("Automation failed: {message}"), None);
                Err(AutomationError::Panicked(message))
            }
        }
    }

    async fn run_chain(&self, config: &EventConfig, base: ExecutionContext) -> TriggerOutcome {
        info!(
            target: "uiflow::runtime",
            event = %base.event,
            trigger_id = ?base.trigger_id,
            executors = config.executors.len(),
            actions = config.actions.len(),
            "Starting automation"
        );

        let mut results: Vec<ExecutorResult> = Vec::with_capacity(config.executors.len());
        for (index, step) in config.executors.iter().enumerate() {
            if !step.enabled {
                trace!(target: "uiflow::runtime", step_index = index, key = %step.key, "Executor disabled");
                results.push(ExecutorResult::disabled(&step.key));
                continue;
            }
            let ctx = base.for_step(index, step.params.clone(), &results);
            let kind = self.executors.kind_of(&step.key).unwrap_or_default();
            match self
                .executors
                .execute(&step.key, &base.trigger, &ctx, self.remote.clone())
                .await
            {
                Ok(result) => results.push(result),
                Err(e) if e.is_cancellation() => {
                    info!(target: "uiflow::runtime", step_index = index, key = %step.key, "Cancelled by user");
                    return TriggerOutcome::Cancelled { step: index };
                }
                Err(e) if kind == ExecutorKind::ParameterCollection => {
                    let error = e.to_string();
                    warn!(target: "uiflow::runtime", step_index = index, key = %step.key, %error, "Parameter collection failed");
                    self.host.notifier.notify(NoticeLevel::Error, &error, None);
                    return TriggerOutcome::Aborted { step: index, error };
                }
                Err(e) => {
                    warn!(target: "uiflow::runtime", step_index = index, key = %step.key, error = %e, "Executor failed, continuing");
                    results.push(ExecutorResult::failure(&step.key, &e));
                }
            }
        }

        let mut outcomes = Vec::with_capacity(config.actions.len());
        for (index, step) in config.actions.iter().enumerate() {
            if !step.enabled {
                outcomes.push(ActionOutcome::new(&step.key, ActionStatus::Skipped, None));
                continue;
            }
            let ctx = base.for_step(index, step.params.clone(), &results);
            match self.actions.execute(&step.key, &base.trigger, &ctx).await {
                Ok(()) => outcomes.push(ActionOutcome::new(&step.key, ActionStatus::Completed, None)),
                Err(e) => {
                    self.host.notifier.notify(
                        NoticeLevel::Error,
                        &format!("Action \"{}\" failed: {e}", step.key),
                        None,
                    );
                    outcomes.push(ActionOutcome::new(&step.key, ActionStatus::Failed, Some(e.to_string())));
                }
            }
        }

        info!(target: "uiflow::runtime", event = %base.event, "Automation completed");
        TriggerOutcome::Completed(ExecutionReport {
            event: base.event.clone(),
            trigger_id: base.trigger_id.clone(),
            executors: results,
            actions: outcomes,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
