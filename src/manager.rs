//! Facade owning every registry, for plugins that register their own
//! executors, actions and trigger components.

use std::sync::Arc;

use serde::Serialize;

use crate::action::ActionRegistry;
use crate::executor::ExecutorRegistry;
use crate::host::HostServices;
use crate::registry::{Keyed, Registry};
use crate::runtime::Runtime;
use crate::trigger::{EventRegistry, TriggerRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub total: usize,
    pub keys: Vec<String>,
}

impl RegistryStatus {
    fn of<T: Keyed + ?Sized>(registry: &Registry<T>) -> Self {
        let mut keys = registry.keys();
        keys.sort();
        Self {
            total: keys.len(),
            keys,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub triggers: RegistryStatus,
    pub executors: RegistryStatus,
    pub actions: RegistryStatus,
}

pub struct AutomationManager {
    triggers: Arc<TriggerRegistry>,
    events: Arc<EventRegistry>,
    executors: Arc<ExecutorRegistry>,
    actions: Arc<ActionRegistry>,
}

impl Default for AutomationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationManager {
    /// Manager with every built-in registered.
    pub fn new() -> Self {
        Self {
            triggers: Arc::new(TriggerRegistry::with_builtins()),
            events: Arc::new(EventRegistry::with_builtins()),
            executors: Arc::new(ExecutorRegistry::with_builtins()),
            actions: Arc::new(ActionRegistry::with_builtins()),
        }
    }

    /// Manager with empty registries.
    pub fn empty() -> Self {
        Self {
            triggers: Arc::new(TriggerRegistry::new()),
            events: Arc::new(EventRegistry::new()),
            executors: Arc::new(ExecutorRegistry::new()),
            actions: Arc::new(ActionRegistry::new()),
        }
    }

    pub fn triggers(&self) -> &Arc<TriggerRegistry> {
        &self.triggers
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Runtime sharing this manager's registries.
    pub fn runtime(&self, host: HostServices) -> Runtime {
        Runtime::new(self.executors.clone(), self.actions.clone(), host)
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            triggers: RegistryStatus::of(&self.triggers),
            executors: RegistryStatus::of(&self.executors),
            actions: RegistryStatus::of(&self.actions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;
    use serde_json::json;

    #[test]
    fn test_status_counts_builtins() {
        let manager = AutomationManager::new();
        let status = manager.status();
        assert_eq!(status.triggers.total, 4);
        assert_eq!(status.executors.total, 7);
        assert_eq!(status.actions.total, 7);
        assert!(status.executors.keys.contains(&"parameter-builder".to_string()));

        let empty = AutomationManager::empty().status();
        assert_eq!(empty.actions, RegistryStatus { total: 0, keys: vec![] });
    }

    #[tokio::test]
    async fn test_runtime_sees_late_registrations() {
        let manager = AutomationManager::empty();
        let host = Arc::new(RecordingHost::default());
        let runtime = manager.runtime(HostServices::from_host(host.clone()));
        manager.actions().register(Arc::new(crate::action::MessageAction));

        let ctx = crate::testing::test_context_with(host.clone(), "onClick", json!({}));
        let config = crate::config::EventConfig {
            executors: vec![],
            actions: vec![crate::config::StepConfig::new("message", json!({"content": "hi"}))],
        };
        runtime.run(&config, ctx).await.unwrap();
        assert_eq!(host.notices()[0].1, "hi");
    }
}
