//! Automatable UI components and the events they can fire.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::{Keyed, Registry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventDefinition {
    pub fn new(key: &str, label: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            description: Some(description.to_string()),
        }
    }
}

/// A component type that can carry an automation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerComponent {
    pub key: String,
    pub display_name: String,
    pub events: Vec<EventDefinition>,
}

impl TriggerComponent {
    pub fn new(key: &str, display_name: &str, events: Vec<EventDefinition>) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            events,
        }
    }

    pub fn supports(&self, event: &str) -> bool {
        self.events.iter().any(|e| e.key == event)
    }
}

impl Keyed for TriggerComponent {
    fn key(&self) -> &str {
        &self.key
    }
}

fn on_click() -> EventDefinition {
    EventDefinition::new("onClick", "On click", "Fired when the button is clicked")
}

/// Built-in automatable components.
pub fn builtin_components() -> Vec<TriggerComponent> {
    vec![
        TriggerComponent::new("GeneralActionComponent", "Automation button", vec![on_click()]),
        TriggerComponent::new(
            "TableOpActionComponent",
            "Table row button",
            vec![
                on_click(),
                EventDefinition::new(
                    "onMouseEnter",
                    "On hover",
                    "Fired when the pointer enters the button",
                ),
            ],
        ),
        TriggerComponent::new(
            "Automation_Trigger_Text",
            "Automation text input",
            vec![EventDefinition::new(
                "onChange",
                "On change",
                "Fired when the input value changes",
            )],
        ),
        TriggerComponent::new(
            "Automation_Trigger_Select",
            "Automation select",
            vec![EventDefinition::new(
                "onChange",
                "On change",
                "Fired when the selected option changes",
            )],
        ),
    ]
}

/// Registry of trigger components keyed by component name.
pub struct TriggerRegistry {
    inner: Registry<TriggerComponent>,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TriggerRegistry {
    type Target = Registry<TriggerComponent>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("triggers"),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for component in builtin_components() {
            registry.register(Arc::new(component));
        }
        registry
    }
}

/// Component name -> supported events, for components that register their
/// events without a full [`TriggerComponent`].
#[derive(Debug, Default)]
pub struct EventRegistry {
    events: RwLock<BTreeMap<String, Vec<EventDefinition>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event table of every built-in component.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for component in builtin_components() {
            registry.register(&component.key, component.events);
        }
        registry
    }

    pub fn register(&self, component: &str, events: Vec<EventDefinition>) {
        debug!(target: "uiflow::triggers", %component, events = events.len(), "Registering component events");
        self.events.write().insert(component.to_string(), events);
    }

    /// Events of `component`; empty when it is not automatable.
    pub fn events(&self, component: &str) -> Vec<EventDefinition> {
        self.events.read().get(component).cloned().unwrap_or_default()
    }

    pub fn has_events(&self, component: &str) -> bool {
        self.events.read().get(component).is_some_and(|e| !e.is_empty())
    }

    pub fn components(&self) -> Vec<String> {
        self.events.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_triggers() {
        let registry = TriggerRegistry::with_builtins();
        assert_eq!(registry.len(), 4);
        let table = registry.get("TableOpActionComponent").unwrap();
        assert!(table.supports("onMouseEnter"));
        assert!(!table.supports("onChange"));
        assert!(registry.get("Automation_Trigger_Text").unwrap().supports("onChange"));
    }

    #[test]
    fn test_event_registry() {
        let events = EventRegistry::with_builtins();
        assert!(events.has_events("GeneralActionComponent"));
        assert_eq!(events.events("Automation_Trigger_Select")[0].key, "onChange");
        assert!(events.events("Unknown").is_empty());

        events.register("Custom", vec![]);
        assert!(!events.has_events("Custom"));
        assert!(events.components().contains(&"Custom".to_string()));

        events.clear();
        assert!(events.components().is_empty());
    }
}
