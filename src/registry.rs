//! Generic keyed registry for pluggable components.
//!
//! Executors, actions and trigger components are all looked up by a string key.
//! Registration never fails: registering an already-known key replaces the
//! previous entry (last writer wins) and logs a warning, so plugins loaded in
//! any order cannot take the process down.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

/// Anything that can live in a [`Registry`].
pub trait Keyed: Send + Sync {
    /// Globally unique identity of the item.
    fn key(&self) -> &str;
}

/// Keyed store backed by a map. Iteration order is unspecified.
pub struct Registry<T: Keyed + ?Sized> {
    name: &'static str,
    items: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: Keyed + ?Sized> Registry<T> {
    /// Create an empty registry. `name` only shows up in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `item` under its key, replacing any previous entry.
    pub fn register(&self, item: Arc<T>) {
        let key = item.key().to_string();
        let mut items = self.items.write();
        if items.contains_key(&key) {
            warn!(
                target: "uiflow::registry",
                registry = self.name, %key,
                "Item already registered; overwriting"
            );
        } else {
            trace!(target: "uiflow::registry", registry = self.name, %key, "Registered");
        }
        items.insert(key, item);
    }

    pub fn unregister(&self, key: &str) {
        if self.items.write().remove(key).is_some() {
            trace!(target: "uiflow::registry", registry = self.name, %key, "Unregistered");
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.items.read().get(key).cloned()
    }

    /// All registered items, in no particular order.
    pub fn get_all(&self) -> Vec<Arc<T>> {
        self.items.read().values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }

    pub fn has(&self, key: &str) -> bool {
        self.items.read().contains_key(key)
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: Keyed + ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.keys();
        keys.sort();
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        key: &'static str,
        payload: u32,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            self.key
        }
    }

    trait Named: Keyed {
        fn name(&self) -> String;
    }

    impl Named for Item {
        fn name(&self) -> String {
            format!("{}-{}", self.key, self.payload)
        }
    }

    #[test]
    fn test_register_get_has_and_unregister() {
        let reg: Registry<Item> = Registry::new("test");
        assert!(reg.is_empty());
        reg.register(Arc::new(Item { key: "a", payload: 1 }));
        reg.register(Arc::new(Item { key: "b", payload: 2 }));

        assert_eq!(reg.len(), 2);
        assert!(reg.has("a"));
        assert_eq!(reg.get("b").map(|i| i.payload), Some(2));
        assert!(reg.get("zzz").is_none());

        reg.unregister("a");
        assert!(!reg.has("a"));
        reg.unregister("a");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_key_last_writer_wins() {
        let reg: Registry<Item> = Registry::new("test");
        reg.register(Arc::new(Item { key: "dup", payload: 1 }));
        reg.register(Arc::new(Item { key: "dup", payload: 2 }));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("dup").map(|i| i.payload), Some(2));
    }

    #[test]
    fn test_works_with_trait_objects() {
        let reg: Registry<dyn Named> = Registry::new("named");
        reg.register(Arc::new(Item { key: "x", payload: 7 }));
        let all = reg.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name(), "x-7");

        let mut keys = reg.keys();
        keys.sort();
        assert_eq!(keys, vec!["x".to_string()]);

        reg.clear();
        assert!(reg.is_empty());
    }
}
