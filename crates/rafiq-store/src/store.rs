//! The bounded in-memory store

use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, warn};

use crate::error::StoreResult;
use crate::persist::StoreBackend;

/// Per-node key-value map, capped at a maximum entry count.
///
/// Only the replication engine and the snapshot coordinator mutate it,
/// and both run on the node's single coordinator task, so no interior
/// locking is needed. The capacity cap applies to client puts; the
/// replication and snapshot paths bypass it, and [`persist`] truncates
/// to the cap on the way out.
///
/// [`persist`]: LocalStore::persist
pub struct LocalStore {
    entries: HashMap<String, Value>,
    max_entries: usize,
    backend: Box<dyn StoreBackend>,
}

impl LocalStore {
    pub fn new(max_entries: usize, backend: Box<dyn StoreBackend>) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            backend,
        }
    }

    /// Load persisted entries, truncating to the configured cap.
    pub fn load(&mut self) -> StoreResult<()> {
        let mut loaded = self.backend.load()?;
        if loaded.len() > self.max_entries {
            warn!(
                "Persisted store holds {} entries, truncating to {}",
                loaded.len(),
                self.max_entries
            );
            let keep: Vec<String> = loaded.keys().take(self.max_entries).cloned().collect();
            loaded.retain(|k, _| keep.contains(k));
        }
        self.entries = loaded;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once the cap is reached; client puts are rejected past it.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_entries
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Full copy of the map, the payload of an outgoing snapshot.
    pub fn dump(&self) -> HashMap<String, Value> {
        self.entries.clone()
    }

    /// Write the store to the durable backend, truncating to the cap.
    /// Failure is logged and swallowed: durability is best-effort and
    /// the in-memory state remains authoritative.
    pub fn persist(&self) {
        let result = if self.entries.len() > self.max_entries {
            let limited: HashMap<String, Value> = self
                .entries
                .iter()
                .take(self.max_entries)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            self.backend.save(&limited)
        } else {
            self.backend.save(&self.entries)
        };

        if let Err(e) = result {
            error!("Failed to persist store: {}", e);
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::{FileBackend, NullBackend};
    use serde_json::json;

    fn store(max: usize) -> LocalStore {
        LocalStore::new(max, Box::new(NullBackend))
    }

    #[test]
    fn test_insert_and_get() {
        let mut s = store(10);
        s.insert("x".to_string(), json!("1"));
        assert_eq!(s.get("x"), Some(&json!("1")));
        assert!(s.get("y").is_none());
    }

    #[test]
    fn test_full_at_cap() {
        let mut s = store(2);
        s.insert("a".to_string(), json!(1));
        assert!(!s.is_full());
        s.insert("b".to_string(), json!(2));
        assert!(s.is_full());
    }

    #[test]
    fn test_load_truncates_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::for_node(dir.path(), "node1");

        let mut big = HashMap::new();
        for i in 0..5 {
            big.insert(format!("k{}", i), json!(i));
        }
        backend.save(&big).unwrap();

        let mut s = LocalStore::new(3, Box::new(FileBackend::for_node(dir.path(), "node1")));
        s.load().unwrap();
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut s = LocalStore::new(
                10,
                Box::new(FileBackend::for_node(dir.path(), "node1")),
            );
            s.insert("x".to_string(), json!({"v": 1}));
            s.persist();
        }

        let mut reloaded = LocalStore::new(
            10,
            Box::new(FileBackend::for_node(dir.path(), "node1")),
        );
        reloaded.load().unwrap();
        assert_eq!(reloaded.get("x"), Some(&json!({"v": 1})));
    }
}
