//! Durable blob backends
//!
//! Persistence is a single JSON blob per node, written synchronously
//! after each mutation. The interface is deliberately tiny: load the
//! whole map, save the whole map.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreResult;

/// Durable backing for a [`LocalStore`](crate::LocalStore)
pub trait StoreBackend: Send {
    /// Load the persisted map, or an empty map if nothing was persisted
    fn load(&self) -> StoreResult<HashMap<String, Value>>;

    /// Persist the full map, replacing whatever was there
    fn save(&self, entries: &HashMap<String, Value>) -> StoreResult<()>;
}

/// JSON-file backend, one blob per node
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Conventional blob path for a node: `<data_dir>/store_<node_id>.json`
    pub fn for_node(data_dir: impl AsRef<Path>, node_id: &str) -> Self {
        Self::new(data_dir.as_ref().join(format!("store_{}.json", node_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreBackend for FileBackend {
    fn load(&self) -> StoreResult<HashMap<String, Value>> {
        if !self.path.exists() {
            debug!("No store blob at {:?}, starting empty", self.path);
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let entries: HashMap<String, Value> = serde_json::from_str(&content)?;
        info!("Loaded {} entries from {:?}", entries.len(), self.path);
        Ok(entries)
    }

    fn save(&self, entries: &HashMap<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)?;
        debug!("Persisted {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

/// Backend that persists nothing. Used in tests and for ephemeral nodes.
pub struct NullBackend;

impl StoreBackend for NullBackend {
    fn load(&self) -> StoreResult<HashMap<String, Value>> {
        Ok(HashMap::new())
    }

    fn save(&self, _entries: &HashMap<String, Value>) -> StoreResult<()> {
        Ok(())
    }
}
