//! Registry of running river instances.
//!
//! Owned by the host and passed to whoever needs operational access to a
//! running river (force reindex, project listing); there is no process-wide
//! singleton.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::coordinator::CoordinatorHandle;

/// Thread-safe map of running river instances keyed by river name.
#[derive(Default)]
pub struct RiverRegistry {
    rivers: RwLock<HashMap<String, CoordinatorHandle>>,
}

impl RiverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running river. Replaces any previous instance of the
    /// same name.
    pub fn register(&self, river_name: &str, handle: CoordinatorHandle) {
        self.rivers
            .write()
            .unwrap()
            .insert(river_name.to_string(), handle);
    }

    /// Remove a river from the registry, returning its handle if present.
    pub fn unregister(&self, river_name: &str) -> Option<CoordinatorHandle> {
        self.rivers.write().unwrap().remove(river_name)
    }

    /// Handle of a running river, `None` when not registered.
    pub fn get(&self, river_name: &str) -> Option<CoordinatorHandle> {
        self.rivers.read().unwrap().get(river_name).cloned()
    }

    /// Names of all registered rivers.
    pub fn names(&self) -> Vec<String> {
        self.rivers.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rivers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rivers.read().unwrap().is_empty()
    }
}
