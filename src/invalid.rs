//! Registry of assets currently in an error state
//!
//! Purely diagnostic: nothing here gates cache lookups. Code that catches a
//! construction failure may report it so tooling can list what's broken.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::hash::hash_initializers;

/// One broken asset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidAssetRecord {
    pub name: String,
    pub error: String,
}

struct Entry {
    name_hash: u64,
    name: String,
    error: String,
}

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Tracks broken assets for tooling
pub struct InvalidAssetManager {
    entries: Mutex<Vec<Entry>>,
    callbacks: Mutex<Vec<(u32, ChangeCallback)>>,
    next_callback_id: AtomicU32,
    active: AtomicBool,
}

impl InvalidAssetManager {
    /// An inactive manager ignores every `mark_*` call
    pub fn new(active: bool) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU32::new(1),
            active: AtomicBool::new(active),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Record (or update) the error for `name`
    pub fn mark_invalid(&self, name: &str, error: &str) {
        if !self.is_active() {
            return;
        }
        let name_hash = hash_initializers(&[name]);
        {
            let mut entries = self.entries.lock();
            match entries.binary_search_by_key(&name_hash, |e| e.name_hash) {
                Ok(i) => entries[i].error = error.to_string(),
                Err(i) => entries.insert(
                    i,
                    Entry {
                        name_hash,
                        name: name.to_string(),
                        error: error.to_string(),
                    },
                ),
            }
        }
        self.fire_change_events();
    }

    /// Forget `name`; events fire only if something was removed
    pub fn mark_valid(&self, name: &str) {
        if !self.is_active() {
            return;
        }
        let name_hash = hash_initializers(&[name]);
        let removed = {
            let mut entries = self.entries.lock();
            match entries.binary_search_by_key(&name_hash, |e| e.name_hash) {
                Ok(i) => {
                    entries.remove(i);
                    true
                }
                Err(_) => false,
            }
        };
        if removed {
            self.fire_change_events();
        }
    }

    pub fn add_on_change_event<F>(&self, callback: F) -> u32
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn remove_on_change_event(&self, id: u32) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    fn fire_change_events(&self) {
        // Snapshot so callbacks can read the registry or (de)register themselves
        let callbacks: Vec<ChangeCallback> =
            self.callbacks.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Snapshot of every broken asset, ordered by name hash
    pub fn get_assets(&self) -> Vec<InvalidAssetRecord> {
        self.entries
            .lock()
            .iter()
            .map(|e| InvalidAssetRecord {
                name: e.name.clone(),
                error: e.error.clone(),
            })
            .collect()
    }

    pub fn has_invalid_assets(&self) -> bool {
        !self.entries.lock().is_empty()
    }

    pub fn error_for(&self, name: &str) -> Option<String> {
        let name_hash = hash_initializers(&[name]);
        let entries = self.entries.lock();
        entries
            .binary_search_by_key(&name_hash, |e| e.name_hash)
            .ok()
            .map(|i| entries[i].error.clone())
    }

    /// Snapshot as pretty JSON for external tools
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.get_assets())?)
    }
}

impl Default for InvalidAssetManager {
    fn default() -> Self {
        Self::new(cfg!(debug_assertions))
    }
}
