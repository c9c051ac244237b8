//! Registry of every asset set plus the per-frame barrier
//!
//! The live lists are never mutated while a frame barrier is running its callbacks.
//! Sets and callbacks registered during that window land in pending lists, and
//! deregistrations are queued by id; all of it is merged once the callbacks return.
//! Callbacks run without the registry lock held so they can call back into the
//! manager.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::Arc;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::asset_set::{Asset, AssetSet};
use crate::error::{AssetError, Result};
use crate::hash::type_code;
use crate::heap::{AssetHeap, AssetLog};

pub type FrameBarrierCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    sets: Vec<(u64, Arc<dyn AssetHeap>)>,
    pending_sets: Vec<(u64, Arc<dyn AssetHeap>)>,
    callbacks: Vec<(u32, FrameBarrierCallback)>,
    pending_callbacks: Vec<(u32, FrameBarrierCallback)>,
    pending_removals: Vec<u32>,
    next_callback_id: u32,
    in_iteration: bool,
    frame_count: u64,
}

impl Registry {
    fn find_set(&self, code: u64) -> Option<Arc<dyn AssetHeap>> {
        if let Ok(i) = self.sets.binary_search_by_key(&code, |e| e.0) {
            return Some(self.sets[i].1.clone());
        }
        self.pending_sets
            .binary_search_by_key(&code, |e| e.0)
            .ok()
            .map(|i| self.pending_sets[i].1.clone())
    }

    fn merge_pending(&mut self) {
        let pending_sets = std::mem::take(&mut self.pending_sets);
        let pending_callbacks = std::mem::take(&mut self.pending_callbacks);
        let removals = std::mem::take(&mut self.pending_removals);

        #[cfg(debug_assertions)]
        if !pending_sets.is_empty() || !pending_callbacks.is_empty() || !removals.is_empty() {
            tracing::trace!(
                sets = pending_sets.len(),
                callbacks = pending_callbacks.len(),
                removals = removals.len(),
                "merging deferred registry changes"
            );
        }

        for (code, heap) in pending_sets {
            insert_sorted(&mut self.sets, code, heap);
        }
        for (id, callback) in pending_callbacks {
            insert_sorted(&mut self.callbacks, id, callback);
        }
        if !removals.is_empty() {
            self.callbacks.retain(|(id, _)| !removals.contains(id));
        }
        self.in_iteration = false;
        self.frame_count += 1;
    }
}

fn insert_sorted<K: Ord + Copy, V>(list: &mut Vec<(K, V)>, key: K, value: V) -> bool {
    match list.binary_search_by_key(&key, |e| e.0) {
        Ok(_) => false,
        Err(i) => {
            list.insert(i, (key, value));
            true
        }
    }
}

/// Owns one type-erased heap per cached type
pub struct AssetSetManager {
    registry: ReentrantMutex<RefCell<Registry>>,
}

/// Held lock on the manager; every manager call made while holding it is reentrant
pub struct AssetSetManagerLock<'a> {
    _guard: ReentrantMutexGuard<'a, RefCell<Registry>>,
}

impl AssetSetManager {
    pub fn new() -> Self {
        Self {
            registry: ReentrantMutex::new(RefCell::new(Registry {
                next_callback_id: 1,
                ..Registry::default()
            })),
        }
    }

    /// Heap registered for `code`, pending registrations included
    pub fn get_set_for_type_code(&self, code: u64) -> Option<Arc<dyn AssetHeap>> {
        let guard = self.registry.lock();
        let registry = guard.borrow();
        registry.find_set(code)
    }

    /// Register `heap` under `code`.
    ///
    /// During a frame barrier the heap is queued and merged afterwards. Registering a
    /// code twice is a programming error; the first heap is kept.
    pub fn add(&self, code: u64, heap: Arc<dyn AssetHeap>) -> bool {
        let guard = self.registry.lock();
        let mut registry = guard.borrow_mut();
        let live = registry.sets.binary_search_by_key(&code, |e| e.0).is_ok();
        let queued = registry.in_iteration
            && registry
                .pending_sets
                .binary_search_by_key(&code, |e| e.0)
                .is_ok();
        debug_assert!(!live && !queued, "asset set {code:#x} registered twice");
        if live || queued {
            return false;
        }

        let target = if registry.in_iteration {
            &mut registry.pending_sets
        } else {
            &mut registry.sets
        };
        insert_sorted(target, code, heap)
    }

    /// Typed set for `T`, created with `make` on first use.
    ///
    /// Fails if another type already owns `T`'s type code.
    pub fn get_or_create_set_with<T, F>(&self, make: F) -> Result<Arc<AssetSet<T>>>
    where
        T: Asset,
        F: FnOnce() -> AssetSet<T>,
    {
        let code = type_code::<T>();
        let _lock = self.lock();
        let heap = match self.get_set_for_type_code(code) {
            Some(heap) => heap,
            None => {
                let set = Arc::new(make());
                self.add(code, set.clone());
                return Ok(set);
            }
        };
        let registered = heap.type_name();
        heap.as_any_arc()
            .downcast::<AssetSet<T>>()
            .map_err(|_| AssetError::TypeCodeMismatch {
                type_code: code,
                registered: registered.to_string(),
                requested: T::type_name().to_string(),
            })
    }

    pub fn get_or_create_set<T: Asset>(&self) -> Result<Arc<AssetSet<T>>> {
        self.get_or_create_set_with(AssetSet::new)
    }

    /// Clear and drop every heap
    pub fn clear(&self) {
        let heaps = {
            let guard = self.registry.lock();
            let mut registry = guard.borrow_mut();
            let mut heaps = std::mem::take(&mut registry.sets);
            heaps.append(&mut registry.pending_sets);
            heaps
        };
        for (_, heap) in &heaps {
            heap.clear();
        }
    }

    /// Live sets only; pending sets appear after the next frame barrier
    pub fn asset_set_count(&self) -> usize {
        self.registry.lock().borrow().sets.len()
    }

    pub fn asset_set(&self, index: usize) -> Option<Arc<dyn AssetHeap>> {
        self.registry
            .lock()
            .borrow()
            .sets
            .get(index)
            .map(|(_, heap)| heap.clone())
    }

    /// Report every live set to `log`
    pub fn log_records(&self, log: &mut dyn AssetLog) {
        let heaps: Vec<_> = {
            let guard = self.registry.lock();
            let registry = guard.borrow();
            registry.sets.iter().map(|(_, heap)| heap.clone()).collect()
        };
        for heap in heaps {
            heap.log_report(log);
        }
    }

    /// Hold the registry lock across several calls
    pub fn lock(&self) -> AssetSetManagerLock<'_> {
        AssetSetManagerLock {
            _guard: self.registry.lock(),
        }
    }

    /// Run `callback` at every frame barrier from the next one on
    pub fn register_frame_barrier_callback<F>(&self, callback: F) -> u32
    where
        F: Fn() + Send + Sync + 'static,
    {
        let guard = self.registry.lock();
        let mut registry = guard.borrow_mut();
        let id = registry.next_callback_id;
        registry.next_callback_id = registry.next_callback_id.wrapping_add(1).max(1);

        let callback: FrameBarrierCallback = Arc::new(callback);
        if registry.in_iteration {
            insert_sorted(&mut registry.pending_callbacks, id, callback);
        } else {
            insert_sorted(&mut registry.callbacks, id, callback);
        }
        id
    }

    /// Returns false if `id` isn't registered
    pub fn deregister_frame_barrier_callback(&self, id: u32) -> bool {
        let guard = self.registry.lock();
        let mut registry = guard.borrow_mut();
        let known = registry.callbacks.binary_search_by_key(&id, |e| e.0).is_ok()
            || registry
                .pending_callbacks
                .binary_search_by_key(&id, |e| e.0)
                .is_ok();
        if !known {
            return false;
        }

        if registry.in_iteration {
            if !registry.pending_removals.contains(&id) {
                registry.pending_removals.push(id);
            }
        } else if let Ok(i) = registry.callbacks.binary_search_by_key(&id, |e| e.0) {
            registry.callbacks.remove(i);
        }
        true
    }

    pub fn frame_barrier_callback_count(&self) -> usize {
        self.registry.lock().borrow().callbacks.len()
    }

    /// Per-frame maintenance: run every registered callback in registration order,
    /// then apply whatever they queued.
    pub fn on_frame_barrier(&self) {
        #[cfg(feature = "profiling")]
        let _span = info_span!("frame_barrier").entered();

        let callbacks: Vec<FrameBarrierCallback> = {
            let guard = self.registry.lock();
            let mut registry = guard.borrow_mut();
            if registry.in_iteration {
                tracing::warn!("frame barrier re-entered while running; ignoring");
                return;
            }
            registry.in_iteration = true;
            registry.callbacks.iter().map(|(_, cb)| cb.clone()).collect()
        };

        // Merges even if a callback panics
        let _merge = MergeOnDrop { manager: self };
        for callback in &callbacks {
            callback();
        }
    }

    pub fn in_frame_barrier(&self) -> bool {
        self.registry.lock().borrow().in_iteration
    }

    /// Completed frame barriers
    pub fn frame_count(&self) -> u64 {
        self.registry.lock().borrow().frame_count
    }
}

impl Default for AssetSetManager {
    fn default() -> Self {
        Self::new()
    }
}

struct MergeOnDrop<'a> {
    manager: &'a AssetSetManager,
}

impl Drop for MergeOnDrop<'_> {
    fn drop(&mut self) {
        let guard = self.manager.registry.lock();
        guard.borrow_mut().merge_pending();
    }
}
