//! Per-type asset cache
//!
//! An [`AssetSet<T>`] maps the hash of an initializer tuple to at most one live
//! instance of `T`, kept in ascending hash order. With the `divergent` feature a
//! second ordered store holds editor-owned working copies that shadow the
//! canonical entry on every read.
//!
//! The set is meant to be driven from one thread. The internal lock is never held
//! while an asset is being constructed, so a constructor may look up other assets in
//! the same set; the insertion point is always searched again after construction.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::compiler::IntermediateCompiler;
use crate::construct::{
    Background, ConstructFromInitializers, ConstructFromMarker, ConstructionStrategy, Immediate,
};
use crate::depval::DependencyValidation;
use crate::error::Result;
use crate::hash::{describe_initializers, hash_initializers, type_code};
use crate::heap::{AssetHeap, AssetRecord};

/// Trait for anything cached in an [`AssetSet`]
pub trait Asset: Send + Sync + 'static {
    /// Token that goes stale when this asset's sources change
    fn dependency_validation(&self) -> Option<&DependencyValidation> {
        None
    }

    /// Get asset type name
    fn type_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// Where a lookup landed
pub enum Resolution<T> {
    /// An editor working copy shadows the canonical entry
    Divergent(Arc<DivergentAsset<T>>),
    Canonical(Arc<T>),
    Absent,
}

impl<T> Resolution<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolution::Absent)
    }
}

struct Slots<T> {
    entries: Vec<(u64, Arc<T>)>,
    names: Vec<(u64, String)>,
    #[cfg(feature = "divergent")]
    divergent: Vec<(u64, Arc<DivergentAsset<T>>)>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            names: Vec::new(),
            #[cfg(feature = "divergent")]
            divergent: Vec::new(),
        }
    }
}

/// Typed cache of assets keyed by initializer hash
pub struct AssetSet<T: Asset> {
    slots: Mutex<Slots<T>>,
    bound_thread: RwLock<Option<ThreadId>>,
    record_names: bool,
}

impl<T: Asset> AssetSet<T> {
    /// Create an empty set; names are recorded in debug builds
    pub fn new() -> Self {
        Self::with_name_recording(cfg!(debug_assertions))
    }

    pub fn with_name_recording(record_names: bool) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            bound_thread: RwLock::new(None),
            record_names,
        }
    }

    /// Restrict use of this set to the calling thread (checked in debug builds)
    pub fn bind_to_current_thread(&self) {
        *self.bound_thread.write() = Some(thread::current().id());
    }

    pub fn bound_thread(&self) -> Option<ThreadId> {
        *self.bound_thread.read()
    }

    fn check_thread(&self) {
        if let Some(bound) = *self.bound_thread.read() {
            debug_assert_eq!(
                bound,
                thread::current().id(),
                "asset set for {} used off its bound thread",
                T::type_name()
            );
        }
    }

    /// Look up `hash`, divergent overlay first
    pub fn resolve(&self, hash: u64) -> Resolution<T> {
        let slots = self.slots.lock();
        #[cfg(feature = "divergent")]
        if let Ok(i) = slots.divergent.binary_search_by_key(&hash, |e| e.0) {
            return Resolution::Divergent(slots.divergent[i].1.clone());
        }
        match slots.entries.binary_search_by_key(&hash, |e| e.0) {
            Ok(i) => Resolution::Canonical(slots.entries[i].1.clone()),
            Err(_) => Resolution::Absent,
        }
    }

    fn is_stale(instance: &T) -> bool {
        instance
            .dependency_validation()
            .is_some_and(|dep_val| !dep_val.is_valid())
    }

    /// Return the asset built from `initializers`, constructing it on a miss.
    ///
    /// With `check_dependency`, a cached instance whose validation token has changed
    /// is rebuilt. The stale instance stays in its slot until the replacement is fully
    /// built, so a failed rebuild leaves the set exactly as it was.
    pub fn get_or_construct<S>(
        &self,
        check_dependency: bool,
        strategy: &S,
        initializers: &[&str],
    ) -> Result<Arc<T>>
    where
        S: ConstructionStrategy<T> + ?Sized,
    {
        self.check_thread();
        let hash = hash_initializers(initializers);

        let stale = match self.resolve(hash) {
            Resolution::Divergent(divergent) => return Ok(divergent.working_copy()),
            Resolution::Canonical(instance) => {
                if !check_dependency || !Self::is_stale(&instance) {
                    return Ok(instance);
                }
                Some(instance)
            }
            Resolution::Absent => None,
        };

        // No lock held here: construction may look up (and insert into) this set.
        let built = Arc::new(strategy.construct(initializers)?);

        let mut slots = self.slots.lock();
        let replaced = match slots.entries.binary_search_by_key(&hash, |e| e.0) {
            Ok(i) => {
                let current = &slots.entries[i].1;
                let current_is_ours_to_replace = match &stale {
                    Some(stale) => Arc::ptr_eq(current, stale) || Self::is_stale(current),
                    None => false,
                };
                if !current_is_ours_to_replace {
                    // A nested call already installed a usable instance
                    return Ok(current.clone());
                }
                Some(std::mem::replace(&mut slots.entries[i].1, built.clone()))
            }
            Err(i) => {
                slots.entries.insert(i, (hash, built.clone()));
                None
            }
        };

        let name = describe_initializers(initializers);
        if self.record_names {
            Self::record_name(&mut slots.names, hash, &name);
        }
        drop(slots);

        tracing::debug!(
            asset_type = T::type_name(),
            name = name.as_str(),
            hash,
            rebuilt = replaced.is_some(),
            "constructed asset"
        );
        // The replaced instance is released outside the lock
        drop(replaced);
        Ok(built)
    }

    fn record_name(names: &mut Vec<(u64, String)>, hash: u64, name: &str) {
        match names.binary_search_by_key(&hash, |e| e.0) {
            Ok(i) => {
                if names[i].1 != name {
                    tracing::warn!(
                        hash,
                        existing = names[i].1.as_str(),
                        incoming = name,
                        "initializer hash collision"
                    );
                }
            }
            Err(i) => names.insert(i, (hash, name.to_string())),
        }
    }

    /// Cached asset, or `None` without constructing anything
    pub fn find(&self, initializers: &[&str]) -> Option<Arc<T>> {
        match self.resolve(hash_initializers(initializers)) {
            Resolution::Divergent(divergent) => Some(divergent.working_copy()),
            Resolution::Canonical(instance) => Some(instance),
            Resolution::Absent => None,
        }
    }

    pub fn contains(&self, initializers: &[&str]) -> bool {
        !self.resolve(hash_initializers(initializers)).is_absent()
    }

    /// Number of canonical entries
    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().entries.is_empty()
    }

    /// Recorded name for `hash`, if names are being recorded
    pub fn name_of(&self, hash: u64) -> Option<String> {
        let slots = self.slots.lock();
        slots
            .names
            .binary_search_by_key(&hash, |e| e.0)
            .ok()
            .map(|i| slots.names[i].1.clone())
    }

    /// Drop every entry, divergent copies included
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.slots.lock());
        drop(old);
    }

    fn records_locked(slots: &Slots<T>) -> Vec<AssetRecord> {
        slots
            .entries
            .iter()
            .map(|(hash, _)| AssetRecord {
                hash: *hash,
                name: slots
                    .names
                    .binary_search_by_key(hash, |e| e.0)
                    .ok()
                    .map(|i| slots.names[i].1.clone()),
            })
            .collect()
    }
}

impl<T: ConstructFromInitializers> AssetSet<T> {
    /// Immediate construction, no dependency check
    pub fn get(&self, initializers: &[&str]) -> Result<Arc<T>> {
        self.get_or_construct(false, &Immediate, initializers)
    }

    /// Immediate construction, rebuilding stale instances
    pub fn get_checked(&self, initializers: &[&str]) -> Result<Arc<T>> {
        self.get_or_construct(true, &Immediate, initializers)
    }
}

impl<T: ConstructFromMarker> AssetSet<T> {
    /// Construct around a background compile
    pub fn get_compiled(
        &self,
        check_dependency: bool,
        compiler: &dyn IntermediateCompiler,
        initializers: &[&str],
    ) -> Result<Arc<T>> {
        self.get_or_construct(check_dependency, &Background::new(compiler), initializers)
    }
}

#[cfg(feature = "divergent")]
impl<T: Asset> AssetSet<T> {
    /// Working copy for `initializers`, created from the dependency-checked canonical
    /// instance if none exists yet
    pub fn get_divergent_with<S>(
        &self,
        strategy: &S,
        initializers: &[&str],
    ) -> Result<Arc<DivergentAsset<T>>>
    where
        S: ConstructionStrategy<T> + ?Sized,
    {
        self.check_thread();
        let hash = hash_initializers(initializers);
        if let Resolution::Divergent(existing) = self.resolve(hash) {
            return Ok(existing);
        }

        let canonical = self.get_or_construct(true, strategy, initializers)?;
        let divergent = Arc::new(DivergentAsset::new(
            hash,
            describe_initializers(initializers),
            canonical,
        ));

        let mut slots = self.slots.lock();
        match slots.divergent.binary_search_by_key(&hash, |e| e.0) {
            Ok(i) => Ok(slots.divergent[i].1.clone()),
            Err(i) => {
                slots.divergent.insert(i, (hash, divergent.clone()));
                Ok(divergent)
            }
        }
    }

    /// Drop the working copy so reads see the canonical entry again
    pub fn remove_divergent(&self, initializers: &[&str]) -> bool {
        let hash = hash_initializers(initializers);
        let removed = {
            let mut slots = self.slots.lock();
            match slots.divergent.binary_search_by_key(&hash, |e| e.0) {
                Ok(i) => Some(slots.divergent.remove(i)),
                Err(_) => None,
            }
        };
        removed.is_some()
    }

    pub fn divergent_count(&self) -> usize {
        self.slots.lock().divergent.len()
    }
}

#[cfg(feature = "divergent")]
impl<T: ConstructFromInitializers> AssetSet<T> {
    pub fn get_divergent(&self, initializers: &[&str]) -> Result<Arc<DivergentAsset<T>>> {
        self.get_divergent_with(&Immediate, initializers)
    }
}

impl<T: Asset> Default for AssetSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Asset> AssetHeap for AssetSet<T> {
    fn type_code(&self) -> u64 {
        type_code::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn len(&self) -> usize {
        AssetSet::len(self)
    }

    fn clear(&self) {
        AssetSet::clear(self)
    }

    fn records(&self) -> Vec<AssetRecord> {
        Self::records_locked(&self.slots.lock())
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Editor-owned working copy that shadows a canonical asset.
///
/// Readers never mutate the working copy in place; edits install a whole new
/// instance with [`replace`](Self::replace).
pub struct DivergentAsset<T> {
    hash: u64,
    name: String,
    canonical: Arc<T>,
    working: RwLock<Arc<T>>,
    revision: AtomicU32,
}

impl<T> DivergentAsset<T> {
    fn new(hash: u64, name: String, canonical: Arc<T>) -> Self {
        Self {
            hash,
            name,
            working: RwLock::new(canonical.clone()),
            canonical,
            revision: AtomicU32::new(0),
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current live instance
    pub fn working_copy(&self) -> Arc<T> {
        self.working.read().clone()
    }

    /// Instance the working copy was started from
    pub fn canonical(&self) -> &Arc<T> {
        &self.canonical
    }

    /// Install a new working copy, returning the previous one
    pub fn replace(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let previous = std::mem::replace(&mut *self.working.write(), value);
        self.revision.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Number of replacements since creation
    pub fn revision(&self) -> u32 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn has_changes(&self) -> bool {
        !Arc::ptr_eq(&*self.working.read(), &self.canonical)
    }
}
