//! Dependency validation
//!
//! A [`DependencyValidation`] is a freshness token shared by a resource and everything
//! watching it. Its validation index starts at 0 and is bumped whenever the thing it
//! represents changes; any non-zero index means "rebuild on next checked access".
//!
//! Dependents hold strong references to their dependencies, dependencies hold only weak
//! references back. A destroyed dependent is skipped when a change propagates.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crate::hash::hash_initializers;

struct DepValNode {
    validation_index: AtomicU32,
    dependents: Mutex<Vec<Weak<DepValNode>>>,
    dependencies: Mutex<SmallVec<[Arc<DepValNode>; 4]>>,
}

impl DepValNode {
    fn id(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}

/// Shared freshness token
#[derive(Clone)]
pub struct DependencyValidation {
    node: Arc<DepValNode>,
}

/// Weak handle used by subscriptions; never keeps a resource alive
#[derive(Clone)]
pub struct WeakDependencyValidation {
    node: Weak<DepValNode>,
}

impl DependencyValidation {
    pub fn new() -> Self {
        Self {
            node: Arc::new(DepValNode {
                validation_index: AtomicU32::new(0),
                dependents: Mutex::new(Vec::new()),
                dependencies: Mutex::new(SmallVec::new()),
            }),
        }
    }

    /// 0 while still valid
    pub fn validation_index(&self) -> u32 {
        self.node.validation_index.load(Ordering::Acquire)
    }

    pub fn is_valid(&self) -> bool {
        self.validation_index() == 0
    }

    /// Mark this token changed and propagate to every live dependent.
    ///
    /// Each reachable token is bumped exactly once per call, so diamonds don't double
    /// count and cycles terminate.
    pub fn on_change(&self) {
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();
        visited.insert(self.node.id());
        queue.push_back(self.node.clone());

        while let Some(node) = queue.pop_front() {
            node.validation_index.fetch_add(1, Ordering::Release);

            let mut dependents = node.dependents.lock();
            dependents.retain(|weak| weak.strong_count() > 0);
            for weak in dependents.iter() {
                if let Some(dependent) = weak.upgrade() {
                    if visited.insert(dependent.id()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    /// Make `self` go stale whenever `dependency` changes
    pub fn register_dependency(&self, dependency: &DependencyValidation) {
        if self.ptr_eq(dependency) {
            return;
        }
        {
            let mut dependencies = self.node.dependencies.lock();
            if dependencies.iter().any(|d| Arc::ptr_eq(d, &dependency.node)) {
                return;
            }
            dependencies.push(dependency.node.clone());
        }
        dependency
            .node
            .dependents
            .lock()
            .push(Arc::downgrade(&self.node));
    }

    pub fn downgrade(&self) -> WeakDependencyValidation {
        WeakDependencyValidation {
            node: Arc::downgrade(&self.node),
        }
    }

    pub fn ptr_eq(&self, other: &DependencyValidation) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Number of live tokens that go stale when this one changes
    pub fn dependent_count(&self) -> usize {
        self.node
            .dependents
            .lock()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn dependency_count(&self) -> usize {
        self.node.dependencies.lock().len()
    }
}

impl Default for DependencyValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyValidation")
            .field("validation_index", &self.validation_index())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

impl WeakDependencyValidation {
    pub fn upgrade(&self) -> Option<DependencyValidation> {
        self.node.upgrade().map(|node| DependencyValidation { node })
    }

    pub fn is_alive(&self) -> bool {
        self.node.strong_count() > 0
    }

    /// Forward a change if the token is still alive; no-op otherwise
    pub fn on_change(&self) -> bool {
        match self.upgrade() {
            Some(depval) => {
                depval.on_change();
                true
            }
            None => false,
        }
    }

    fn same_token(&self, other: &WeakDependencyValidation) -> bool {
        Weak::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for WeakDependencyValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDependencyValidation")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// `dependent` goes stale whenever `dependency` does
pub fn register_asset_dependency(
    dependent: &DependencyValidation,
    dependency: &DependencyValidation,
) {
    dependent.register_dependency(dependency);
}

/// Subscribe `target` to change notifications for `filename`.
///
/// The subscription is weak: if `target` is dropped, the watch stays in place and
/// later notifications are silently discarded.
pub fn register_file_dependency(
    monitor: &dyn FileChangeMonitor,
    target: &DependencyValidation,
    filename: &str,
) {
    monitor.subscribe(filename, target.downgrade());
}

/// External file watch collaborator
pub trait FileChangeMonitor: Send + Sync {
    /// Call `token.on_change()` whenever `filename` changes
    fn subscribe(&self, filename: &str, token: WeakDependencyValidation);
}

/// Last observed state of a watched file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependentFileState {
    pub filename: PathBuf,
    pub modification_time: Option<SystemTime>,
    pub status: FileStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileStatus {
    Normal,
    DoesNotExist,
    /// Replaced by an in-memory edit; set by [`PollingFileMonitor::fake_change`]
    Shadowed,
}

impl DependentFileState {
    fn observe(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                filename: path.to_path_buf(),
                modification_time: meta.modified().ok(),
                status: FileStatus::Normal,
            },
            Err(_) => Self {
                filename: path.to_path_buf(),
                modification_time: None,
                status: FileStatus::DoesNotExist,
            },
        }
    }
}

struct MonitoredFile {
    state: DependentFileState,
    subscribers: Vec<WeakDependencyValidation>,
}

impl MonitoredFile {
    fn live_subscribers(&mut self) -> Vec<WeakDependencyValidation> {
        self.subscribers.retain(|s| s.is_alive());
        self.subscribers.clone()
    }
}

/// File monitor that compares modification times when [`poll`](Self::poll) is called.
///
/// Hosts call `poll` from their own loop (or a frame barrier callback); nothing here
/// spawns a thread.
#[derive(Default)]
pub struct PollingFileMonitor {
    files: Mutex<FxHashMap<u64, MonitoredFile>>,
}

impl PollingFileMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every watched file and notify subscribers of the ones that changed.
    /// Returns the number of changed files.
    pub fn poll(&self) -> usize {
        let mut to_notify = Vec::new();
        let mut changed = 0;
        {
            let mut files = self.files.lock();
            for file in files.values_mut() {
                if file.state.status == FileStatus::Shadowed {
                    continue;
                }
                let current = DependentFileState::observe(&file.state.filename);
                let differs = current.status != file.state.status
                    || current.modification_time != file.state.modification_time;
                if differs {
                    file.state = current;
                    changed += 1;
                    to_notify.extend(file.live_subscribers());
                }
            }
        }
        // Notify outside the lock; on_change may subscribe new files
        for token in to_notify {
            token.on_change();
        }
        changed
    }

    /// Treat `filename` as changed without touching disk.
    /// Returns the number of live tokens notified.
    pub fn fake_change(&self, filename: &str) -> usize {
        let to_notify = {
            let mut files = self.files.lock();
            match files.get_mut(&hash_initializers(&[filename])) {
                Some(file) => {
                    file.state.status = FileStatus::Shadowed;
                    file.live_subscribers()
                }
                None => Vec::new(),
            }
        };
        to_notify.iter().filter(|token| token.on_change()).count()
    }

    pub fn file_state(&self, filename: &str) -> Option<DependentFileState> {
        self.files
            .lock()
            .get(&hash_initializers(&[filename]))
            .map(|f| f.state.clone())
    }

    pub fn watched_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl FileChangeMonitor for PollingFileMonitor {
    fn subscribe(&self, filename: &str, token: WeakDependencyValidation) {
        let mut files = self.files.lock();
        let file = files
            .entry(hash_initializers(&[filename]))
            .or_insert_with(|| MonitoredFile {
                state: DependentFileState::observe(Path::new(filename)),
                subscribers: Vec::new(),
            });
        if !file.subscribers.iter().any(|s| s.same_token(&token)) {
            file.subscribers.push(token);
        }
    }
}
