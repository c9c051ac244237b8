//! Pending build markers
//!
//! An [`AssetMarker`] stands in for a build that may still be running on another
//! thread. Callers poll it with [`AssetMarker::try_actualize`] or opt in to blocking
//! with [`AssetMarker::stall_while_pending`]. Blocking on the registered main thread
//! for longer than the stall threshold logs a warning.

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::depval::DependencyValidation;
use crate::error::{AssetError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetState {
    Pending,
    Ready,
    Invalid,
}

enum MarkerSlot<P> {
    Pending,
    Ready(Arc<P>),
    Invalid(AssetError),
}

impl<P> MarkerSlot<P> {
    fn state(&self) -> AssetState {
        match self {
            MarkerSlot::Pending => AssetState::Pending,
            MarkerSlot::Ready(_) => AssetState::Ready,
            MarkerSlot::Invalid(_) => AssetState::Invalid,
        }
    }
}

struct MarkerShared<P> {
    initializer: String,
    slot: Mutex<MarkerSlot<P>>,
    signal: Condvar,
    dep_val: Mutex<Option<DependencyValidation>>,
}

/// Shared handle to a build that resolves to `P`
pub struct AssetMarker<P> {
    shared: Arc<MarkerShared<P>>,
}

impl<P> Clone for AssetMarker<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P> AssetMarker<P> {
    fn with_slot(initializer: impl Into<String>, slot: MarkerSlot<P>) -> Self {
        Self {
            shared: Arc::new(MarkerShared {
                initializer: initializer.into(),
                slot: Mutex::new(slot),
                signal: Condvar::new(),
                dep_val: Mutex::new(None),
            }),
        }
    }

    pub fn pending(initializer: impl Into<String>) -> Self {
        Self::with_slot(initializer, MarkerSlot::Pending)
    }

    pub fn ready(initializer: impl Into<String>, payload: P) -> Self {
        Self::with_slot(initializer, MarkerSlot::Ready(Arc::new(payload)))
    }

    pub fn invalid(initializer: impl Into<String>, error: AssetError) -> Self {
        Self::with_slot(initializer, MarkerSlot::Invalid(error))
    }

    pub fn initializer(&self) -> &str {
        &self.shared.initializer
    }

    pub fn state(&self) -> AssetState {
        self.shared.slot.lock().state()
    }

    /// Resolve the marker; only the first resolution wins
    pub fn fulfil(&self, payload: P) -> bool {
        self.resolve(MarkerSlot::Ready(Arc::new(payload)))
    }

    pub fn fail(&self, error: AssetError) -> bool {
        self.resolve(MarkerSlot::Invalid(error))
    }

    fn resolve(&self, outcome: MarkerSlot<P>) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, MarkerSlot::Pending) {
            return false;
        }
        *slot = outcome;
        self.shared.signal.notify_all();
        true
    }

    /// Attach the validation token of whatever the build read
    pub fn set_dependency_validation(&self, dep_val: DependencyValidation) {
        *self.shared.dep_val.lock() = Some(dep_val);
    }

    pub fn dependency_validation(&self) -> Option<DependencyValidation> {
        self.shared.dep_val.lock().clone()
    }

    /// The built value, if the build has finished successfully
    pub fn try_actualize(&self) -> Option<Arc<P>> {
        match &*self.shared.slot.lock() {
            MarkerSlot::Ready(payload) => Some(payload.clone()),
            _ => None,
        }
    }

    /// Like [`try_actualize`](Self::try_actualize) but reports why nothing is available
    pub fn actualize(&self) -> Result<Arc<P>> {
        match &*self.shared.slot.lock() {
            MarkerSlot::Ready(payload) => Ok(payload.clone()),
            MarkerSlot::Pending => Err(AssetError::pending(
                self.shared.initializer.clone(),
                "build still in flight",
            )),
            MarkerSlot::Invalid(error) => Err(error.clone()),
        }
    }

    /// Block the calling thread until the build resolves
    pub fn stall_while_pending(&self) -> AssetState {
        self.stall(None)
    }

    /// Block for at most `timeout`; returns `Pending` if it elapsed first
    pub fn stall_while_pending_for(&self, timeout: Duration) -> AssetState {
        self.stall(Some(Instant::now() + timeout))
    }

    fn stall(&self, deadline: Option<Instant>) -> AssetState {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, MarkerSlot::Pending) {
            return slot.state();
        }

        let mut watch = StallWatch::begin(&self.shared.initializer);
        while matches!(*slot, MarkerSlot::Pending) {
            let mut wait = watch.poll_period();
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                wait = wait.min(deadline - now);
            }
            self.shared.signal.wait_for(&mut slot, wait);
            watch.tick();
        }
        slot.state()
    }
}

impl<P> fmt::Debug for AssetMarker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetMarker")
            .field("initializer", &self.shared.initializer)
            .field("state", &self.state())
            .finish()
    }
}

static MAIN_THREAD: RwLock<Option<ThreadId>> = parking_lot::const_rwlock(None);
static STALL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(100);
static STALL_INTERVAL_MS: AtomicU64 = AtomicU64::new(100);

thread_local! {
    static STALL_WARNINGS: Cell<u64> = const { Cell::new(0) };
}

/// Make the calling thread the one watched by the stall diagnostic
pub fn register_main_thread() {
    *MAIN_THREAD.write() = Some(thread::current().id());
}

pub fn is_main_thread() -> bool {
    *MAIN_THREAD.read() == Some(thread::current().id())
}

/// Warn once a main-thread stall exceeds `threshold`, then at most once per `interval`
pub fn configure_stall_warnings(threshold: Duration, interval: Duration) {
    STALL_THRESHOLD_MS.store(threshold.as_millis() as u64, Ordering::Relaxed);
    STALL_INTERVAL_MS.store(interval.as_millis().max(1) as u64, Ordering::Relaxed);
}

/// Stall warnings emitted on the calling thread
pub fn stall_warning_count() -> u64 {
    STALL_WARNINGS.with(|c| c.get())
}

struct StallWatch<'a> {
    initializer: &'a str,
    on_main_thread: bool,
    start: Instant,
    last_warning: Option<Instant>,
    threshold: Duration,
    interval: Duration,
}

impl<'a> StallWatch<'a> {
    fn begin(initializer: &'a str) -> Self {
        Self {
            initializer,
            on_main_thread: is_main_thread(),
            start: Instant::now(),
            last_warning: None,
            threshold: Duration::from_millis(STALL_THRESHOLD_MS.load(Ordering::Relaxed)),
            interval: Duration::from_millis(STALL_INTERVAL_MS.load(Ordering::Relaxed)),
        }
    }

    fn poll_period(&self) -> Duration {
        if self.on_main_thread {
            self.interval.min(self.threshold.max(Duration::from_millis(1)))
        } else {
            Duration::from_millis(100)
        }
    }

    fn tick(&mut self) {
        if !self.on_main_thread {
            return;
        }
        let now = Instant::now();
        let stalled = now - self.start;
        if stalled <= self.threshold {
            return;
        }
        let due = self
            .last_warning
            .map_or(true, |last| now - last >= self.interval);
        if due {
            tracing::warn!(
                initializer = self.initializer,
                stalled_ms = stalled.as_millis() as u64,
                "main thread stalled waiting for pending asset"
            );
            STALL_WARNINGS.with(|c| c.set(c.get() + 1));
            self.last_warning = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_marker() {
        let marker = AssetMarker::ready("rock.dds", 7u32);
        assert_eq!(marker.state(), AssetState::Ready);
        assert_eq!(*marker.try_actualize().unwrap(), 7);
        assert_eq!(marker.stall_while_pending(), AssetState::Ready);
    }

    #[test]
    fn test_pending_then_fulfilled() {
        let marker = AssetMarker::<u32>::pending("rock.dds");
        assert!(marker.try_actualize().is_none());
        assert!(marker.actualize().unwrap_err().is_pending());

        let remote = marker.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.fulfil(3)
        });
        assert_eq!(marker.stall_while_pending(), AssetState::Ready);
        assert!(worker.join().unwrap());
        assert_eq!(*marker.actualize().unwrap(), 3);
        assert!(!marker.fulfil(4), "second resolution must be ignored");
    }

    #[test]
    fn test_failed_marker() {
        let marker = AssetMarker::<u32>::pending("a.shader");
        marker.fail(AssetError::invalid("a.shader", "syntax error"));
        assert_eq!(marker.state(), AssetState::Invalid);
        assert!(marker.actualize().unwrap_err().is_invalid());
    }

    #[test]
    fn test_stall_timeout() {
        let marker = AssetMarker::<u32>::pending("slow.dds");
        let state = marker.stall_while_pending_for(Duration::from_millis(10));
        assert_eq!(state, AssetState::Pending);
    }

    #[test]
    fn test_main_thread_stall_warns() {
        register_main_thread();
        let before = stall_warning_count();
        let marker = AssetMarker::<u32>::pending("slow.dds");
        let remote = marker.clone();
        let start = Instant::now();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(260));
            remote.fulfil(1);
        });
        assert_eq!(marker.stall_while_pending(), AssetState::Ready);
        let stalled_ms = start.elapsed().as_millis() as u64;
        worker.join().unwrap();
        let warnings = stall_warning_count() - before;
        assert!(warnings >= 1, "expected a stall warning");
        // One warning per interval at most
        assert!(warnings <= stalled_ms / 100, "warnings must be throttled, got {warnings}");
    }
}
