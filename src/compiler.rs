//! Background compilation
//!
//! [`IntermediateCompiler`] is the seam to whatever turns source files into
//! intermediate artifacts. [`JobCompiler`] is an in-process implementation that runs
//! registered compile functions on the rayon pool (or a plain thread without the
//! `parallel` feature) and shares one marker per request.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::depval::{register_file_dependency, DependencyValidation, FileChangeMonitor};
use crate::error::{AssetError, Result};
use crate::hash::{describe_initializers, hash_initializers};
use crate::marker::{AssetMarker, AssetState};

/// Tag selecting which compile process handles a request
pub type CompileType = u64;

/// Output of a compile step
#[derive(Clone, Debug)]
pub struct Artifact {
    pub data: Vec<u8>,
    /// Goes stale when any input of the compile changes
    pub dep_val: DependencyValidation,
}

impl Artifact {
    pub fn new(data: Vec<u8>, dep_val: DependencyValidation) -> Self {
        Self { data, dep_val }
    }
}

/// Failed compile step.
///
/// `dep_val` should cover every input the compile read before failing; fixing any of
/// them invalidates the token and the next request compiles again.
#[derive(Clone, Debug)]
pub struct CompileFailure {
    pub error: AssetError,
    pub dep_val: Option<DependencyValidation>,
}

impl CompileFailure {
    pub fn new(error: AssetError, dep_val: DependencyValidation) -> Self {
        Self {
            error,
            dep_val: Some(dep_val),
        }
    }
}

impl From<AssetError> for CompileFailure {
    fn from(error: AssetError) -> Self {
        Self {
            error,
            dep_val: None,
        }
    }
}

pub type CompileResult = std::result::Result<Artifact, CompileFailure>;

/// External compiler / intermediate store
pub trait IntermediateCompiler: Send + Sync {
    /// Start (or join) a build and return a marker for it
    fn prepare(
        &self,
        compile_type: CompileType,
        initializers: &[&str],
    ) -> Result<AssetMarker<Artifact>>;
}

/// Compile function registered with a [`JobCompiler`]
pub type CompileFn = Arc<dyn Fn(&[String]) -> CompileResult + Send + Sync>;

/// Runs compile functions in the background
#[derive(Default)]
pub struct JobCompiler {
    functions: RwLock<FxHashMap<CompileType, CompileFn>>,
    markers: Mutex<FxHashMap<(CompileType, u64), AssetMarker<Artifact>>>,
    file_monitor: Option<Arc<dyn FileChangeMonitor>>,
}

impl JobCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures that don't report their own inputs watch the first initializer
    /// through `file_monitor`
    pub fn with_file_monitor(file_monitor: Arc<dyn FileChangeMonitor>) -> Self {
        Self {
            file_monitor: Some(file_monitor),
            ..Self::default()
        }
    }

    pub fn register<F>(&self, compile_type: CompileType, compile: F)
    where
        F: Fn(&[String]) -> CompileResult + Send + Sync + 'static,
    {
        self.functions.write().insert(compile_type, Arc::new(compile));
    }

    /// Drop the cached marker so the next request recompiles
    pub fn forget(&self, compile_type: CompileType, initializers: &[&str]) -> bool {
        self.markers
            .lock()
            .remove(&(compile_type, hash_initializers(initializers)))
            .is_some()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.lock().len()
    }

    fn reusable(marker: &AssetMarker<Artifact>) -> bool {
        match marker.state() {
            AssetState::Pending => true,
            // Failures stay failed until their inputs change
            AssetState::Ready | AssetState::Invalid => marker
                .dependency_validation()
                .map_or(true, |dep_val| dep_val.is_valid()),
        }
    }

    fn failure_dep_val(
        file_monitor: Option<&dyn FileChangeMonitor>,
        initializers: &[String],
    ) -> DependencyValidation {
        let dep_val = DependencyValidation::new();
        if let (Some(monitor), Some(source)) = (file_monitor, initializers.first()) {
            register_file_dependency(monitor, &dep_val, source);
        }
        dep_val
    }

    fn spawn(
        compile: CompileFn,
        file_monitor: Option<Arc<dyn FileChangeMonitor>>,
        initializers: Vec<String>,
        marker: AssetMarker<Artifact>,
    ) {
        let job = move || {
            #[cfg(feature = "profiling")]
            let _span =
                tracing::info_span!("compile", initializer = marker.initializer()).entered();

            // The token is attached before resolving so a reader never sees a
            // finished marker without one
            match compile(&initializers) {
                Ok(artifact) => {
                    marker.set_dependency_validation(artifact.dep_val.clone());
                    marker.fulfil(artifact);
                }
                Err(failure) => {
                    tracing::debug!(
                        initializer = marker.initializer(),
                        error = %failure.error,
                        "compile failed"
                    );
                    let dep_val = failure.dep_val.unwrap_or_else(|| {
                        Self::failure_dep_val(file_monitor.as_deref(), &initializers)
                    });
                    marker.set_dependency_validation(dep_val);
                    marker.fail(failure.error);
                }
            }
        };

        #[cfg(feature = "parallel")]
        rayon::spawn(job);
        #[cfg(not(feature = "parallel"))]
        std::thread::spawn(job);
    }
}

impl IntermediateCompiler for JobCompiler {
    fn prepare(
        &self,
        compile_type: CompileType,
        initializers: &[&str],
    ) -> Result<AssetMarker<Artifact>> {
        let compile = self
            .functions
            .read()
            .get(&compile_type)
            .cloned()
            .ok_or(AssetError::UnknownCompileType(compile_type))?;

        let key = (compile_type, hash_initializers(initializers));
        let mut markers = self.markers.lock();
        if let Some(existing) = markers.get(&key) {
            if Self::reusable(existing) {
                return Ok(existing.clone());
            }
        }

        let marker = AssetMarker::pending(describe_initializers(initializers));
        markers.insert(key, marker.clone());
        drop(markers);

        let owned = initializers.iter().map(|s| s.to_string()).collect();
        Self::spawn(compile, self.file_monitor.clone(), owned, marker.clone());
        Ok(marker)
    }
}
