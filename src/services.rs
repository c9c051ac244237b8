//! Asset services context
//!
//! Owned by the host application and passed down explicitly. Typed caches live in
//! its [`AssetSetManager`]; teardown order is the order fields drop.

use std::sync::Arc;

use crate::asset_set::{Asset, AssetSet};
use crate::compiler::IntermediateCompiler;
use crate::config::AssetConfig;
use crate::construct::{ConstructFromInitializers, ConstructFromMarker};
use crate::depval::{
    register_file_dependency, DependencyValidation, FileChangeMonitor, PollingFileMonitor,
};
use crate::error::{AssetError, Result};
use crate::invalid::InvalidAssetManager;
use crate::manager::AssetSetManager;
use crate::marker;

pub struct AssetServices {
    config: AssetConfig,
    asset_sets: AssetSetManager,
    invalid_assets: InvalidAssetManager,
    file_monitor: Arc<dyn FileChangeMonitor>,
    compiler: Option<Arc<dyn IntermediateCompiler>>,
}

impl AssetServices {
    pub fn new(config: AssetConfig) -> Self {
        Self::with_file_monitor(config, Arc::new(PollingFileMonitor::new()))
    }

    pub fn with_file_monitor(
        config: AssetConfig,
        file_monitor: Arc<dyn FileChangeMonitor>,
    ) -> Self {
        marker::configure_stall_warnings(
            config.stall_warning_threshold(),
            config.stall_warning_interval(),
        );
        Self {
            invalid_assets: InvalidAssetManager::new(config.track_invalid_assets),
            asset_sets: AssetSetManager::new(),
            file_monitor,
            compiler: None,
            config,
        }
    }

    /// Install the collaborator used for background construction
    pub fn set_compiler(&mut self, compiler: Arc<dyn IntermediateCompiler>) {
        self.compiler = Some(compiler);
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn asset_sets(&self) -> &AssetSetManager {
        &self.asset_sets
    }

    pub fn invalid_assets(&self) -> &InvalidAssetManager {
        &self.invalid_assets
    }

    pub fn file_monitor(&self) -> &Arc<dyn FileChangeMonitor> {
        &self.file_monitor
    }

    pub fn compiler(&self) -> Option<&Arc<dyn IntermediateCompiler>> {
        self.compiler.as_ref()
    }

    /// Watch the calling thread for long stalls on pending assets
    pub fn register_main_thread(&self) {
        marker::register_main_thread();
    }

    /// Typed cache for `T`, created on first use
    pub fn set<T: Asset>(&self) -> Result<Arc<AssetSet<T>>> {
        let record_names = self.config.record_asset_names;
        self.asset_sets
            .get_or_create_set_with(|| AssetSet::with_name_recording(record_names))
    }

    pub fn get<T: ConstructFromInitializers>(&self, initializers: &[&str]) -> Result<Arc<T>> {
        self.set::<T>()?.get(initializers)
    }

    pub fn get_checked<T: ConstructFromInitializers>(
        &self,
        initializers: &[&str],
    ) -> Result<Arc<T>> {
        self.set::<T>()?.get_checked(initializers)
    }

    /// Construct through the installed compiler
    pub fn get_compiled<T: ConstructFromMarker>(
        &self,
        check_dependency: bool,
        initializers: &[&str],
    ) -> Result<Arc<T>> {
        let compiler = self.compiler.as_deref().ok_or(AssetError::NoCompiler {
            compile_type: T::COMPILE_TYPE,
        })?;
        self.set::<T>()?
            .get_compiled(check_dependency, compiler, initializers)
    }

    /// New validation token watching every file in `filenames`
    pub fn make_dependency_validation(&self, filenames: &[&str]) -> DependencyValidation {
        let dep_val = DependencyValidation::new();
        for filename in filenames {
            register_file_dependency(self.file_monitor.as_ref(), &dep_val, filename);
        }
        dep_val
    }

    /// Mirror `result` into the invalid asset registry under `name`
    pub fn track<T>(&self, name: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.invalid_assets.mark_valid(name),
            Err(error) if !error.is_pending() => {
                self.invalid_assets.mark_invalid(name, &error.to_string())
            }
            Err(_) => {}
        }
        result
    }

    pub fn register_frame_barrier_callback<F>(&self, callback: F) -> u32
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.asset_sets.register_frame_barrier_callback(callback)
    }

    pub fn on_frame_barrier(&self) {
        self.asset_sets.on_frame_barrier();
    }
}

impl Default for AssetServices {
    fn default() -> Self {
        Self::new(AssetConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Palette {
        colors: usize,
    }

    impl Asset for Palette {}

    impl ConstructFromInitializers for Palette {
        fn construct(initializers: &[&str]) -> Result<Self> {
            initializers[0]
                .parse()
                .map(|colors| Palette { colors })
                .map_err(|_| crate::format_error!("not a color count: {}", initializers[0]))
        }
    }

    struct Baked;
    impl Asset for Baked {}
    impl ConstructFromMarker for Baked {
        const COMPILE_TYPE: u64 = 0xBA4ED;
        fn from_marker(
            _initializers: &[&str],
            _marker: crate::marker::AssetMarker<crate::compiler::Artifact>,
        ) -> Result<Self> {
            Ok(Baked)
        }
    }

    #[test]
    fn test_set_is_shared() {
        let services = AssetServices::default();
        let a = services.get::<Palette>(&["16"]).unwrap();
        let b = services.get::<Palette>(&["16"]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.colors, 16);
        assert_eq!(services.asset_sets().asset_set_count(), 1);
    }

    #[test]
    fn test_track_reports_failures() {
        let config = AssetConfig {
            track_invalid_assets: true,
            ..AssetConfig::default()
        };
        let services = AssetServices::new(config);
        let result = services.track("pal:x", services.get::<Palette>(&["x"]));
        assert!(result.is_err());
        assert!(services.invalid_assets().has_invalid_assets());

        let _ = services.track("pal:x", services.get::<Palette>(&["8"]));
        assert!(!services.invalid_assets().has_invalid_assets());
    }

    #[test]
    fn test_compiled_without_compiler() {
        let services = AssetServices::default();
        let err = services.get_compiled::<Baked>(false, &["x"]).err().unwrap();
        assert_eq!(err, AssetError::NoCompiler { compile_type: 0xBA4ED });
    }

    #[test]
    fn test_make_dependency_validation() {
        let monitor = Arc::new(PollingFileMonitor::new());
        let services = AssetServices::with_file_monitor(AssetConfig::default(), monitor.clone());
        let dep_val = services.make_dependency_validation(&["no/such/a.fx", "no/such/b.fx"]);
        assert_eq!(monitor.watched_count(), 2);
        monitor.fake_change("no/such/b.fx");
        assert!(!dep_val.is_valid());
    }
}
