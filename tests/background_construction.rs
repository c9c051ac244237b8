// Assets built around background compiles
use asset_sets::{
    register_asset_dependency, Artifact, Asset, AssetConfig, AssetError, AssetMarker,
    AssetServices, AssetSet, AssetState, CompileType, ConstructFromMarker, DependencyValidation,
    IntermediateCompiler, JobCompiler, PollingFileMonitor, Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SHADER: CompileType = 0x5348_4144;

// Waits for its compile and takes its staleness from the artifact
struct CompiledShader {
    bytecode: Vec<u8>,
    dep_val: DependencyValidation,
}

impl Asset for CompiledShader {
    fn dependency_validation(&self) -> Option<&DependencyValidation> {
        Some(&self.dep_val)
    }
}

impl ConstructFromMarker for CompiledShader {
    const COMPILE_TYPE: CompileType = SHADER;

    fn from_marker(_initializers: &[&str], marker: AssetMarker<Artifact>) -> Result<Self> {
        marker.stall_while_pending();
        let artifact = marker.actualize()?;
        let dep_val = DependencyValidation::new();
        register_asset_dependency(&dep_val, &artifact.dep_val);
        Ok(CompiledShader {
            bytecode: artifact.data.clone(),
            dep_val,
        })
    }
}

// Keeps the marker and resolves lazily
struct LazyShader {
    marker: AssetMarker<Artifact>,
}

impl Asset for LazyShader {}

impl ConstructFromMarker for LazyShader {
    const COMPILE_TYPE: CompileType = SHADER;

    fn from_marker(_initializers: &[&str], marker: AssetMarker<Artifact>) -> Result<Self> {
        Ok(LazyShader { marker })
    }
}

fn shader_compiler() -> (JobCompiler, Arc<AtomicUsize>) {
    let compiler = JobCompiler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    compiler.register(SHADER, move |initializers| {
        counter.fetch_add(1, Ordering::SeqCst);
        if initializers[0].contains("broken") {
            let error = AssetError::invalid(initializers[0].clone(), "missing entry point");
            return Err(error.into());
        }
        Ok(Artifact::new(
            format!("dxbc:{}", initializers.join(":")).into_bytes(),
            DependencyValidation::new(),
        ))
    });
    (compiler, runs)
}

#[test]
fn test_compiled_asset_is_cached() {
    let (compiler, runs) = shader_compiler();
    let shaders = AssetSet::<CompiledShader>::new();

    let first = shaders.get_compiled(false, &compiler, &["lit.hlsl", "ps_main"]).unwrap();
    let second = shaders.get_compiled(false, &compiler, &["lit.hlsl", "ps_main"]).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.bytecode, b"dxbc:lit.hlsl:ps_main");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stale_artifact_rebuilds_asset() {
    let (compiler, runs) = shader_compiler();
    let shaders = AssetSet::<CompiledShader>::new();
    let old = shaders.get_compiled(true, &compiler, &["lit.hlsl"]).unwrap();

    // The artifact's inputs changed; the asset's token follows
    let marker = compiler.prepare(SHADER, &["lit.hlsl"]).unwrap();
    marker.actualize().unwrap().dep_val.on_change();
    assert!(!old.dep_val.is_valid());

    let rebuilt = shaders.get_compiled(true, &compiler, &["lit.hlsl"]).unwrap();
    assert!(!Arc::ptr_eq(&old, &rebuilt));
    assert!(rebuilt.dep_val.is_valid());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_compile_surfaces_as_invalid() {
    let (compiler, _) = shader_compiler();
    let shaders = AssetSet::<CompiledShader>::new();
    let err = shaders
        .get_compiled(false, &compiler, &["broken.hlsl"])
        .err()
        .unwrap();
    assert!(err.is_invalid());
    assert!(shaders.is_empty());
}

#[test]
fn test_fixed_source_recovers_after_failed_compile() {
    let monitor = Arc::new(PollingFileMonitor::new());
    let compiler = JobCompiler::with_file_monitor(monitor.clone());
    let fixed = Arc::new(AtomicBool::new(false));
    let is_fixed = fixed.clone();
    compiler.register(SHADER, move |initializers| {
        if !is_fixed.load(Ordering::SeqCst) {
            return Err(AssetError::invalid(initializers[0].clone(), "syntax error").into());
        }
        Ok(Artifact::new(b"dxbc".to_vec(), DependencyValidation::new()))
    });
    let shaders = AssetSet::<CompiledShader>::new();

    assert!(shaders.get_compiled(true, &compiler, &["no/such/fog.hlsl"]).is_err());
    // Nothing changed yet, so the failure stands
    assert!(shaders.get_compiled(true, &compiler, &["no/such/fog.hlsl"]).is_err());

    fixed.store(true, Ordering::SeqCst);
    monitor.fake_change("no/such/fog.hlsl");
    let shader = shaders.get_compiled(true, &compiler, &["no/such/fog.hlsl"]).unwrap();
    assert_eq!(shader.bytecode, b"dxbc");
}

#[test]
fn test_lazy_asset_resolves_after_stall() {
    let (compiler, _) = shader_compiler();
    let shaders = AssetSet::<LazyShader>::new();
    let shader = shaders.get_compiled(false, &compiler, &["sky.hlsl"]).unwrap();

    let state = shader.marker.stall_while_pending_for(Duration::from_secs(5));
    assert_eq!(state, AssetState::Ready);
    assert_eq!(shader.marker.try_actualize().unwrap().data, b"dxbc:sky.hlsl");
}

#[test]
fn test_lazy_assets_share_one_compile() {
    let (compiler, runs) = shader_compiler();
    let a = AssetSet::<LazyShader>::new();
    let b = AssetSet::<CompiledShader>::new();

    let lazy = a.get_compiled(false, &compiler, &["water.hlsl"]).unwrap();
    b.get_compiled(false, &compiler, &["water.hlsl"]).unwrap();
    lazy.marker.stall_while_pending();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_services_route_through_installed_compiler() {
    let (compiler, runs) = shader_compiler();
    let mut services = AssetServices::new(AssetConfig::default());
    services.set_compiler(Arc::new(compiler));

    let a = services.get_compiled::<CompiledShader>(true, &["fog.hlsl"]).unwrap();
    let b = services.get_compiled::<CompiledShader>(true, &["fog.hlsl"]).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(services.asset_sets().asset_set_count(), 1);
}
