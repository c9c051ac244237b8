//! Example: cache, invalidate and rebuild
//!
//! Run with `--features profiling` to see the library's tracing output.

use asset_sets::{
    Asset, AssetConfig, AssetServices, ConstructFromInitializers, DependencyValidation, Result,
    TextLog,
};

#[cfg(feature = "profiling")]
use tracing_subscriber::EnvFilter;

struct Level {
    name: String,
    tiles: usize,
    dep_val: DependencyValidation,
}

impl Asset for Level {
    fn dependency_validation(&self) -> Option<&DependencyValidation> {
        Some(&self.dep_val)
    }
}

impl ConstructFromInitializers for Level {
    fn construct(initializers: &[&str]) -> Result<Self> {
        let name = initializers[0];
        println!("  building {name}");
        Ok(Level {
            name: name.to_string(),
            tiles: name.len() * 64,
            dep_val: DependencyValidation::new(),
        })
    }
}

fn main() -> Result<()> {
    #[cfg(feature = "profiling")]
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => AssetConfig::load(path)?,
        None => AssetConfig::default(),
    };
    let services = AssetServices::new(config);
    services.register_main_thread();

    println!("First request:");
    let level = services.get_checked::<Level>(&["forest.lvl"])?;
    println!("  {} has {} tiles", level.name, level.tiles);

    println!("Repeat request:");
    let again = services.get_checked::<Level>(&["forest.lvl"])?;
    println!("  same instance: {}", std::sync::Arc::ptr_eq(&level, &again));

    println!("Source changed:");
    level.dep_val.on_change();
    let rebuilt = services.get_checked::<Level>(&["forest.lvl"])?;
    println!("  same instance: {}", std::sync::Arc::ptr_eq(&level, &rebuilt));

    services.register_frame_barrier_callback(|| println!("  frame barrier"));
    services.on_frame_barrier();

    let mut log = TextLog::new();
    services.asset_sets().log_records(&mut log);
    print!("{}", log.text);

    services.invalid_assets().mark_invalid("desert.lvl", "unknown tile 'Q'");
    println!("Invalid assets: {}", services.invalid_assets().to_json()?);
    Ok(())
}
