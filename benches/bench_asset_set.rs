use asset_sets::{
    Asset, AssetSet, AssetSetManager, ConstructFromInitializers, DependencyValidation, Result,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::sync::Arc;

// Simple mock asset
struct MockAsset {
    data: Vec<u8>,
    dep_val: DependencyValidation,
}

impl Asset for MockAsset {
    fn dependency_validation(&self) -> Option<&DependencyValidation> {
        Some(&self.dep_val)
    }
}

impl ConstructFromInitializers for MockAsset {
    fn construct(initializers: &[&str]) -> Result<Self> {
        Ok(MockAsset {
            data: initializers[0].as_bytes().to_vec(),
            dep_val: DependencyValidation::new(),
        })
    }
}

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("asset_{i}.bin")).collect()
}

fn bench_asset_hit(c: &mut Criterion) {
    let set = AssetSet::<MockAsset>::new();
    let names = names(1000);
    for name in &names {
        set.get(&[name.as_str()]).unwrap();
    }

    c.bench_function("asset_set_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let asset = set.get(&[black_box(names[i % names.len()].as_str())]).unwrap();
            black_box(asset.data.len());
            i += 1;
        });
    });

    c.bench_function("asset_set_hit_checked", |b| {
        let mut i = 0;
        b.iter(|| {
            let asset = set
                .get_checked(&[black_box(names[i % names.len()].as_str())])
                .unwrap();
            black_box(asset);
            i += 1;
        });
    });
}

fn bench_asset_miss_insert(c: &mut Criterion) {
    let names = names(1000);
    c.bench_function("asset_set_insert_1000", |b| {
        b.iter(|| {
            let set = AssetSet::<MockAsset>::new();
            for name in &names {
                set.get(&[name.as_str()]).unwrap();
            }
            black_box(set.len());
        });
    });
}

fn bench_stale_rebuild(c: &mut Criterion) {
    let set = AssetSet::<MockAsset>::new();
    c.bench_function("asset_set_stale_rebuild", |b| {
        b.iter(|| {
            let asset = set.get_checked(&["hot.bin"]).unwrap();
            asset.dep_val.on_change();
            black_box(set.get_checked(&["hot.bin"]).unwrap());
        });
    });
}

fn bench_concurrent_hit(c: &mut Criterion) {
    let manager = AssetSetManager::new();
    let set: Arc<AssetSet<MockAsset>> = manager.get_or_create_set().unwrap();
    let names = names(64);
    for name in &names {
        set.get(&[name.as_str()]).unwrap();
    }

    c.bench_function("asset_set_concurrent_hit", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let set = &set;
                    let names = &names;
                    scope.spawn(move || {
                        for i in 0..100 {
                            let name = names[(i + t) % names.len()].as_str();
                            black_box(set.get(&[name]).unwrap());
                        }
                    });
                }
            });
        });
    });
}

fn bench_frame_barrier(c: &mut Criterion) {
    let manager = AssetSetManager::new();
    for _ in 0..32 {
        manager.register_frame_barrier_callback(|| {
            black_box(0u32);
        });
    }
    c.bench_function("frame_barrier_32_callbacks", |b| {
        b.iter(|| manager.on_frame_barrier());
    });
}

criterion_group!(
    benches,
    bench_asset_hit,
    bench_asset_miss_insert,
    bench_stale_rebuild,
    bench_concurrent_hit,
    bench_frame_barrier
);
criterion_main!(benches);
