use criterion::{criterion_group, criterion_main, Criterion};
use pyxis_build::{BuildManager, BuildSource, MemoryResolver, MemoryStore, NoCache, Options};
use std::sync::Arc;

/// `main` imports a chain of `depth` modules, each importing the previous one
fn chain(depth: usize) -> MemoryResolver {
    let mut resolver = MemoryResolver::new();
    resolver.insert("m0", "def value0() -> int:\n    return 0\n", false);
    for i in 1..depth {
        let source = format!(
            "from m{prev} import value{prev}\n\ndef value{i}() -> int:\n    return value{prev}() + 1\n",
            prev = i - 1
        );
        resolver.insert(&format!("m{}", i), &source, false);
    }
    resolver.insert(
        "main",
        &format!("from m{last} import value{last}\n\nresult = value{last}()\n", last = depth - 1),
        false,
    );
    resolver
}

fn benchmark_cold_build(c: &mut Criterion) {
    let resolver = Arc::new(chain(20));
    c.bench_function("build_chain_20_cold", |b| {
        b.iter(|| {
            let manager = BuildManager::new(Options::default(), resolver.clone(), Arc::new(NoCache));
            manager.build(&[BuildSource::module("main")]).unwrap()
        })
    });
}

fn benchmark_warm_build(c: &mut Criterion) {
    let resolver = Arc::new(chain(20));
    let store = Arc::new(MemoryStore::new());
    let manager = BuildManager::new(Options::default(), resolver, store);
    manager.build(&[BuildSource::module("main")]).unwrap();

    c.bench_function("build_chain_20_cached", |b| {
        b.iter(|| manager.build(&[BuildSource::module("main")]).unwrap())
    });
}

criterion_group!(benches, benchmark_cold_build, benchmark_warm_build);
criterion_main!(benches);
