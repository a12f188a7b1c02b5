//! # Resolution Benchmarks
//!
//! Performance benchmarks for modlink-core resolution.
//!
//! Run with: `cargo bench -p modlink-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use modlink_core::{Context, Identifier, LoadQueue, ResolverConfig, normalize, resolve_relative};
use std::hint::black_box;

fn context(queue: &LoadQueue) -> Context {
    let config = ResolverConfig {
        document_base: Identifier::parse("file:///bench/").expect("base"),
        ..ResolverConfig::default()
    };
    Context::new(queue.clone(), config)
}

/// Complete every outstanding load by calling `declare` for it.
fn pump(ctx: &mut Context, queue: &LoadQueue, mut declare: impl FnMut(&mut Context, &Identifier)) {
    while let Some(next) = queue.pop() {
        ctx.announce(&next).expect("announce");
        declare(ctx, &next);
        ctx.finish_load(&next).expect("finish");
    }
}

/// Unit i depends on unit i+1, up to `size`.
fn resolve_chain(size: usize) -> Context {
    let queue = LoadQueue::new();
    let mut ctx = context(&queue);
    ctx.define(["./m0.js"], None).expect("define");

    pump(&mut ctx, &queue, |ctx, id| {
        let n: usize = id
            .as_str()
            .trim_start_matches("file:///bench/m")
            .trim_end_matches(".js")
            .parse()
            .expect("index");
        let deps: Vec<String> = if n + 1 < size {
            vec![format!("./m{}.js", n + 1)]
        } else {
            Vec::new()
        };
        ctx.define(deps, None).expect("define");
    });
    ctx
}

/// `width` modules all sharing one leaf.
fn resolve_diamond(width: usize) -> Context {
    let queue = LoadQueue::new();
    let mut ctx = context(&queue);
    let sides: Vec<String> = (0..width).map(|i| format!("./side{i}.js")).collect();
    ctx.define(sides, None).expect("define");

    pump(&mut ctx, &queue, |ctx, id| {
        if id.as_str().ends_with("leaf.js") {
            ctx.define(Vec::<String>::new(), None).expect("define");
        } else {
            ctx.define(["./leaf.js"], None).expect("define");
        }
    });
    ctx
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_normalize(c: &mut Criterion) {
    let base = Identifier::parse("https://cdn.example.com/app/pages/").expect("base");

    c.bench_function("normalize_absolute", |b| {
        b.iter(|| black_box(normalize("HTTPS://CDN.example.com/app/./lib/../x.js")));
    });
    c.bench_function("resolve_relative", |b| {
        b.iter(|| black_box(resolve_relative(&base, "../shared/util.js")));
    });
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_chain");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(resolve_chain(size)));
        });
    }

    group.finish();
}

fn bench_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_diamond");

    for width in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            b.iter(|| black_box(resolve_diamond(width)));
        });
    }

    group.finish();
}

fn bench_top_level_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_level_sequence");

    for count in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let queue = LoadQueue::new();
                let mut ctx = context(&queue);
                for _ in 0..count {
                    ctx.define(Vec::<String>::new(), None).expect("define");
                }
                black_box(ctx)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_chain,
    bench_diamond,
    bench_top_level_sequence,
);

criterion_main!(benches);
