//! Benchmarks for the judgment pipeline
//!
//! Measures reference resolution, tolerance evaluation, extraction over
//! large job outputs, and concurrent batch judgment.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use perfcheck::checks::{CheckInstance, JudgePolicy, RunOutput};
use perfcheck::{
    evaluate, Aggregate, CheckRegistry, Dimension, Extraction, ReferenceEntry, ReferenceTable,
    Runner, SelectorContext,
};
use tokio::runtime::Runtime;

/// Benchmark reference lookups through tables of growing depth
fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    let flat = ReferenceTable::builder()
        .entry(&[], "cyclone:cpu", "latency", ReferenceEntry::new(2.79, None, Some(0.1), "us"))
        .build()
        .unwrap();
    let flat_context = SelectorContext::new("cyclone:cpu", "PrgEnv-gnu-nocuda").unwrap();
    group.bench_function("flat", |b| {
        b.iter(|| flat.resolve(black_box(&flat_context), black_box("latency")))
    });

    let mut nested = ReferenceTable::builder()
        .dimension(Dimension::Benchmark)
        .dimension(Dimension::NumNodes);
    for benchmark in ["nvme", "scratch", "lustre", "home"] {
        for nodes in 1u32..=64 {
            nested = nested.entry(
                &[benchmark.into(), nodes.into()],
                "cyclone:cpu",
                "rate",
                ReferenceEntry::new(nodes as f64, Some(-0.8), Some(0.8), "GB/s"),
            );
        }
    }
    let nested = nested.build().unwrap();
    let nested_context = SelectorContext::new("cyclone:cpu", "PrgEnv-gnu-nocuda")
        .unwrap()
        .with(Dimension::Benchmark, "lustre")
        .with(Dimension::NumNodes, 48u32);
    group.bench_function("nested_hit", |b| {
        b.iter(|| nested.resolve(black_box(&nested_context), black_box("rate")))
    });

    let missing_context = SelectorContext::new("cyclone:cpu", "PrgEnv-gnu-nocuda")
        .unwrap()
        .with(Dimension::Benchmark, "lustre")
        .with(Dimension::NumNodes, 128u32);
    group.bench_function("nested_miss", |b| {
        b.iter(|| nested.resolve(black_box(&missing_context), black_box("rate")))
    });

    group.finish();
}

/// Benchmark tolerance evaluation
fn bench_evaluation(c: &mut Criterion) {
    let reference = ReferenceEntry::new(100.0, Some(-0.05), Some(0.05), "MB/s");
    c.bench_function("evaluate", |b| {
        b.iter(|| evaluate(black_box("triad"), black_box(96.0), black_box(&reference)))
    });
}

/// Benchmark extraction over outputs of growing size
fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let extraction = Extraction::named(r"Epoch\s+\d+:\s+(?P<rate>\S+)\s+images", "rate")
        .unwrap()
        .aggregate(Aggregate::Mean);

    for epochs in [10usize, 100, 1000] {
        let text: String = (0..epochs)
            .map(|i| format!("Epoch {i:>4}: {:.2} images/sec\n", 300.0 + (i % 17) as f64))
            .collect();
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("mean", epochs), &text, |b, text| {
            b.iter(|| extraction.extract(black_box(text)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark concurrent judgment of a batch of runs
fn bench_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = CheckRegistry::builtin().unwrap();
    let spec = registry.get("AllocSpeedTest").unwrap();
    let instance = CheckInstance::from_pairs(spec, "cyclone:cpu", "PrgEnv-gnu-nocuda", &[]).unwrap();
    let output = RunOutput::new("4096 MB, allocation time 0.30\n");

    let mut group = c.benchmark_group("judge_batch");
    for size in [1usize, 16, 128] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let runner = Runner::new(JudgePolicy::default(), 8, None);
            b.to_async(&rt).iter(|| {
                let jobs = vec![(instance.clone(), output.clone()); size];
                let runner = runner.clone();
                async move { runner.judge_batch(black_box(jobs)).await }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_resolution,
    bench_evaluation,
    bench_extraction,
    bench_batch
);
criterion_main!(benches);
