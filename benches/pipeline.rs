//! Criterion benchmarks for the pipeline hot paths.
//!
//! These benchmarks establish performance baselines for the stages a live
//! stream passes through, sized against the 80 MS/s hardware rate the
//! acquisition side must keep up with.
//!
//! Key metrics:
//! - FFT transform throughput (samples/sec) by window size
//! - Front-end ingest throughput under downstream saturation
//! - Envelope normalization cost per window
//! - Time-domain ring write and snapshot latency
//!
//! Run with: cargo bench --bench pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spectra_daq::acquire::{AcquireCounters, FrontEnd};
use spectra_daq::envelope::EnvelopeNormalizer;
use spectra_daq::pool::WindowPool;
use spectra_daq::queue::WindowQueue;
use spectra_daq::ring::TimeRing;
use spectra_daq::transform::WindowTransform;
use spectra_daq::{Mode, PipelineConfig};
use std::f64::consts::TAU;
use std::sync::Arc;

fn bench_config(window_size: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .window_size(window_size)
        .build()
        .unwrap()
}

fn tone_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 30_000.0 + 5_000.0 * (TAU * 0.05 * i as f64).sin())
        .collect()
}

fn tone_chunk(len: usize) -> Vec<u16> {
    (0..len)
        .map(|i| (30_000.0 + 5_000.0 * (TAU * 0.05 * i as f64).sin()) as u16)
        .collect()
}

/// Benchmark the FFT plus magnitude-and-peak scan for each window size.
///
/// This is the per-window cost each transform worker pays, and with the
/// default 50% overlap it directly bounds how many workers a given sample
/// rate needs.
fn fft_transform_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("fft_transform");

    for window_size in [1024usize, 4096, 16384] {
        let config = bench_config(window_size);
        let mut transform = WindowTransform::new(&config, Mode::FullBandwidth);
        let samples = tone_window(window_size);

        group.throughput(Throughput::Elements(window_size as u64));
        group.bench_with_input(
            BenchmarkId::new("process", window_size),
            &window_size,
            |b, _| {
                b.iter(|| {
                    let peak = transform.process(black_box(&samples));
                    black_box(peak);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the device-callback ingest path with nothing consuming windows.
///
/// With no workers attached the pool drains after a few windows, so the
/// steady state measured here is the saturated recycle path: decimation,
/// ring hand-off, window fill, and the overlap slide on every completion.
/// That is the worst case the delivery thread can see.
fn front_end_consume_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end_consume");

    let config = bench_config(4096);
    for (name, mode) in [
        ("full_bandwidth", Mode::FullBandwidth),
        ("low_bandwidth", Mode::LowBandwidth),
    ] {
        let pool = Arc::new(WindowPool::new(
            config.queue_capacity,
            config.window_size,
        ));
        let queue = Arc::new(WindowQueue::new(config.queue_capacity));
        let ring = Arc::new(TimeRing::new(config.ring_len(mode)));
        let counters = Arc::new(AcquireCounters::default());
        let mut front_end = FrontEnd::new(
            &config,
            mode,
            Arc::clone(&pool),
            Arc::clone(&queue),
            Arc::clone(&ring),
            Arc::clone(&counters),
        );

        let chunk = tone_chunk(65_536);

        group.throughput(Throughput::Elements(chunk.len() as u64));
        group.bench_with_input(BenchmarkId::new("consume", name), &mode, |b, _| {
            b.iter(|| {
                front_end.consume(black_box(&chunk), false);
            });
        });
    }

    group.finish();
}

/// Benchmark the analytic-envelope normalization of one window.
///
/// Two extra FFTs per window, so enabling it roughly triples the transform
/// cost; this pins down the actual ratio.
fn envelope_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_normalize");

    for window_size in [1024usize, 4096] {
        let mut normalizer = EnvelopeNormalizer::new(window_size);
        let mut samples = tone_window(window_size);

        group.throughput(Throughput::Elements(window_size as u64));
        group.bench_with_input(
            BenchmarkId::new("normalize", window_size),
            &window_size,
            |b, _| {
                b.iter(|| {
                    normalizer.normalize(black_box(&mut samples));
                });
            },
        );
    }

    group.finish();
}

/// Benchmark time-domain ring writes and snapshot reads.
///
/// Writes happen once per device chunk on the delivery thread; reads come
/// from display code and must not disturb the writer.
fn time_ring_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("time_ring");

    let ring = TimeRing::new(1 << 20);
    for chunk_size in [16_384usize, 65_536] {
        let chunk = tone_chunk(chunk_size);

        group.throughput(Throughput::Elements(chunk_size as u64));
        group.bench_with_input(
            BenchmarkId::new("write", chunk_size),
            &chunk_size,
            |b, _| {
                b.iter(|| {
                    ring.write(black_box(&chunk));
                });
            },
        );
    }

    let mut snapshot = vec![0u16; ring.len()];
    group.bench_function("read_snapshot", |b| {
        b.iter(|| {
            let copied = ring.read_into(black_box(&mut snapshot));
            black_box(copied);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    fft_transform_throughput,
    front_end_consume_throughput,
    envelope_normalize,
    time_ring_ops
);
criterion_main!(benches);
