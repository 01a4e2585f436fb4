use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use voxflow::audio::{PcmRingBuffer, ShapingConfig, shape_segment};
use voxflow::defaults;

/// One device callback's worth of samples at common period sizes.
const PERIODS: [usize; 3] = [256, 1024, 4096];

fn write_read_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_write_read");

    for &period in &PERIODS {
        let ring = PcmRingBuffer::new(defaults::RING_CAPACITY_SAMPLES);
        let chunk = vec![1234i16; period];
        let mut out = vec![0i16; period];

        group.throughput(Throughput::Elements(period as u64));
        group.bench_with_input(BenchmarkId::from_parameter(period), &period, |b, _| {
            b.iter(|| {
                ring.write(black_box(&chunk));
                black_box(ring.read_into(&mut out));
            });
        });
    }

    group.finish();
}

fn concurrent_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_concurrent");
    group.sample_size(20);

    // One second of audio pushed by a writer thread while the caller drains it.
    let total = defaults::SAMPLE_RATE as usize;
    group.throughput(Throughput::Elements(total as u64));
    group.bench_function("one_second_22k", |b| {
        b.iter(|| {
            let ring = Arc::new(PcmRingBuffer::new(8192));
            let writer_ring = Arc::clone(&ring);
            let writer = thread::spawn(move || {
                let chunk = vec![7i16; 1024];
                let mut sent = 0;
                while sent < total {
                    let n = writer_ring.write(&chunk[..(total - sent).min(chunk.len())]);
                    if n == 0 {
                        thread::yield_now();
                    }
                    sent += n;
                }
                writer_ring.mark_finished();
            });

            let mut out = vec![0i16; 512];
            let mut received = 0;
            while !ring.is_drained() {
                let n = ring.read_into(&mut out);
                if n == 0 {
                    thread::yield_now();
                }
                received += n;
            }
            let _ = writer.join();
            black_box(received)
        });
    });

    group.finish();
}

fn segment_shaping(c: &mut Criterion) {
    let config = ShapingConfig::default();
    // Two seconds of a quiet ramp.
    let segment: Vec<i16> = (0..defaults::SAMPLE_RATE as usize * 2)
        .map(|i| ((i % 2000) as i16) - 1000)
        .collect();

    c.bench_function("shape_segment_2s", |b| {
        b.iter(|| {
            let mut samples = segment.clone();
            shape_segment(black_box(&mut samples), defaults::SAMPLE_RATE, &config);
            black_box(samples)
        });
    });
}

criterion_group!(benches, write_read_cycle, concurrent_producer, segment_shaping);
criterion_main!(benches);
