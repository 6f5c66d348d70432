//! # Channel Benchmark
//!
//! Measures:
//! 1. Uncontended read and write mappings (single-slot fast path)
//! 2. Reads while another thread keeps writing (dual slot)
//! 3. Stamp-driven uploads, stale vs. up to date

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tandem_core::{BufferChannel, DeviceLayout, ElementDesc, HostBuffer};

fn channel(vertices: u32) -> BufferChannel {
    let channel = BufferChannel::new("bench");
    channel
        .allocate_vertex_array(ElementDesc::vec3f(), vertices)
        .expect("allocation");
    channel
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_uncontended");

    for vertices in [64u32, 4_096, 262_144] {
        let channel = channel(vertices);
        group.throughput(Throughput::Bytes(u64::from(vertices) * 12));

        group.bench_with_input(BenchmarkId::new("map_read", vertices), &vertices, |b, _| {
            b.iter(|| {
                let view = channel.map_read::<[f32; 3]>().expect("map");
                black_box(view.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("map_write", vertices), &vertices, |b, _| {
            b.iter(|| {
                let mut view = channel.map_write::<[f32; 3]>().expect("map");
                view[0] = black_box([1.0, 2.0, 3.0]);
            });
        });
    }

    group.finish();
}

fn bench_set_element(c: &mut Criterion) {
    let channel = channel(4_096);

    c.bench_function("set_element_single_slot", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % 4_096;
            channel.set_element(black_box(i), &[1.0f32, 2.0, 3.0]).expect("write");
        });
    });
}

fn bench_read_under_write_load(c: &mut Criterion) {
    let channel = Arc::new(channel(4_096));
    let running = Arc::new(AtomicBool::new(true));

    let writer = {
        let channel = Arc::clone(&channel);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut value = 0.0f32;
            while running.load(Ordering::Relaxed) {
                value += 1.0;
                if let Ok(mut view) = channel.map_write::<[f32; 3]>() {
                    view.fill([value; 3]);
                }
            }
        })
    };

    c.bench_function("map_read_under_write_load", |b| {
        b.iter(|| {
            let view = channel.map_read::<[f32; 3]>().expect("map");
            black_box(view[0]);
        });
    });

    running.store(false, Ordering::Relaxed);
    writer.join().expect("writer thread");
}

fn bench_upload(c: &mut Criterion) {
    let mut group = c.benchmark_group("device_upload");
    let channel = channel(65_536);
    channel.attach_device_buffer(HostBuffer::new(65_536 * 12), DeviceLayout::packed(0));

    group.bench_function("stale", |b| {
        b.iter(|| {
            channel.next_stamp();
            black_box(channel.upload_if_stale().expect("upload"));
        });
    });

    group.bench_function("up_to_date", |b| {
        channel.upload_if_stale().expect("upload");
        b.iter(|| black_box(channel.upload_if_stale().expect("upload")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended,
    bench_set_element,
    bench_read_under_write_load,
    bench_upload,
);
criterion_main!(benches);
