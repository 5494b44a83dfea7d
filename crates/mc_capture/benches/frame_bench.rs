use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use mc_capture::{BufferPool, Frame, FrameMailbox, FrameShape, MappedSurface};

const SIZES: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];

/// Row copy out of a padded staging surface.
fn bench_copy_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("MappedSurface");

    for (width, height) in SIZES {
        let shape = FrameShape::packed(width, height);
        let pitch = shape.stride + 64;
        let src = vec![0x5Au8; pitch * height as usize];
        let mut dst = vec![0u8; shape.byte_len()];

        group.bench_with_input(
            BenchmarkId::new("copy_into", format!("{width}x{height}")),
            &shape,
            |b, &shape| {
                b.iter(|| {
                    let mapped = MappedSurface {
                        bytes: black_box(&src),
                        pitch,
                    };
                    mapped.copy_into(shape, &mut dst).unwrap();
                    black_box(&dst);
                });
            },
        );
    }

    group.finish();
}

/// Buffer recycling against fresh allocation.
fn bench_buffer_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");
    let shape = FrameShape::packed(1920, 1080);

    group.bench_function("take_give_back", |b| {
        let pool = BufferPool::new();
        pool.reshape(shape);
        b.iter(|| {
            let buffer = pool.take(black_box(shape));
            pool.give_back(shape, buffer);
        });
    });

    group.bench_function("fresh_alloc", |b| {
        b.iter(|| black_box(vec![0u8; shape.byte_len()]));
    });

    group.finish();
}

/// Publish/pop through the latest-wins mailbox.
fn bench_mailbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("FrameMailbox");
    let shape = FrameShape::packed(64, 64);

    group.bench_function("publish_pop", |b| {
        let mailbox = FrameMailbox::new(Duration::from_millis(200));
        b.iter(|| {
            let frame = Frame::detached(shape, vec![0; shape.byte_len()], Instant::now()).unwrap();
            mailbox.publish(frame);
            black_box(mailbox.pop());
        });
    });

    group.bench_function("publish_overwrite", |b| {
        let mailbox = FrameMailbox::new(Duration::from_millis(200));
        b.iter(|| {
            let frame = Frame::detached(shape, vec![0; shape.byte_len()], Instant::now()).unwrap();
            black_box(mailbox.publish_at(frame, Instant::now()));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_copy_rows, bench_buffer_pool, bench_mailbox);
criterion_main!(benches);
