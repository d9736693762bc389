//! Image decoding benchmarks
//!
//! Measures geometry validation plus buffer extraction for common detector
//! frame shapes. The record is built once outside the timed loop.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pvlink::protocol::image::decode;
use pvlink::protocol::record::{ImageRecord, ScalarArray};

fn bench_rgb_full_hd(c: &mut Criterion) {
    let record = ImageRecord::new(
        ScalarArray::UByte(vec![127; 3 * 1920 * 1080]),
        &[3, 1920, 1080],
    )
    .with_color_mode(2);

    c.bench_function("decode_rgb_1920x1080_ubyte", |b| {
        b.iter(|| {
            let image = decode(black_box(&record)).unwrap();
            black_box(image)
        });
    });
}

fn bench_mono_ushort(c: &mut Criterion) {
    let pixels: Vec<u16> = (0..2048 * 2048).map(|i| (i % 65_536) as u16).collect();
    let record = ImageRecord::new(ScalarArray::UShort(pixels), &[2048, 2048]).with_color_mode(0);

    c.bench_function("decode_mono_2048x2048_ushort", |b| {
        b.iter(|| {
            let image = decode(black_box(&record)).unwrap();
            black_box(image)
        });
    });
}

fn bench_small_frames(c: &mut Criterion) {
    let record = ImageRecord::new(ScalarArray::Float(vec![0.25; 64 * 64]), &[64, 64]);

    c.bench_function("decode_100_frames_64x64_float", |b| {
        b.iter(|| {
            let mut total = 0;
            for _ in 0..100 {
                total += decode(&record).unwrap().element_count();
            }
            black_box(total)
        });
    });
}

criterion_group!(benches, bench_rgb_full_hd, bench_mono_ushort, bench_small_frames);

criterion_main!(benches);
