//! Benchmarks for hwenc-video
//!
//! Measures each conversion kernel at 1080p on every tier the CPU supports.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hwenc_video::{convert_with_tier, AlignedFrame, ColorMatrix, CpuFeatures, FormatTag, Tier};

const WIDTH: usize = 1920;
const HEIGHT: usize = 1080;

fn bench_conversions(c: &mut Criterion) {
    let pairs = [
        ("i420_to_nv12", FormatTag::I420, FormatTag::Nv12),
        ("nv12_to_i420", FormatTag::Nv12, FormatTag::I420),
        ("vuya_to_i444", FormatTag::Vuya, FormatTag::I444),
        ("uyvy_to_nv12", FormatTag::Uyvy, FormatTag::Nv12),
        ("bgra_f32_to_i444", FormatTag::BgraF32, FormatTag::I444),
        ("bgra_f32_to_nv12", FormatTag::BgraF32, FormatTag::Nv12),
    ];

    for (name, src_format, dst_format) in pairs {
        let mut group = c.benchmark_group(name);
        group.throughput(Throughput::Elements((WIDTH * HEIGHT) as u64));

        let src = AlignedFrame::new(src_format, WIDTH, HEIGHT).unwrap();
        let mut dst = AlignedFrame::new(dst_format, WIDTH, HEIGHT).unwrap();

        for tier in Tier::ALL {
            if !CpuFeatures::get().has(tier) {
                continue;
            }

            group.bench_with_input(BenchmarkId::from_parameter(tier.name()), &tier, |b, &tier| {
                b.iter(|| {
                    convert_with_tier(
                        tier,
                        &src.surface(),
                        &mut dst.surface_mut(),
                        ColorMatrix::default(),
                    )
                    .unwrap();
                    black_box(dst.plane(0)[0]);
                });
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_conversions);
criterion_main!(benches);
