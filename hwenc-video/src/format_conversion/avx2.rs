//! 256-bit kernels, 32 pixels per step
//!
//! Same contract as the 128-bit tier with 32-byte alignment and a width that
//! is a multiple of 32. Most 256-bit instructions work per 128-bit lane, so
//! results that cross lanes get a fixing permute before they are stored.

use std::arch::x86_64::*;

use super::{assert_tier_preconditions, ConversionKind, KernelParams};
use crate::capabilities::Tier;
use crate::types::{PixelSurface, PixelSurfaceMut};

const STEP: usize = 32;

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load(p: *const u8) -> __m256i {
    _mm256_load_si256(p as *const __m256i)
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn store(p: *mut u8, v: __m256i) {
    _mm256_store_si256(p as *mut __m256i, v)
}

/// packus_epi16 with the 64-bit blocks put back in source order
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn pack_u16(a: __m256i, b: __m256i) -> __m256i {
    _mm256_permute4x64_epi64::<0b11_01_10_00>(_mm256_packus_epi16(a, b))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn even_bytes(a: __m256i, b: __m256i) -> __m256i {
    let mask = _mm256_set1_epi16(0x00FF);
    pack_u16(_mm256_and_si256(a, mask), _mm256_and_si256(b, mask))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn odd_bytes(a: __m256i, b: __m256i) -> __m256i {
    pack_u16(_mm256_srli_epi16::<8>(a), _mm256_srli_epi16::<8>(b))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn swap_pairs() -> __m256i {
    _mm256_setr_epi8(
        1, 0, 3, 2, 5, 4, 7, 6, 9, 8, 11, 10, 13, 12, 15, 14, //
        1, 0, 3, 2, 5, 4, 7, 6, 9, 8, 11, 10, 13, 12, 15, 14,
    )
}

/// Dword order that undoes an in-lane unpack of two 4-dword groups
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn interleave_lanes() -> __m256i {
    _mm256_setr_epi32(0, 4, 1, 5, 2, 6, 3, 7)
}

#[target_feature(enable = "avx2")]
unsafe fn copy_luma(
    src: &PixelSurface<'_>,
    luma: &mut [u8],
    stride: usize,
    width: usize,
    height: usize,
) {
    for y in 0..height {
        let s = src.planes[0].as_ptr().add(y * src.strides[0]);
        let d = luma.as_mut_ptr().add(y * stride);
        for x in (0..width).step_by(STEP) {
            store(d.add(x), load(s.add(x)));
        }
    }
}

/// I420 to NV12 or NV21
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn i420_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Avx2,
        src,
        &dst.as_const(),
        ConversionKind::PlanarToInterleaved420,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();

    copy_luma(src, luma, strides[0], width, height);

    for j in 0..height.div_ceil(2) {
        let u = src.planes[1].as_ptr().add(j * src.strides[1]);
        let v = src.planes[2].as_ptr().add(j * src.strides[2]);
        let d = chroma.as_mut_ptr().add(j * strides[1]);

        for x in (0..width).step_by(STEP) {
            let u_bytes = _mm_load_si128(u.add(x / 2) as *const __m128i);
            let v_bytes = _mm_load_si128(v.add(x / 2) as *const __m128i);
            let (first, second) = if params.swap_uv {
                (v_bytes, u_bytes)
            } else {
                (u_bytes, v_bytes)
            };
            let lo = _mm_unpacklo_epi8(first, second);
            let hi = _mm_unpackhi_epi8(first, second);
            store(d.add(x), _mm256_set_m128i(hi, lo));
        }
    }
}

/// NV12 or NV21 to I420
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn nv12_to_i420(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Avx2,
        src,
        &dst.as_const(),
        ConversionKind::InterleavedToPlanar420,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, u_plane, v_plane] = dst.planes_mut();
    let (first_plane, first_stride, second_plane, second_stride) = if params.swap_uv {
        (v_plane, strides[2], u_plane, strides[1])
    } else {
        (u_plane, strides[1], v_plane, strides[2])
    };

    copy_luma(src, luma, strides[0], width, height);

    for j in 0..height.div_ceil(2) {
        let s = src.planes[1].as_ptr().add(j * src.strides[1]);
        let d0 = first_plane.as_mut_ptr().add(j * first_stride);
        let d1 = second_plane.as_mut_ptr().add(j * second_stride);

        for x in (0..width).step_by(STEP) {
            let uv = load(s.add(x));
            // 16 first-position bytes in the low lane, 16 second-position in the high
            let split = _mm256_permute4x64_epi64::<0b11_01_10_00>(_mm256_packus_epi16(
                _mm256_and_si256(uv, _mm256_set1_epi16(0x00FF)),
                _mm256_srli_epi16::<8>(uv),
            ));
            _mm_store_si128(d0.add(x / 2) as *mut __m128i, _mm256_castsi256_si128(split));
            _mm_store_si128(d1.add(x / 2) as *mut __m128i, _mm256_extracti128_si256::<1>(split));
        }
    }
}

/// VUYA to I444, bottom row first
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn vuya_to_i444(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    _params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Avx2,
        src,
        &dst.as_const(),
        ConversionKind::Packed444ToPlanar444,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [y_plane, u_plane, v_plane] = dst.planes_mut();

    let gather = _mm256_setr_epi8(
        0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15, //
        0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15,
    );
    let order = interleave_lanes();

    for y in 0..height {
        let s = src.planes[0].as_ptr().add(y * src.strides[0]);
        let flipped = height - 1 - y;
        let dy = y_plane.as_mut_ptr().add(flipped * strides[0]);
        let du = u_plane.as_mut_ptr().add(flipped * strides[1]);
        let dv = v_plane.as_mut_ptr().add(flipped * strides[2]);

        for x in (0..width).step_by(STEP) {
            let p = s.add(x * 4);
            let s0 = _mm256_shuffle_epi8(load(p), gather);
            let s1 = _mm256_shuffle_epi8(load(p.add(32)), gather);
            let s2 = _mm256_shuffle_epi8(load(p.add(64)), gather);
            let s3 = _mm256_shuffle_epi8(load(p.add(96)), gather);

            let vu_lo = _mm256_unpacklo_epi32(s0, s1);
            let vu_hi = _mm256_unpacklo_epi32(s2, s3);
            let ya_lo = _mm256_unpackhi_epi32(s0, s1);
            let ya_hi = _mm256_unpackhi_epi32(s2, s3);

            let v = _mm256_unpacklo_epi64(vu_lo, vu_hi);
            let u = _mm256_unpackhi_epi64(vu_lo, vu_hi);
            let luma = _mm256_unpacklo_epi64(ya_lo, ya_hi);

            store(dv.add(x), _mm256_permutevar8x32_epi32(v, order));
            store(du.add(x), _mm256_permutevar8x32_epi32(u, order));
            store(dy.add(x), _mm256_permutevar8x32_epi32(luma, order));
        }
    }
}

/// UYVY or YUY2 to NV12 or NV21
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn packed422_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Avx2,
        src,
        &dst.as_const(),
        ConversionKind::Packed422ToInterleaved420,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();
    let swap = swap_pairs();

    for j in 0..height / 2 {
        let r0 = src.planes[0].as_ptr().add(2 * j * src.strides[0]);
        let r1 = r0.add(src.strides[0]);
        let y0 = luma.as_mut_ptr().add(2 * j * strides[0]);
        let y1 = y0.add(strides[0]);
        let uv = chroma.as_mut_ptr().add(j * strides[1]);

        for x in (0..width).step_by(STEP) {
            let a0 = load(r0.add(x * 2));
            let a1 = load(r0.add(x * 2 + 32));
            let b0 = load(r1.add(x * 2));
            let b1 = load(r1.add(x * 2 + 32));
            let c0 = _mm256_avg_epu8(a0, b0);
            let c1 = _mm256_avg_epu8(a1, b1);

            let (top, bottom, mut pairs) = if params.luma_first {
                (even_bytes(a0, a1), even_bytes(b0, b1), odd_bytes(c0, c1))
            } else {
                (odd_bytes(a0, a1), odd_bytes(b0, b1), even_bytes(c0, c1))
            };
            if params.swap_uv {
                pairs = _mm256_shuffle_epi8(pairs, swap);
            }

            store(y0.add(x), top);
            store(y1.add(x), bottom);
            store(uv.add(x), pairs);
        }
    }
}

/// B, G, R of eight float pixels starting at `p`
///
/// The low lane holds pixels 0-3 and the high lane pixels 4-7, so the
/// results come out in pixel order.
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load_bgr(p: *const f32) -> (__m256, __m256, __m256) {
    let q0 = pixel_pair(p, 0);
    let q1 = pixel_pair(p, 1);
    let q2 = pixel_pair(p, 2);
    let q3 = pixel_pair(p, 3);

    let bg01 = _mm256_unpacklo_ps(q0, q1);
    let bg23 = _mm256_unpacklo_ps(q2, q3);
    let ra01 = _mm256_unpackhi_ps(q0, q1);
    let ra23 = _mm256_unpackhi_ps(q2, q3);

    (
        _mm256_shuffle_ps::<0b01_00_01_00>(bg01, bg23),
        _mm256_shuffle_ps::<0b11_10_11_10>(bg01, bg23),
        _mm256_shuffle_ps::<0b01_00_01_00>(ra01, ra23),
    )
}

/// Pixel `k` in the low lane, pixel `k + 4` in the high lane
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn pixel_pair(p: *const f32, k: usize) -> __m256 {
    let low = _mm256_castps128_ps256(_mm_load_ps(p.add(4 * k)));
    _mm256_insertf128_ps::<1>(low, _mm_load_ps(p.add(16 + 4 * k)))
}

#[derive(Clone, Copy)]
struct Row {
    r: __m256,
    g: __m256,
    b: __m256,
    offset: __m256,
}

impl Row {
    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn new(c: &[f32; 4]) -> Self {
        Self {
            r: _mm256_set1_ps(c[0]),
            g: _mm256_set1_ps(c[1]),
            b: _mm256_set1_ps(c[2]),
            offset: _mm256_set1_ps(c[3]),
        }
    }

    /// Eight samples as i32, clamped to 0..=255 and truncated
    #[inline]
    #[target_feature(enable = "avx2")]
    unsafe fn apply(&self, b: __m256, g: __m256, r: __m256) -> __m256i {
        let v = _mm256_add_ps(_mm256_mul_ps(r, self.r), _mm256_mul_ps(g, self.g));
        let v = _mm256_add_ps(v, _mm256_mul_ps(b, self.b));
        let v = _mm256_add_ps(v, self.offset);
        let v = _mm256_min_ps(_mm256_max_ps(v, _mm256_setzero_ps()), _mm256_set1_ps(255.0));
        _mm256_cvttps_epi32(v)
    }
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn coefficient_rows(params: &KernelParams) -> [Row; 3] {
    let [y, u, v] = &params.coefficients.rows;
    [Row::new(y), Row::new(u), Row::new(v)]
}

/// Thirty-two i32 samples in 0..=255 narrowed to bytes in pixel order
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn pack(q: &[__m256i; 4]) -> __m256i {
    let bytes = _mm256_packus_epi16(_mm256_packs_epi32(q[0], q[1]), _mm256_packs_epi32(q[2], q[3]));
    _mm256_permutevar8x32_epi32(bytes, interleave_lanes())
}

/// Y, U, V bytes of 32 pixels starting at `p`
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn rgb32(p: *const f32, rows: &[Row; 3]) -> [__m256i; 3] {
    let mut out = [[_mm256_setzero_si256(); 4]; 3];
    for k in 0..4 {
        let (b, g, r) = load_bgr(p.add(k * 32));
        for (plane, row) in rows.iter().enumerate() {
            out[plane][k] = row.apply(b, g, r);
        }
    }

    [pack(&out[0]), pack(&out[1]), pack(&out[2])]
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn box_mean(a: __m256i, b: __m256i) -> __m256i {
    let ones = _mm256_set1_epi8(1);
    let sum = _mm256_add_epi16(_mm256_maddubs_epi16(a, ones), _mm256_maddubs_epi16(b, ones));
    _mm256_srli_epi16::<2>(_mm256_add_epi16(sum, _mm256_set1_epi16(2)))
}

/// BGRA float to I444, bottom row first
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn bgra_f32_to_i444(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(Tier::Avx2, src, &dst.as_const(), ConversionKind::RgbToPlanar444);

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [y_plane, u_plane, v_plane] = dst.planes_mut();
    let rows = coefficient_rows(params);

    for y in 0..height {
        let s = src.planes[0].as_ptr().add(y * src.strides[0]) as *const f32;
        let flipped = height - 1 - y;
        let dy = y_plane.as_mut_ptr().add(flipped * strides[0]);
        let du = u_plane.as_mut_ptr().add(flipped * strides[1]);
        let dv = v_plane.as_mut_ptr().add(flipped * strides[2]);

        for x in (0..width).step_by(STEP) {
            let [py, pu, pv] = rgb32(s.add(x * 4), &rows);
            store(dy.add(x), py);
            store(du.add(x), pu);
            store(dv.add(x), pv);
        }
    }
}

/// BGRA float to NV12 or NV21, bottom row first
///
/// # Safety
/// Requires AVX2.
#[target_feature(enable = "avx2")]
pub unsafe fn bgra_f32_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Avx2,
        src,
        &dst.as_const(),
        ConversionKind::RgbToInterleaved420,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();
    let rows = coefficient_rows(params);

    for j in 0..height / 2 {
        let base = src.planes[0].as_ptr();
        let top = base.add((height - 1 - 2 * j) * src.strides[0]) as *const f32;
        let bottom = base.add((height - 2 - 2 * j) * src.strides[0]) as *const f32;
        let y0 = luma.as_mut_ptr().add(2 * j * strides[0]);
        let y1 = y0.add(strides[0]);
        let uv = chroma.as_mut_ptr().add(j * strides[1]);

        for x in (0..width).step_by(STEP) {
            let [ya, ua, va] = rgb32(top.add(x * 4), &rows);
            let [yb, ub, vb] = rgb32(bottom.add(x * 4), &rows);
            store(y0.add(x), ya);
            store(y1.add(x), yb);

            let u = box_mean(ua, ub);
            let v = box_mean(va, vb);
            let pairs = if params.swap_uv {
                _mm256_or_si256(v, _mm256_slli_epi16::<8>(u))
            } else {
                _mm256_or_si256(u, _mm256_slli_epi16::<8>(v))
            };
            store(uv.add(x), pairs);
        }
    }
}
