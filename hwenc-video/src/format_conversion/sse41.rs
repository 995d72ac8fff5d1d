//! 128-bit kernels, 16 pixels per step
//!
//! Callers must have checked the tier (see `dispatch::check_tier`): planes
//! 16-byte aligned, strides a multiple of 16, width a multiple of 16 and,
//! for the paired kernels, an even height. Each kernel asserts this on entry.

use std::arch::x86_64::*;

use super::{assert_tier_preconditions, ConversionKind, KernelParams};
use crate::capabilities::Tier;
use crate::types::{PixelSurface, PixelSurfaceMut};

const STEP: usize = 16;

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn load(p: *const u8) -> __m128i {
    _mm_load_si128(p as *const __m128i)
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn store(p: *mut u8, v: __m128i) {
    _mm_store_si128(p as *mut __m128i, v)
}

/// Low byte of every 16-bit lane, packed
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn even_bytes(a: __m128i, b: __m128i) -> __m128i {
    let mask = _mm_set1_epi16(0x00FF);
    _mm_packus_epi16(_mm_and_si128(a, mask), _mm_and_si128(b, mask))
}

/// High byte of every 16-bit lane, packed
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn odd_bytes(a: __m128i, b: __m128i) -> __m128i {
    _mm_packus_epi16(_mm_srli_epi16::<8>(a), _mm_srli_epi16::<8>(b))
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn swap_pairs() -> __m128i {
    _mm_setr_epi8(1, 0, 3, 2, 5, 4, 7, 6, 9, 8, 11, 10, 13, 12, 15, 14)
}

#[target_feature(enable = "sse4.1")]
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
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn i420_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Sse41,
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
            let u8x8 = _mm_loadl_epi64(u.add(x / 2) as *const __m128i);
            let v8x8 = _mm_loadl_epi64(v.add(x / 2) as *const __m128i);
            let uv = if params.swap_uv {
                _mm_unpacklo_epi8(v8x8, u8x8)
            } else {
                _mm_unpacklo_epi8(u8x8, v8x8)
            };
            store(d.add(x), uv);
        }
    }
}

/// NV12 or NV21 to I420
///
/// # Safety
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn nv12_to_i420(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Sse41,
        src,
        &dst.as_const(),
        ConversionKind::InterleavedToPlanar420,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, u_plane, v_plane] = dst.planes_mut();
    let (u_plane, v_plane) = if params.swap_uv {
        (v_plane, u_plane)
    } else {
        (u_plane, v_plane)
    };
    let (u_stride, v_stride) = if params.swap_uv {
        (strides[2], strides[1])
    } else {
        (strides[1], strides[2])
    };

    copy_luma(src, luma, strides[0], width, height);

    for j in 0..height.div_ceil(2) {
        let s = src.planes[1].as_ptr().add(j * src.strides[1]);
        let du = u_plane.as_mut_ptr().add(j * u_stride);
        let dv = v_plane.as_mut_ptr().add(j * v_stride);

        for x in (0..width).step_by(STEP) {
            let uv = load(s.add(x));
            // First chroma byte of each pair in the low half, second in the high
            let split = even_bytes(uv, _mm_setzero_si128());
            let split = _mm_unpacklo_epi64(split, odd_bytes(uv, _mm_setzero_si128()));
            _mm_storel_epi64(du.add(x / 2) as *mut __m128i, split);
            _mm_storel_epi64(dv.add(x / 2) as *mut __m128i, _mm_unpackhi_epi64(split, split));
        }
    }
}

/// VUYA to I444, bottom row first
///
/// # Safety
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn vuya_to_i444(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    _params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Sse41,
        src,
        &dst.as_const(),
        ConversionKind::Packed444ToPlanar444,
    );

    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [y_plane, u_plane, v_plane] = dst.planes_mut();

    // Gather each channel of four pixels into one dword: V0-3 U0-3 Y0-3 A0-3
    let gather = _mm_setr_epi8(0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15);

    for y in 0..height {
        let s = src.planes[0].as_ptr().add(y * src.strides[0]);
        let flipped = height - 1 - y;
        let dy = y_plane.as_mut_ptr().add(flipped * strides[0]);
        let du = u_plane.as_mut_ptr().add(flipped * strides[1]);
        let dv = v_plane.as_mut_ptr().add(flipped * strides[2]);

        for x in (0..width).step_by(STEP) {
            let p = s.add(x * 4);
            let s0 = _mm_shuffle_epi8(load(p), gather);
            let s1 = _mm_shuffle_epi8(load(p.add(16)), gather);
            let s2 = _mm_shuffle_epi8(load(p.add(32)), gather);
            let s3 = _mm_shuffle_epi8(load(p.add(48)), gather);

            let vu_lo = _mm_unpacklo_epi32(s0, s1);
            let vu_hi = _mm_unpacklo_epi32(s2, s3);
            let ya_lo = _mm_unpackhi_epi32(s0, s1);
            let ya_hi = _mm_unpackhi_epi32(s2, s3);

            store(dv.add(x), _mm_unpacklo_epi64(vu_lo, vu_hi));
            store(du.add(x), _mm_unpackhi_epi64(vu_lo, vu_hi));
            store(dy.add(x), _mm_unpacklo_epi64(ya_lo, ya_hi));
        }
    }
}

/// UYVY or YUY2 to NV12 or NV21
///
/// # Safety
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn packed422_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Sse41,
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
            let a1 = load(r0.add(x * 2 + 16));
            let b0 = load(r1.add(x * 2));
            let b1 = load(r1.add(x * 2 + 16));
            let c0 = _mm_avg_epu8(a0, b0);
            let c1 = _mm_avg_epu8(a1, b1);

            let (top, bottom, mut pairs) = if params.luma_first {
                (even_bytes(a0, a1), even_bytes(b0, b1), odd_bytes(c0, c1))
            } else {
                (odd_bytes(a0, a1), odd_bytes(b0, b1), even_bytes(c0, c1))
            };
            if params.swap_uv {
                pairs = _mm_shuffle_epi8(pairs, swap);
            }

            store(y0.add(x), top);
            store(y1.add(x), bottom);
            store(uv.add(x), pairs);
        }
    }
}

/// B, G, R planes of four consecutive float pixels
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn load_bgr(p: *const f32) -> (__m128, __m128, __m128) {
    let p0 = _mm_load_ps(p);
    let p1 = _mm_load_ps(p.add(4));
    let p2 = _mm_load_ps(p.add(8));
    let p3 = _mm_load_ps(p.add(12));

    let bg01 = _mm_unpacklo_ps(p0, p1);
    let bg23 = _mm_unpacklo_ps(p2, p3);
    let ra01 = _mm_unpackhi_ps(p0, p1);
    let ra23 = _mm_unpackhi_ps(p2, p3);

    (
        _mm_movelh_ps(bg01, bg23),
        _mm_movehl_ps(bg23, bg01),
        _mm_movelh_ps(ra01, ra23),
    )
}

/// Broadcast coefficients for one output row
#[derive(Clone, Copy)]
struct Row {
    r: __m128,
    g: __m128,
    b: __m128,
    offset: __m128,
}

impl Row {
    #[inline]
    #[target_feature(enable = "sse4.1")]
    unsafe fn new(c: &[f32; 4]) -> Self {
        Self {
            r: _mm_set1_ps(c[0]),
            g: _mm_set1_ps(c[1]),
            b: _mm_set1_ps(c[2]),
            offset: _mm_set1_ps(c[3]),
        }
    }

    /// Four samples as i32, clamped to 0..=255 and truncated
    #[inline]
    #[target_feature(enable = "sse4.1")]
    unsafe fn apply(&self, b: __m128, g: __m128, r: __m128) -> __m128i {
        let v = _mm_add_ps(_mm_mul_ps(r, self.r), _mm_mul_ps(g, self.g));
        let v = _mm_add_ps(v, _mm_mul_ps(b, self.b));
        let v = _mm_add_ps(v, self.offset);
        let v = _mm_min_ps(_mm_max_ps(v, _mm_setzero_ps()), _mm_set1_ps(255.0));
        _mm_cvttps_epi32(v)
    }
}

/// Y, U, V bytes of 16 pixels starting at `p`
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn rgb16(p: *const f32, rows: &[Row; 3]) -> [__m128i; 3] {
    let mut out = [[_mm_setzero_si128(); 4]; 3];
    for k in 0..4 {
        let (b, g, r) = load_bgr(p.add(k * 16));
        for (plane, row) in rows.iter().enumerate() {
            out[plane][k] = row.apply(b, g, r);
        }
    }

    [pack(&out[0]), pack(&out[1]), pack(&out[2])]
}

/// Sixteen i32 samples in 0..=255 narrowed to bytes
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn pack(q: &[__m128i; 4]) -> __m128i {
    _mm_packus_epi16(_mm_packs_epi32(q[0], q[1]), _mm_packs_epi32(q[2], q[3]))
}

/// Rounded mean of each 2x2 block given two rows of 16 samples
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn box_mean(a: __m128i, b: __m128i) -> __m128i {
    let ones = _mm_set1_epi8(1);
    // Horizontal pair sums per row, then the vertical sum and rounding
    let sum = _mm_add_epi16(_mm_maddubs_epi16(a, ones), _mm_maddubs_epi16(b, ones));
    _mm_srli_epi16::<2>(_mm_add_epi16(sum, _mm_set1_epi16(2)))
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn coefficient_rows(params: &KernelParams) -> [Row; 3] {
    let [y, u, v] = &params.coefficients.rows;
    [Row::new(y), Row::new(u), Row::new(v)]
}

/// BGRA float to I444, bottom row first
///
/// # Safety
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn bgra_f32_to_i444(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(Tier::Sse41, src, &dst.as_const(), ConversionKind::RgbToPlanar444);

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
            let [py, pu, pv] = rgb16(s.add(x * 4), &rows);
            store(dy.add(x), py);
            store(du.add(x), pu);
            store(dv.add(x), pv);
        }
    }
}

/// BGRA float to NV12 or NV21, bottom row first
///
/// # Safety
/// Requires SSE4.1.
#[target_feature(enable = "sse4.1")]
pub unsafe fn bgra_f32_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    assert_tier_preconditions(
        Tier::Sse41,
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
            let [ya, ua, va] = rgb16(top.add(x * 4), &rows);
            let [yb, ub, vb] = rgb16(bottom.add(x * 4), &rows);
            store(y0.add(x), ya);
            store(y1.add(x), yb);

            let u = box_mean(ua, ub);
            let v = box_mean(va, vb);
            let pairs = if params.swap_uv {
                _mm_or_si128(v, _mm_slli_epi16::<8>(u))
            } else {
                _mm_or_si128(u, _mm_slli_epi16::<8>(v))
            };
            store(uv.add(x), pairs);
        }
    }
}
