//! Portable kernels
//!
//! Reference behaviour for every conversion, including the edge cases the
//! vector tiers never see: odd heights pair the last row with itself, odd
//! widths pair the last chroma column with itself.

use super::KernelParams;
use crate::color_matrix::MatrixCoefficients;
use crate::types::{PixelSurface, PixelSurfaceMut};

#[inline(always)]
pub(crate) fn avg2(a: u8, b: u8) -> u8 {
    ((a as u16 + b as u16 + 1) >> 1) as u8
}

#[inline(always)]
pub(crate) fn avg4(s: [u8; 4]) -> u8 {
    ((s[0] as u16 + s[1] as u16 + s[2] as u16 + s[3] as u16 + 2) >> 2) as u8
}

#[inline(always)]
fn row_mut(plane: &mut [u8], stride: usize, y: usize, len: usize) -> &mut [u8] {
    let start = y * stride;
    &mut plane[start..start + len]
}

#[inline(always)]
fn chroma_pair(u: u8, v: u8, swap_uv: bool) -> [u8; 2] {
    if swap_uv {
        [v, u]
    } else {
        [u, v]
    }
}

/// B, G, R of pixel `x` in a float row
#[inline(always)]
fn bgr(row: &[u8], x: usize) -> (f32, f32, f32) {
    let [b, g, r, _a]: [f32; 4] = bytemuck::pod_read_unaligned(&row[x * 16..x * 16 + 16]);
    (b, g, r)
}

fn copy_luma(src: &PixelSurface<'_>, luma: &mut [u8], stride: usize, width: usize, height: usize) {
    for y in 0..height {
        row_mut(luma, stride, y, width).copy_from_slice(src.row(0, y));
    }
}

/// I420 to NV12 or NV21
pub fn i420_to_nv12(src: &PixelSurface<'_>, dst: &mut PixelSurfaceMut<'_>, params: &KernelParams) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();

    copy_luma(src, luma, strides[0], width, height);

    let chroma_width = width.div_ceil(2);
    for j in 0..height.div_ceil(2) {
        let u = src.row(1, j);
        let v = src.row(2, j);
        let out = row_mut(chroma, strides[1], j, chroma_width * 2);
        for (i, pair) in out.chunks_exact_mut(2).enumerate() {
            pair.copy_from_slice(&chroma_pair(u[i], v[i], params.swap_uv));
        }
    }
}

/// NV12 or NV21 to I420
pub fn nv12_to_i420(src: &PixelSurface<'_>, dst: &mut PixelSurfaceMut<'_>, params: &KernelParams) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, u_plane, v_plane] = dst.planes_mut();

    copy_luma(src, luma, strides[0], width, height);

    let chroma_width = width.div_ceil(2);
    for j in 0..height.div_ceil(2) {
        let interleaved = src.row(1, j);
        let u_row = row_mut(u_plane, strides[1], j, chroma_width);
        let v_row = row_mut(v_plane, strides[2], j, chroma_width);
        for (i, pair) in interleaved.chunks_exact(2).enumerate() {
            let [u, v] = chroma_pair(pair[0], pair[1], params.swap_uv);
            u_row[i] = u;
            v_row[i] = v;
        }
    }
}

/// VUYA to I444, bottom row first
pub fn vuya_to_i444(src: &PixelSurface<'_>, dst: &mut PixelSurfaceMut<'_>, _params: &KernelParams) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [y_plane, u_plane, v_plane] = dst.planes_mut();

    for y in 0..height {
        let flipped = height - 1 - y;
        let y_row = row_mut(y_plane, strides[0], flipped, width);
        let u_row = row_mut(u_plane, strides[1], flipped, width);
        let v_row = row_mut(v_plane, strides[2], flipped, width);

        for (x, px) in src.row(0, y).chunks_exact(4).enumerate() {
            v_row[x] = px[0];
            u_row[x] = px[1];
            y_row[x] = px[2];
        }
    }
}

/// UYVY or YUY2 to NV12 or NV21
///
/// Chroma of each output row pair is the rounded mean of the two source
/// rows. With an odd width the final pair contributes only its first luma.
pub fn packed422_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();
    let (y_off, c_off) = if params.luma_first { (0, 1) } else { (1, 0) };

    for y in 0..height {
        let s = src.row(0, y);
        let out = row_mut(luma, strides[0], y, width);
        for (x, sample) in out.iter_mut().enumerate() {
            *sample = s[x * 2 + y_off];
        }
    }

    let chroma_width = width.div_ceil(2);
    for j in 0..height.div_ceil(2) {
        let r0 = src.row(0, 2 * j);
        let r1 = src.row(0, (2 * j + 1).min(height - 1));
        let out = row_mut(chroma, strides[1], j, chroma_width * 2);

        for (i, pair) in out.chunks_exact_mut(2).enumerate() {
            let u = avg2(r0[i * 4 + c_off], r1[i * 4 + c_off]);
            let v = avg2(r0[i * 4 + c_off + 2], r1[i * 4 + c_off + 2]);
            pair.copy_from_slice(&chroma_pair(u, v, params.swap_uv));
        }
    }
}

/// BGRA float to I444, bottom row first
pub fn bgra_f32_to_i444(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [y_plane, u_plane, v_plane] = dst.planes_mut();
    let c = &params.coefficients;

    for y in 0..height {
        let s = src.row(0, y);
        let flipped = height - 1 - y;
        let y_row = row_mut(y_plane, strides[0], flipped, width);
        let u_row = row_mut(u_plane, strides[1], flipped, width);
        let v_row = row_mut(v_plane, strides[2], flipped, width);

        for x in 0..width {
            let (b, g, r) = bgr(s, x);
            (y_row[x], u_row[x], v_row[x]) = c.yuv(r, g, b);
        }
    }
}

/// BGRA float to NV12 or NV21, bottom row first
///
/// Chroma is the 2x2 box mean of per-pixel 8-bit chroma samples.
pub fn bgra_f32_to_nv12(
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    params: &KernelParams,
) {
    let (width, height) = (dst.width, dst.height);
    let strides = dst.strides;
    let [luma, chroma, _] = dst.planes_mut();
    let [y_coef, u_coef, v_coef] = &params.coefficients.rows;

    for y in 0..height {
        let s = src.row(0, y);
        let out = row_mut(luma, strides[0], height - 1 - y, width);
        for (x, sample) in out.iter_mut().enumerate() {
            let (b, g, r) = bgr(s, x);
            *sample = MatrixCoefficients::apply(y_coef, r, g, b);
        }
    }

    let chroma_width = width.div_ceil(2);
    for j in 0..height.div_ceil(2) {
        // Destination rows 2j and 2j+1 come from the mirrored source rows
        let top = src.row(0, height - 1 - 2 * j);
        let bottom = src.row(0, height - 1 - (2 * j + 1).min(height - 1));
        let out = row_mut(chroma, strides[1], j, chroma_width * 2);

        for (i, pair) in out.chunks_exact_mut(2).enumerate() {
            let x0 = 2 * i;
            let x1 = (2 * i + 1).min(width - 1);
            let mut u = [0u8; 4];
            let mut v = [0u8; 4];
            for (k, (row, x)) in [(top, x0), (top, x1), (bottom, x0), (bottom, x1)]
                .into_iter()
                .enumerate()
            {
                let (b, g, r) = bgr(row, x);
                u[k] = MatrixCoefficients::apply(u_coef, r, g, b);
                v[k] = MatrixCoefficients::apply(v_coef, r, g, b);
            }
            pair.copy_from_slice(&chroma_pair(avg4(u), avg4(v), params.swap_uv));
        }
    }
}

/// Same layout on both sides, row by row
pub fn copy_planes(src: &PixelSurface<'_>, dst: &mut PixelSurfaceMut<'_>, _params: &KernelParams) {
    let format = src.format;
    let strides = dst.strides;
    let planes = dst.planes_mut();

    for (plane, out) in planes.into_iter().enumerate().take(format.plane_count()) {
        for y in 0..format.plane_rows(plane, src.height) {
            let row = src.row(plane, y);
            row_mut(out, strides[plane], y, row.len()).copy_from_slice(row);
        }
    }
}
