//! Pixel layout conversion
//!
//! Each conversion has a scalar, an SSE4.1 and an AVX2 kernel behind one table
//! indexed by [`Tier`]. All tiers produce bit-identical output; the vector
//! tiers only run on buffers the dispatcher has checked.

pub mod scalar;

#[cfg(target_arch = "x86_64")]
pub mod avx2;
#[cfg(target_arch = "x86_64")]
pub mod sse41;

use crate::capabilities::{ConversionCapabilities, CpuFeatures, Tier};
use crate::color_matrix::{ColorMatrix, MatrixCoefficients};
use crate::dispatch::{check_tier, select_tier};
use crate::error::ConvertError;
use crate::format_predicates::*;
use crate::types::{FormatTag, PixelSurface, PixelSurfaceMut};

/// Kernel entry point shared by every tier
///
/// Vector kernels require the CPU feature of their tier; they assert their
/// buffer preconditions on entry.
pub type KernelFn = unsafe fn(&PixelSurface<'_>, &mut PixelSurfaceMut<'_>, &KernelParams);

#[cfg(target_arch = "x86_64")]
macro_rules! tiers {
    ($name:ident) => {
        [
            scalar::$name as KernelFn,
            sse41::$name as KernelFn,
            avx2::$name as KernelFn,
        ]
    };
}

#[cfg(not(target_arch = "x86_64"))]
macro_rules! tiers {
    ($name:ident) => {
        [scalar::$name as KernelFn; Tier::COUNT]
    };
}

/// Conversion families with a dedicated kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    /// I420 to NV12/NV21
    PlanarToInterleaved420,
    /// NV12/NV21 to I420
    InterleavedToPlanar420,
    /// VUYA to I444, flipped
    Packed444ToPlanar444,
    /// UYVY/YUY2 to NV12/NV21
    Packed422ToInterleaved420,
    /// BGRA float to I444, flipped
    RgbToPlanar444,
    /// BGRA float to NV12/NV21, flipped
    RgbToInterleaved420,
    /// Same layout on both sides
    Copy,
}

impl ConversionKind {
    /// Kernel family for a source/destination pair, if one exists
    pub fn resolve(src: FormatTag, dst: FormatTag) -> Option<ConversionKind> {
        if is_tiled(src) || is_tiled(dst) {
            return None;
        }

        if src == dst {
            return Some(ConversionKind::Copy);
        }

        if is_planar_420(src) && is_interleaved_420(dst) {
            Some(ConversionKind::PlanarToInterleaved420)
        } else if is_interleaved_420(src) && is_planar_420(dst) {
            Some(ConversionKind::InterleavedToPlanar420)
        } else if is_packed_444(src) && is_planar_444(dst) {
            Some(ConversionKind::Packed444ToPlanar444)
        } else if is_packed_422(src) && is_interleaved_420(dst) {
            Some(ConversionKind::Packed422ToInterleaved420)
        } else if is_float_rgb(src) && is_planar_444(dst) {
            Some(ConversionKind::RgbToPlanar444)
        } else if is_float_rgb(src) && is_interleaved_420(dst) {
            Some(ConversionKind::RgbToInterleaved420)
        } else {
            None
        }
    }

    /// Vector kernels of this family consume two source rows per step
    pub fn pairs_scanlines(self) -> bool {
        matches!(
            self,
            ConversionKind::Packed422ToInterleaved420 | ConversionKind::RgbToInterleaved420
        )
    }

    pub fn has_vector_tiers(self) -> bool {
        self != ConversionKind::Copy
    }

    fn kernels(self) -> [KernelFn; Tier::COUNT] {
        match self {
            ConversionKind::PlanarToInterleaved420 => tiers!(i420_to_nv12),
            ConversionKind::InterleavedToPlanar420 => tiers!(nv12_to_i420),
            ConversionKind::Packed444ToPlanar444 => tiers!(vuya_to_i444),
            ConversionKind::Packed422ToInterleaved420 => tiers!(packed422_to_nv12),
            ConversionKind::RgbToPlanar444 => tiers!(bgra_f32_to_i444),
            ConversionKind::RgbToInterleaved420 => tiers!(bgra_f32_to_nv12),
            ConversionKind::Copy => [scalar::copy_planes as KernelFn; Tier::COUNT],
        }
    }
}

/// Per-call kernel parameters derived from the format pair
#[derive(Debug, Clone, Copy)]
pub struct KernelParams {
    /// Packed 4:2:2 source stores luma at even bytes (YUY2)
    pub luma_first: bool,
    /// Interleaved chroma side is V,U (NV21)
    pub swap_uv: bool,
    pub coefficients: MatrixCoefficients,
}

impl KernelParams {
    pub fn new(src: FormatTag, dst: FormatTag, matrix: ColorMatrix) -> Self {
        Self {
            luma_first: !is_chroma_first(src),
            swap_uv: is_nv21(src) || is_nv21(dst),
            coefficients: matrix.coefficients(),
        }
    }
}

/// Validate both surfaces and resolve the kernel family
pub fn prepare(
    src: &PixelSurface<'_>,
    dst: &PixelSurface<'_>,
) -> Result<ConversionKind, ConvertError> {
    src.validate()?;
    dst.validate()?;

    if src.width != dst.width || src.height != dst.height {
        return Err(ConvertError::DimensionMismatch {
            src_width: src.width,
            src_height: src.height,
            dst_width: dst.width,
            dst_height: dst.height,
        });
    }

    ConversionKind::resolve(src.format, dst.format).ok_or(ConvertError::UnsupportedConversion {
        src: src.format,
        dst: dst.format,
    })
}

/// Convert `src` into `dst` with the widest tier the buffers allow
///
/// `caps` is intersected with the running CPU's features, so a synthetic
/// capability set can only narrow the choice. Returns the tier that ran.
pub fn convert(
    caps: &ConversionCapabilities,
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    matrix: ColorMatrix,
) -> Result<Tier, ConvertError> {
    let kind = prepare(src, &dst.as_const())?;
    let caps = caps.restricted_to(CpuFeatures::get());
    let tier = select_tier(&caps, src, &dst.as_const(), kind);

    log::trace!(
        "{:?} -> {:?} {}x{} via {:?} on {} tier",
        src.format,
        dst.format,
        src.width,
        src.height,
        kind,
        tier.name()
    );

    run(kind, tier, src, dst, matrix);
    Ok(tier)
}

/// Convert with an explicit tier
///
/// Fails instead of falling back when the CPU or the buffers do not support
/// `tier`. Same-layout copies have a single implementation and accept any
/// tier.
pub fn convert_with_tier(
    tier: Tier,
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    matrix: ColorMatrix,
) -> Result<(), ConvertError> {
    let kind = prepare(src, &dst.as_const())?;

    if !CpuFeatures::get().has(tier) {
        return Err(ConvertError::TierUnavailable { tier });
    }

    let tier = if kind.has_vector_tiers() {
        check_tier(tier, src, &dst.as_const(), kind)
            .map_err(|reason| ConvertError::TierIneligible { tier, reason })?;
        tier
    } else {
        Tier::Scalar
    };

    run(kind, tier, src, dst, matrix);
    Ok(())
}

fn run(
    kind: ConversionKind,
    tier: Tier,
    src: &PixelSurface<'_>,
    dst: &mut PixelSurfaceMut<'_>,
    matrix: ColorMatrix,
) {
    let params = KernelParams::new(src.format, dst.format, matrix);
    let kernel = kind.kernels()[tier as usize];

    // SAFETY: the tier was checked against the CPU features and the buffer
    // geometry above; vector kernels re-assert the buffer checks.
    unsafe { kernel(src, dst, &params) }
}

/// Panic unless a vector kernel may run on these buffers
#[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
pub(crate) fn assert_tier_preconditions(
    tier: Tier,
    src: &PixelSurface<'_>,
    dst: &PixelSurface<'_>,
    kind: ConversionKind,
) {
    assert!(
        src.validate().is_ok() && dst.validate().is_ok(),
        "{} kernel called with invalid surface geometry",
        tier.name()
    );
    assert!(
        src.width == dst.width && src.height == dst.height,
        "{} kernel called with mismatched dimensions",
        tier.name()
    );
    if let Err(reason) = check_tier(tier, src, dst, kind) {
        panic!("{} kernel precondition violated: {}", tier.name(), reason);
    }
}
