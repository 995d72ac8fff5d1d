//! Kernel tier selection
//!
//! Starts from the widest tier the capabilities allow and walks down until a
//! tier whose alignment and width requirements the buffers meet. Selection is
//! a pure function of its inputs.

use crate::capabilities::{ConversionCapabilities, Tier};
use crate::format_conversion::ConversionKind;
use crate::types::PixelSurface;
use thiserror::Error;

/// Which surface a disqualification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

/// Why a vector tier cannot run on a buffer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Disqualification {
    #[error("{side:?} plane {plane} is not {alignment}-byte aligned")]
    MisalignedPlane {
        side: Side,
        plane: usize,
        alignment: usize,
    },

    #[error("{side:?} plane {plane} stride {stride} is not a multiple of {alignment}")]
    StrideNotMultiple {
        side: Side,
        plane: usize,
        stride: usize,
        alignment: usize,
    },

    #[error("Width {width} is not a multiple of {lanes} pixels")]
    WidthNotMultiple { width: usize, lanes: usize },

    #[error("Height {height} is odd and the kernel consumes scanline pairs")]
    OddHeight { height: usize },
}

/// Check whether `tier` may run `kind` on these surfaces
///
/// The scalar tier is always eligible.
pub fn check_tier(
    tier: Tier,
    src: &PixelSurface<'_>,
    dst: &PixelSurface<'_>,
    kind: ConversionKind,
) -> Result<(), Disqualification> {
    if tier == Tier::Scalar {
        return Ok(());
    }

    let alignment = tier.alignment();
    for (side, surface) in [(Side::Source, src), (Side::Destination, dst)] {
        for plane in 0..surface.format.plane_count() {
            if surface.planes[plane].as_ptr() as usize % alignment != 0 {
                return Err(Disqualification::MisalignedPlane {
                    side,
                    plane,
                    alignment,
                });
            }

            let stride = surface.strides[plane];
            if stride % alignment != 0 {
                return Err(Disqualification::StrideNotMultiple {
                    side,
                    plane,
                    stride,
                    alignment,
                });
            }
        }
    }

    let lanes = tier.lane_pixels();
    if dst.width % lanes != 0 {
        return Err(Disqualification::WidthNotMultiple {
            width: dst.width,
            lanes,
        });
    }

    if kind.pairs_scanlines() && dst.height % 2 != 0 {
        return Err(Disqualification::OddHeight { height: dst.height });
    }

    Ok(())
}

/// Pick the widest allowed tier the buffers qualify for
pub fn select_tier(
    caps: &ConversionCapabilities,
    src: &PixelSurface<'_>,
    dst: &PixelSurface<'_>,
    kind: ConversionKind,
) -> Tier {
    if !kind.has_vector_tiers() {
        return Tier::Scalar;
    }

    for tier in Tier::ALL.into_iter().rev() {
        if !caps.allows(tier) {
            continue;
        }

        match check_tier(tier, src, dst, kind) {
            Ok(()) => return tier,
            Err(reason) => log::trace!("{} tier skipped for {:?}: {}", tier.name(), kind, reason),
        }
    }

    Tier::Scalar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CpuFeatures;
    use crate::frame_buffer::AlignedFrame;
    use crate::types::FormatTag;

    fn all_tiers() -> ConversionCapabilities {
        ConversionCapabilities::from_features(CpuFeatures {
            sse41: true,
            avx2: true,
        })
    }

    fn frames(
        src: FormatTag,
        dst: FormatTag,
        width: usize,
        height: usize) -> (AlignedFrame, AlignedFrame,
    ) {
        (
            AlignedFrame::new(src, width, height).unwrap(),
            AlignedFrame::new(dst, width, height).unwrap(),
        )
    }

    #[test]
    fn test_aligned_buffers_get_widest_tier() {
        let (src, dst) = frames(FormatTag::Uyvy, FormatTag::Nv12, 64, 4);
        let tier = select_tier(
            &all_tiers(),
            &src.surface(),
            &dst.surface(),
            ConversionKind::Packed422ToInterleaved420,
        );
        assert_eq!(tier, Tier::Avx2);
    }

    #[test]
    fn test_width_16_mod_32_never_avx2() {
        for width in [16, 48, 80, 1936] {
            let (src, dst) = frames(FormatTag::I420, FormatTag::Nv12, width, 8);
            let tier = select_tier(
                &all_tiers(),
                &src.surface(),
                &dst.surface(),
                ConversionKind::PlanarToInterleaved420,
            );
            assert_eq!(tier, Tier::Sse41, "width {width}");
        }
    }

    #[test]
    fn test_misaligned_destination_falls_back_to_scalar() {
        let src = AlignedFrame::new(FormatTag::Vuya, 32, 2).unwrap();
        let mut backing = vec![0u8; 32 * 2 * 3 + 64];
        let base = backing.as_ptr() as usize;
        // Skew the start so it is 1 byte past a 64-byte boundary
        let skew = (64 - base % 64) % 64 + 1;
        let (y, rest) = backing[skew..].split_at_mut(64);
        let (u, v) = rest.split_at_mut(64);
        let dst = crate::types::PixelSurfaceMut::new(FormatTag::I444, 32, 2)
            .with_plane(0, y, 32)
            .with_plane(1, u, 32)
            .with_plane(2, v, 32);

        let tier = select_tier(
            &all_tiers(),
            &src.surface(),
            &dst.as_const(),
            ConversionKind::Packed444ToPlanar444,
        );
        assert_eq!(tier, Tier::Scalar);
    }

    #[test]
    fn test_odd_height_disqualifies_paired_kernels() {
        let (src, dst) = frames(FormatTag::BgraF32, FormatTag::Nv12, 32, 3);
        let reason = check_tier(
            Tier::Sse41,
            &src.surface(),
            &dst.surface(),
            ConversionKind::RgbToInterleaved420,
        );
        assert_eq!(reason, Err(Disqualification::OddHeight { height: 3 }));

        // Per-row kernels do not care
        let (src, dst) = frames(FormatTag::BgraF32, FormatTag::I444, 32, 3);
        let tier = select_tier(
            &all_tiers(),
            &src.surface(),
            &dst.surface(),
            ConversionKind::RgbToPlanar444,
        );
        assert_eq!(tier, Tier::Avx2);
    }

    #[test]
    fn test_stride_granularity() {
        let src = AlignedFrame::new(FormatTag::Nv12, 32, 2).unwrap();
        // 48-byte stride is 16-aligned but not 32-aligned
        let backing = AlignedFrame::new(FormatTag::I444, 64, 2).unwrap();
        let surface = backing.surface();
        let planes = surface.planes;
        let dst = PixelSurface::new(FormatTag::I420, 32, 2)
            .with_plane(0, planes[0], 48)
            .with_plane(1, planes[1], 48)
            .with_plane(2, planes[2], 48);

        assert_eq!(
            check_tier(Tier::Avx2, &src.surface(), &dst, ConversionKind::InterleavedToPlanar420),
            Err(Disqualification::StrideNotMultiple {
                side: Side::Destination,
                plane: 0,
                stride: 48,
                alignment: 32
            })
        );
        assert_eq!(
            check_tier(Tier::Sse41, &src.surface(), &dst, ConversionKind::InterleavedToPlanar420),
            Ok(())
        );
    }

    #[test]
    fn test_disallowed_tier_is_skipped() {
        let (src, dst) = frames(FormatTag::I420, FormatTag::Nv12, 64, 2);
        let mut caps = all_tiers();
        caps.set_allow_wider_tier(Tier::Avx2, false);

        let tier = select_tier(
            &caps,
            &src.surface(),
            &dst.surface(),
            ConversionKind::PlanarToInterleaved420,
        );
        assert_eq!(tier, Tier::Sse41);
    }

    #[test]
    fn test_copy_is_always_scalar() {
        let (src, dst) = frames(FormatTag::Nv12, FormatTag::Nv12, 64, 2);
        let tier = select_tier(&all_tiers(), &src.surface(), &dst.surface(), ConversionKind::Copy);
        assert_eq!(tier, Tier::Scalar);
    }
}
