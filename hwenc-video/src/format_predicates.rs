//! Format classification
//!
//! Two families of predicates. The layout family says how bytes are arranged
//! in memory and exactly one of them holds for every tag. The sampling family
//! says how chroma is subsampled and again exactly one holds.

use crate::types::FormatTag;

// Layout family

pub fn is_planar_420(format: FormatTag) -> bool {
    format == FormatTag::I420
}

/// NV12 or NV21
pub fn is_interleaved_420(format: FormatTag) -> bool {
    matches!(format, FormatTag::Nv12 | FormatTag::Nv21)
}

pub fn is_planar_444(format: FormatTag) -> bool {
    format == FormatTag::I444
}

pub fn is_packed_444(format: FormatTag) -> bool {
    format == FormatTag::Vuya
}

/// UYVY or YUY2
pub fn is_packed_422(format: FormatTag) -> bool {
    matches!(format, FormatTag::Uyvy | FormatTag::Yuy2)
}

pub fn is_float_rgb(format: FormatTag) -> bool {
    format == FormatTag::BgraF32
}

pub fn is_tiled_16x16(format: FormatTag) -> bool {
    matches!(
        format,
        FormatTag::Nv12Tiled16x16 | FormatTag::Yuv444Tiled16x16
    )
}

pub fn is_tiled_64x16(format: FormatTag) -> bool {
    matches!(
        format,
        FormatTag::Nv12Tiled64x16 | FormatTag::Yuv444Tiled64x16
    )
}

// Sampling family

pub fn is_420(format: FormatTag) -> bool {
    matches!(
        format,
        FormatTag::I420
            | FormatTag::Nv12
            | FormatTag::Nv21
            | FormatTag::Nv12Tiled16x16
            | FormatTag::Nv12Tiled64x16
    )
}

pub fn is_422(format: FormatTag) -> bool {
    is_packed_422(format)
}

pub fn is_yuv444(format: FormatTag) -> bool {
    matches!(
        format,
        FormatTag::I444
            | FormatTag::Vuya
            | FormatTag::Yuv444Tiled16x16
            | FormatTag::Yuv444Tiled64x16
    )
}

pub fn is_rgb(format: FormatTag) -> bool {
    is_float_rgb(format)
}

// Helpers

/// Interleaved chroma stored V before U
pub fn is_nv21(format: FormatTag) -> bool {
    format == FormatTag::Nv21
}

/// Packed 4:2:2 with a chroma byte at offset 0
pub fn is_chroma_first(format: FormatTag) -> bool {
    format == FormatTag::Uyvy
}

pub fn is_yuv(format: FormatTag) -> bool {
    !is_rgb(format)
}

pub fn is_tiled(format: FormatTag) -> bool {
    is_tiled_16x16(format) || is_tiled_64x16(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Predicate = fn(FormatTag) -> bool;

    const LAYOUT: [Predicate; 8] = [
        is_planar_420,
        is_interleaved_420,
        is_planar_444,
        is_packed_444,
        is_packed_422,
        is_float_rgb,
        is_tiled_16x16,
        is_tiled_64x16,
    ];

    const SAMPLING: [Predicate; 4] = [is_420, is_422, is_yuv444, is_rgb];

    #[test]
    fn test_layout_family_is_exclusive() {
        for format in FormatTag::ALL {
            let hits = LAYOUT.iter().filter(|p| p(format)).count();
            assert_eq!(hits, 1, "{format:?} matched {hits} layout predicates");
        }
    }

    #[test]
    fn test_sampling_family_is_exclusive() {
        for format in FormatTag::ALL {
            let hits = SAMPLING.iter().filter(|p| p(format)).count();
            assert_eq!(hits, 1, "{format:?} matched {hits} sampling predicates");
        }
    }

    #[test]
    fn test_predicates_are_pure() {
        for format in FormatTag::ALL {
            for p in LAYOUT.iter().chain(SAMPLING.iter()) {
                assert_eq!(p(format), p(format));
            }
        }
    }

    #[test]
    fn test_helpers() {
        assert!(is_chroma_first(FormatTag::Uyvy));
        assert!(!is_chroma_first(FormatTag::Yuy2));
        assert!(is_nv21(FormatTag::Nv21));
        assert!(is_interleaved_420(FormatTag::Nv21));
        assert!(is_tiled(FormatTag::Yuv444Tiled64x16));
        assert!(!is_tiled(FormatTag::Nv12));
        assert!(is_yuv(FormatTag::Vuya));
        assert!(!is_yuv(FormatTag::BgraF32));
    }

    #[test]
    fn test_tiled_sampling() {
        assert!(is_420(FormatTag::Nv12Tiled16x16));
        assert!(is_yuv444(FormatTag::Yuv444Tiled16x16));
    }
}
