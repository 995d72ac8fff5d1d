//! CPU capability detection and kernel tiers
//!
//! The CPUID query runs once per process. Everything built on top of it is a
//! plain value that callers construct and pass into the dispatcher, so tests
//! can feed synthetic capability sets.

use std::sync::OnceLock;

/// Kernel implementation tier
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Scalar = 0,
    Sse41 = 1, // 128-bit lanes
    Avx2 = 2,  // 256-bit lanes
}

impl Tier {
    pub const COUNT: usize = 3;
    pub const ALL: [Tier; Tier::COUNT] = [Tier::Scalar, Tier::Sse41, Tier::Avx2];

    /// Required pointer and stride granularity in bytes
    pub const fn alignment(self) -> usize {
        match self {
            Tier::Scalar => 1,
            Tier::Sse41 => 16,
            Tier::Avx2 => 32,
        }
    }

    /// Image width must be a multiple of this many pixels
    pub const fn lane_pixels(self) -> usize {
        match self {
            Tier::Scalar => 1,
            Tier::Sse41 => 16,
            Tier::Avx2 => 32,
        }
    }

    pub const fn narrower(self) -> Option<Tier> {
        match self {
            Tier::Scalar => None,
            Tier::Sse41 => Some(Tier::Scalar),
            Tier::Avx2 => Some(Tier::Sse41),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Scalar => "scalar",
            Tier::Sse41 => "sse4.1",
            Tier::Avx2 => "avx2",
        }
    }
}

/// Vector extensions present on the running CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuFeatures {
    pub sse41: bool,
    pub avx2: bool,
}

impl CpuFeatures {
    /// Detected features, queried on first call and cached
    pub fn get() -> CpuFeatures {
        static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();
        *FEATURES.get_or_init(|| {
            let features = Self::query();
            log::debug!(
                "CPU features: sse4.1={} avx2={}",
                features.sse41,
                features.avx2
            );
            features
        })
    }

    #[cfg(target_arch = "x86_64")]
    fn query() -> CpuFeatures {
        CpuFeatures {
            // The 128-bit kernels use SSSE3 shuffles alongside SSE4.1
            sse41: is_x86_feature_detected!("sse4.1") && is_x86_feature_detected!("ssse3"),
            avx2: is_x86_feature_detected!("avx2"),
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn query() -> CpuFeatures {
        CpuFeatures::default()
    }

    pub fn has(&self, tier: Tier) -> bool {
        match tier {
            Tier::Scalar => true,
            Tier::Sse41 => self.sse41,
            Tier::Avx2 => self.avx2,
        }
    }
}

/// Which tiers the dispatcher may pick
///
/// Hardware bits are fixed at construction. The two allow flags start equal
/// to the hardware bits and can be cleared to force a narrower path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionCapabilities {
    hardware: CpuFeatures,
    allow_sse41: bool,
    allow_avx2: bool,
}

impl ConversionCapabilities {
    /// Capabilities of the running CPU with every supported tier allowed
    pub fn detect() -> Self {
        Self::from_features(CpuFeatures::get())
    }

    /// Capabilities for an arbitrary feature set
    ///
    /// Conversion entry points mask these with the real CPU features before
    /// running a kernel, so a synthetic set never executes an unsupported
    /// instruction.
    pub fn from_features(hardware: CpuFeatures) -> Self {
        Self {
            hardware,
            allow_sse41: hardware.sse41,
            allow_avx2: hardware.avx2,
        }
    }

    pub fn scalar_only() -> Self {
        Self::from_features(CpuFeatures::default())
    }

    pub fn hardware(&self) -> CpuFeatures {
        self.hardware
    }

    /// Hardware supports `tier`, regardless of the allow flags
    pub fn supports(&self, tier: Tier) -> bool {
        self.hardware.has(tier)
    }

    /// Hardware supports `tier` and it has not been disallowed
    pub fn allows(&self, tier: Tier) -> bool {
        match tier {
            Tier::Scalar => true,
            Tier::Sse41 => self.hardware.sse41 && self.allow_sse41,
            Tier::Avx2 => self.hardware.avx2 && self.allow_avx2,
        }
    }

    /// Set the allow flag for a vector tier
    ///
    /// Returns false and changes nothing when the hardware lacks `tier`.
    /// The scalar tier has no flag and always returns false.
    pub fn set_allow_wider_tier(&mut self, tier: Tier, allow: bool) -> bool {
        if tier == Tier::Scalar || !self.supports(tier) {
            return false;
        }

        match tier {
            Tier::Sse41 => self.allow_sse41 = allow,
            Tier::Avx2 => self.allow_avx2 = allow,
            Tier::Scalar => unreachable!(),
        }
        true
    }

    /// Widest tier the dispatcher starts from
    pub fn widest_allowed(&self) -> Tier {
        Tier::ALL
            .into_iter()
            .rev()
            .find(|tier| self.allows(*tier))
            .unwrap_or(Tier::Scalar)
    }

    /// Intersect the hardware bits with `features`, keeping the allow flags
    pub fn restricted_to(&self, features: CpuFeatures) -> Self {
        Self {
            hardware: CpuFeatures {
                sse41: self.hardware.sse41 && features.sse41,
                avx2: self.hardware.avx2 && features.avx2,
            },
            allow_sse41: self.allow_sse41,
            allow_avx2: self.allow_avx2,
        }
    }
}

impl Default for ConversionCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_features() -> CpuFeatures {
        CpuFeatures {
            sse41: true,
            avx2: true,
        }
    }

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(CpuFeatures::get(), CpuFeatures::get());
        assert_eq!(ConversionCapabilities::detect(), ConversionCapabilities::detect());
    }

    #[test]
    fn test_widest_allowed() {
        let caps = ConversionCapabilities::from_features(all_features());
        assert_eq!(caps.widest_allowed(), Tier::Avx2);

        let caps = ConversionCapabilities::from_features(CpuFeatures {
            sse41: true,
            avx2: false,
        });
        assert_eq!(caps.widest_allowed(), Tier::Sse41);

        assert_eq!(ConversionCapabilities::scalar_only().widest_allowed(), Tier::Scalar);
    }

    #[test]
    fn test_set_allow_without_hardware_is_noop() {
        let mut caps = ConversionCapabilities::scalar_only();

        assert!(!caps.set_allow_wider_tier(Tier::Avx2, true));
        assert!(!caps.set_allow_wider_tier(Tier::Sse41, true));
        assert!(!caps.allows(Tier::Avx2));
        assert!(!caps.allows(Tier::Sse41));
    }

    #[test]
    fn test_set_allow_forces_narrower_tier() {
        let mut caps = ConversionCapabilities::from_features(all_features());

        assert!(caps.set_allow_wider_tier(Tier::Avx2, false));
        assert_eq!(caps.widest_allowed(), Tier::Sse41);

        assert!(caps.set_allow_wider_tier(Tier::Sse41, false));
        assert_eq!(caps.widest_allowed(), Tier::Scalar);

        // Flags are independent: AVX2 can come back while SSE4.1 stays off
        assert!(caps.set_allow_wider_tier(Tier::Avx2, true));
        assert_eq!(caps.widest_allowed(), Tier::Avx2);
        assert!(!caps.allows(Tier::Sse41));
    }

    #[test]
    fn test_scalar_has_no_override() {
        let mut caps = ConversionCapabilities::from_features(all_features());
        assert!(!caps.set_allow_wider_tier(Tier::Scalar, false));
        assert!(caps.allows(Tier::Scalar));
    }

    #[test]
    fn test_restricted_to_masks_hardware() {
        let caps = ConversionCapabilities::from_features(all_features());
        let masked = caps.restricted_to(CpuFeatures {
            sse41: true,
            avx2: false,
        });

        assert!(!masked.allows(Tier::Avx2));
        assert!(masked.allows(Tier::Sse41));
    }

    #[test]
    fn test_tier_geometry() {
        assert_eq!(Tier::Sse41.alignment(), 16);
        assert_eq!(Tier::Avx2.alignment(), 32);
        assert_eq!(Tier::Avx2.lane_pixels(), 32);
        assert_eq!(Tier::Avx2.narrower(), Some(Tier::Sse41));
        assert_eq!(Tier::Scalar.narrower(), None);
    }
}
