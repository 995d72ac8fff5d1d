//! RGB to YUV colour matrices

/// Luma coefficient standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colorimetry {
    Bt601,
    #[default]
    Bt709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// Y and chroma span 0..=255
    Full,
    /// Y spans 16..=235, chroma 16..=240
    #[default]
    Studio,
}

/// Selects one of the four fixed coefficient sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorMatrix {
    pub colorimetry: Colorimetry,
    pub range: ColorRange,
}

/// Rows Y, U, V; columns R, G, B, offset
///
/// Offsets already include the +0.5 rounding bias, so every sample is
/// `clamp(r * c0 + g * c1 + b * c2 + c3, 0, 255)` truncated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixCoefficients {
    pub rows: [[f32; 4]; 3],
}

impl ColorMatrix {
    pub const fn new(colorimetry: Colorimetry, range: ColorRange) -> Self {
        Self { colorimetry, range }
    }

    pub fn coefficients(&self) -> MatrixCoefficients {
        let (kr, kb) = match self.colorimetry {
            Colorimetry::Bt601 => (0.299f64, 0.114f64),
            Colorimetry::Bt709 => (0.2126, 0.0722),
        };
        let kg = 1.0 - kr - kb;

        let (y_scale, c_scale, y_offset) = match self.range {
            ColorRange::Full => (1.0, 1.0, 0.0),
            ColorRange::Studio => (219.0 / 255.0, 224.0 / 255.0, 16.0),
        };

        // Inputs are normalised floats, outputs 8-bit code values
        let y_scale = y_scale * 255.0;
        let cb = c_scale * 255.0 / (2.0 * (1.0 - kb));
        let cr = c_scale * 255.0 / (2.0 * (1.0 - kr));

        let row = |r: f64, g: f64, b: f64, offset: f64| {
            [r as f32, g as f32, b as f32, (offset + 0.5) as f32]
        };

        MatrixCoefficients {
            rows: [
                row(kr * y_scale, kg * y_scale, kb * y_scale, y_offset),
                row(-kr * cb, -kg * cb, (1.0 - kb) * cb, 128.0),
                row((1.0 - kr) * cr, -kg * cr, -kb * cr, 128.0),
            ],
        }
    }
}

impl MatrixCoefficients {
    /// One output sample, evaluated in the order every kernel tier uses
    #[inline(always)]
    pub fn apply(row: &[f32; 4], r: f32, g: f32, b: f32) -> u8 {
        let v = ((r * row[0] + g * row[1]) + b * row[2]) + row[3];
        v.max(0.0).min(255.0) as u8
    }

    /// Convert one pixel to (Y, U, V)
    #[inline(always)]
    pub fn yuv(&self, r: f32, g: f32, b: f32) -> (u8, u8, u8) {
        (
            Self::apply(&self.rows[0], r, g, b),
            Self::apply(&self.rows[1], r, g, b),
            Self::apply(&self.rows[2], r, g, b),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ColorMatrix; 4] = [
        ColorMatrix::new(Colorimetry::Bt601, ColorRange::Full),
        ColorMatrix::new(Colorimetry::Bt601, ColorRange::Studio),
        ColorMatrix::new(Colorimetry::Bt709, ColorRange::Full),
        ColorMatrix::new(Colorimetry::Bt709, ColorRange::Studio),
    ];

    #[test]
    fn test_default_is_bt709_studio() {
        let matrix = ColorMatrix::default();
        assert_eq!(matrix.colorimetry, Colorimetry::Bt709);
        assert_eq!(matrix.range, ColorRange::Studio);
    }

    #[test]
    fn test_studio_black_and_white() {
        for matrix in ALL.iter().filter(|m| m.range == ColorRange::Studio) {
            let c = matrix.coefficients();
            assert_eq!(c.yuv(0.0, 0.0, 0.0), (16, 128, 128));
            assert_eq!(c.yuv(1.0, 1.0, 1.0), (235, 128, 128));
        }
    }

    #[test]
    fn test_full_black_and_white() {
        for matrix in ALL.iter().filter(|m| m.range == ColorRange::Full) {
            let c = matrix.coefficients();
            assert_eq!(c.yuv(0.0, 0.0, 0.0), (0, 128, 128));
            assert_eq!(c.yuv(1.0, 1.0, 1.0), (255, 128, 128));
        }
    }

    #[test]
    fn test_primaries_push_chroma() {
        let c = ColorMatrix::new(Colorimetry::Bt709, ColorRange::Studio).coefficients();

        let (_, u, v) = c.yuv(0.0, 0.0, 1.0);
        assert_eq!(u, 240);
        assert!(v < 128);

        let (_, u, v) = c.yuv(1.0, 0.0, 0.0);
        assert!(u < 128);
        assert_eq!(v, 240);
    }

    #[test]
    fn test_out_of_range_input_saturates() {
        let c = ColorMatrix::new(Colorimetry::Bt601, ColorRange::Full).coefficients();
        assert_eq!(c.yuv(4.0, 4.0, 4.0).0, 255);
        assert_eq!(c.yuv(-2.0, -2.0, -2.0).0, 0);
        assert_eq!(c.yuv(f32::NAN, 0.0, 0.0).0, 0);
    }
}
