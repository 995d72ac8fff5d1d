//! Pixel surface types and format tags

use crate::error::ConvertError;

/// Maximum number of planes any supported layout uses
pub const MAX_PLANES: usize = 3;

/// Buffer layout, subsampling and byte order of a surface
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    I420 = 1,    // Planar YUV 4:2:0 (Y, U, V)
    Nv12 = 2,    // Interleaved YUV 4:2:0 (Y, UV)
    Nv21 = 3,    // Interleaved YUV 4:2:0 (Y, VU)
    I444 = 4,    // Planar YUV 4:4:4
    Vuya = 5,    // Packed YUVA 4:4:4, bytes V U Y A
    Uyvy = 6,    // Packed YUV 4:2:2, chroma first (U0 Y0 V0 Y1)
    Yuy2 = 7,    // Packed YUV 4:2:2, luma first (Y0 U0 Y1 V0)
    BgraF32 = 8, // Packed float RGB, native-endian f32 B G R A, nominal 0.0..=1.0
    Nv12Tiled16x16 = 9,
    Nv12Tiled64x16 = 10,
    Yuv444Tiled16x16 = 11,
    Yuv444Tiled64x16 = 12,
}

impl FormatTag {
    pub const ALL: [FormatTag; 12] = [
        FormatTag::I420,
        FormatTag::Nv12,
        FormatTag::Nv21,
        FormatTag::I444,
        FormatTag::Vuya,
        FormatTag::Uyvy,
        FormatTag::Yuy2,
        FormatTag::BgraF32,
        FormatTag::Nv12Tiled16x16,
        FormatTag::Nv12Tiled64x16,
        FormatTag::Yuv444Tiled16x16,
        FormatTag::Yuv444Tiled64x16,
    ];

    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        match self {
            FormatTag::I420
            | FormatTag::I444
            | FormatTag::Yuv444Tiled16x16
            | FormatTag::Yuv444Tiled64x16 => 3,
            FormatTag::Nv12
            | FormatTag::Nv21
            | FormatTag::Nv12Tiled16x16
            | FormatTag::Nv12Tiled64x16 => 2,
            FormatTag::Vuya | FormatTag::Uyvy | FormatTag::Yuy2 | FormatTag::BgraF32 => 1,
        }
    }

    /// Returns bytes per pixel in the first plane
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FormatTag::BgraF32 => 16,
            FormatTag::Vuya => 4,
            FormatTag::Uyvy | FormatTag::Yuy2 => 2,
            _ => 1, // Planar and interleaved luma
        }
    }

    /// Bytes of pixel data in one row of `plane` for an image `width` pixels wide
    ///
    /// Saturates at `usize::MAX` for widths no buffer can hold.
    pub fn plane_row_bytes(self, plane: usize, width: usize) -> usize {
        self.checked_plane_row_bytes(plane, width).unwrap_or(usize::MAX)
    }

    /// As `plane_row_bytes`, `None` on overflow
    pub fn checked_plane_row_bytes(self, plane: usize, width: usize) -> Option<usize> {
        if plane >= self.plane_count() {
            return Some(0);
        }

        let chroma_width = width.div_ceil(2);
        match (self, plane) {
            (FormatTag::Uyvy | FormatTag::Yuy2, _) => chroma_width.checked_mul(4),
            (FormatTag::I420, 1 | 2) => Some(chroma_width),
            (
                FormatTag::Nv12
                | FormatTag::Nv21
                | FormatTag::Nv12Tiled16x16
                | FormatTag::Nv12Tiled64x16,
                1,
            ) => chroma_width.checked_mul(2),
            _ => width.checked_mul(self.bytes_per_pixel()),
        }
    }

    /// Number of rows in `plane` for an image `height` pixels tall
    pub fn plane_rows(self, plane: usize, height: usize) -> usize {
        if plane >= self.plane_count() {
            return 0;
        }

        match (self, plane) {
            (
                FormatTag::I420
                | FormatTag::Nv12
                | FormatTag::Nv21
                | FormatTag::Nv12Tiled16x16
                | FormatTag::Nv12Tiled64x16,
                1 | 2,
            ) => height.div_ceil(2),
            _ => height,
        }
    }
}

/// Read-only view of a frame
///
/// Planes beyond `format.plane_count()` are empty slices. Strides are in bytes.
#[derive(Debug, Clone, Copy)]
pub struct PixelSurface<'a> {
    pub format: FormatTag,
    pub width: usize,
    pub height: usize,
    pub planes: [&'a [u8]; MAX_PLANES],
    pub strides: [usize; MAX_PLANES],
}

impl<'a> PixelSurface<'a> {
    pub fn new(format: FormatTag, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            planes: Default::default(),
            strides: [0; MAX_PLANES],
        }
    }

    /// Single-plane surface for packed layouts
    pub fn packed(
        format: FormatTag,
        width: usize,
        height: usize,
        data: &'a [u8],
        stride: usize,
    ) -> Self {
        Self::new(format, width, height).with_plane(0, data, stride)
    }

    pub fn with_plane(mut self, index: usize, data: &'a [u8], stride: usize) -> Self {
        self.planes[index] = data;
        self.strides[index] = stride;
        self
    }

    /// Row `y` of `plane`, trimmed to the pixel data
    pub fn row(&self, plane: usize, y: usize) -> &'a [u8] {
        let start = y * self.strides[plane];
        let len = self.format.plane_row_bytes(plane, self.width);
        &self.planes[plane][start..start + len]
    }

    /// Check stride and length invariants for every plane the format uses
    pub fn validate(&self) -> Result<(), ConvertError> {
        validate_geometry(self.format, self.width, self.height, &self.planes, &self.strides)
    }
}

/// Writable view of a frame
#[derive(Debug)]
pub struct PixelSurfaceMut<'a> {
    pub format: FormatTag,
    pub width: usize,
    pub height: usize,
    pub planes: [&'a mut [u8]; MAX_PLANES],
    pub strides: [usize; MAX_PLANES],
}

impl<'a> PixelSurfaceMut<'a> {
    pub fn new(format: FormatTag, width: usize, height: usize) -> Self {
        Self {
            format,
            width,
            height,
            planes: Default::default(),
            strides: [0; MAX_PLANES],
        }
    }

    pub fn packed(
        format: FormatTag,
        width: usize,
        height: usize,
        data: &'a mut [u8],
        stride: usize,
    ) -> Self {
        Self::new(format, width, height).with_plane(0, data, stride)
    }

    pub fn with_plane(mut self, index: usize, data: &'a mut [u8], stride: usize) -> Self {
        self.planes[index] = data;
        self.strides[index] = stride;
        self
    }

    /// Reborrow as a read-only view
    pub fn as_const(&self) -> PixelSurface<'_> {
        let [a, b, c] = &self.planes;
        PixelSurface {
            format: self.format,
            width: self.width,
            height: self.height,
            planes: [&a[..], &b[..], &c[..]],
            strides: self.strides,
        }
    }

    /// Split into independently writable planes
    pub fn planes_mut(&mut self) -> [&mut [u8]; MAX_PLANES] {
        let [a, b, c] = &mut self.planes;
        [&mut a[..], &mut b[..], &mut c[..]]
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        self.as_const().validate()
    }
}

fn validate_geometry(
    format: FormatTag,
    width: usize,
    height: usize,
    planes: &[&[u8]; MAX_PLANES],
    strides: &[usize; MAX_PLANES],
) -> Result<(), ConvertError> {
    if width == 0 || height == 0 {
        return Err(ConvertError::EmptySurface { width, height });
    }

    for plane in 0..format.plane_count() {
        let stride = strides[plane];
        let overflow = ConvertError::GeometryOverflow {
            plane,
            width,
            height,
            stride,
        };

        let row_bytes = format
            .checked_plane_row_bytes(plane, width)
            .ok_or(overflow.clone())?;
        if stride < row_bytes {
            return Err(ConvertError::StrideTooSmall {
                plane,
                stride,
                row_bytes,
            });
        }

        // Last row starts at (rows - 1) * stride; every row offset below it fits too
        let needed = (format.plane_rows(plane, height) - 1)
            .checked_mul(stride)
            .and_then(|offset| offset.checked_add(row_bytes))
            .ok_or(overflow)?;
        let len = planes[plane].len();
        if len < needed {
            return Err(ConvertError::PlaneTooSmall { plane, len, needed });
        }
    }

    Ok(())
}
