//! Cache-line aligned frame storage for SIMD conversion

use crate::error::ConvertError;
use crate::types::{FormatTag, PixelSurface, PixelSurfaceMut, MAX_PLANES};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

const CACHE_LINE_SIZE: usize = 64;

/// Plane base and stride alignment; covers every kernel tier
pub const FRAME_ALIGNMENT: usize = CACHE_LINE_SIZE;

/// Zero-initialised frame with every plane in one allocation
///
/// Each plane starts on a 64-byte boundary and every stride is padded to a
/// multiple of 64, so any width that is a multiple of the vector step
/// qualifies for the widest kernel tier.
pub struct AlignedFrame {
    data: NonNull<u8>,
    layout: Layout,
    format: FormatTag,
    width: usize,
    height: usize,
    offsets: [usize; MAX_PLANES],
    lens: [usize; MAX_PLANES],
    strides: [usize; MAX_PLANES],
}

// The frame owns its allocation exclusively
unsafe impl Send for AlignedFrame {}
unsafe impl Sync for AlignedFrame {}

impl AlignedFrame {
    pub fn new(format: FormatTag, width: usize, height: usize) -> Result<Self, ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::EmptySurface { width, height });
        }

        let too_large = || ConvertError::FrameTooLarge {
            format,
            width,
            height,
        };

        let mut offsets = [0; MAX_PLANES];
        let mut lens = [0; MAX_PLANES];
        let mut strides = [0; MAX_PLANES];
        let mut total = 0usize;

        for plane in 0..format.plane_count() {
            let stride = format
                .plane_row_bytes(plane, width)
                .checked_next_multiple_of(CACHE_LINE_SIZE)
                .ok_or_else(too_large)?;
            let len = stride
                .checked_mul(format.plane_rows(plane, height))
                .ok_or_else(too_large)?;

            offsets[plane] = total;
            lens[plane] = len;
            strides[plane] = stride;
            total = total.checked_add(len).ok_or_else(too_large)?;
        }

        let layout = Layout::from_size_align(total, FRAME_ALIGNMENT).map_err(|_| too_large())?;

        // SAFETY: total is non-zero for a non-empty frame
        let ptr = unsafe { alloc_zeroed(layout) };
        let data = NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout));

        log::trace!("Allocated {:?} frame {}x{} ({} bytes)", format, width, height, total);

        Ok(Self {
            data,
            layout,
            format,
            width,
            height,
            offsets,
            lens,
            strides,
        })
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides[plane]
    }

    /// Total allocation size in bytes
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        if plane >= self.format.plane_count() {
            return &[];
        }
        // SAFETY: offsets and lens describe disjoint ranges inside the allocation
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr().add(self.offsets[plane]),
                self.lens[plane],
            )
        }
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        if plane >= self.format.plane_count() {
            return &mut [];
        }
        // SAFETY: as in `plane`, and `&mut self` makes the borrow exclusive
        unsafe {
            std::slice::from_raw_parts_mut(
                self.data.as_ptr().add(self.offsets[plane]),
                self.lens[plane],
            )
        }
    }

    /// Read-only view of the whole frame
    pub fn surface(&self) -> PixelSurface<'_> {
        self.view(self.width, self.height)
    }

    /// Read-only view of the top-left `width` x `height` region
    pub fn surface_at(
        &self,
        width: usize,
        height: usize,
    ) -> Result<PixelSurface<'_>, ConvertError> {
        self.check_crop(width, height)?;
        Ok(self.view(width, height))
    }

    /// Writable view of the whole frame
    pub fn surface_mut(&mut self) -> PixelSurfaceMut<'_> {
        let (width, height) = (self.width, self.height);
        self.split_planes(width, height)
    }

    /// Writable view of the top-left `width` x `height` region
    ///
    /// Strides stay those of the full frame, so a frame allocated at the
    /// maximum session size can carry any smaller resolution.
    pub fn surface_mut_at(
        &mut self,
        width: usize,
        height: usize,
    ) -> Result<PixelSurfaceMut<'_>, ConvertError> {
        self.check_crop(width, height)?;
        Ok(self.split_planes(width, height))
    }

    fn check_crop(&self, width: usize, height: usize) -> Result<(), ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::EmptySurface { width, height });
        }
        if width > self.width || height > self.height {
            return Err(ConvertError::DimensionMismatch {
                src_width: width,
                src_height: height,
                dst_width: self.width,
                dst_height: self.height,
            });
        }
        Ok(())
    }

    fn view(&self, width: usize, height: usize) -> PixelSurface<'_> {
        let mut surface = PixelSurface::new(self.format, width, height);
        for plane in 0..self.format.plane_count() {
            surface = surface.with_plane(plane, self.plane(plane), self.strides[plane]);
        }
        surface
    }

    fn split_planes(&mut self, width: usize, height: usize) -> PixelSurfaceMut<'_> {
        let format = self.format;
        let strides = self.strides;
        let lens = self.lens;

        // SAFETY: the allocation is `layout.size()` bytes and exclusively borrowed
        let mut rest: &mut [u8] =
            unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.layout.size()) };

        let mut surface = PixelSurfaceMut::new(format, width, height);
        for plane in 0..format.plane_count() {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(lens[plane]);
            surface = surface.with_plane(plane, head, strides[plane]);
            rest = tail;
        }
        surface
    }
}

impl Drop for AlignedFrame {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this layout
        unsafe { dealloc(self.data.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for AlignedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("strides", &self.strides)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_alignment() {
        for format in [FormatTag::I420, FormatTag::Nv12, FormatTag::I444, FormatTag::BgraF32] {
            let frame = AlignedFrame::new(format, 1920, 1080).unwrap();
            for plane in 0..format.plane_count() {
                assert_eq!(frame.plane(plane).as_ptr() as usize % FRAME_ALIGNMENT, 0);
                assert_eq!(frame.stride(plane) % FRAME_ALIGNMENT, 0);
            }
        }
    }

    #[test]
    fn test_stride_padding() {
        let frame = AlignedFrame::new(FormatTag::I420, 100, 10).unwrap();
        assert_eq!(frame.stride(0), 128);
        assert_eq!(frame.stride(1), 64);
        assert_eq!(frame.plane(1).len(), 64 * 5);
        assert_eq!(frame.len(), 128 * 10 + 64 * 5 * 2);
    }

    #[test]
    fn test_frame_is_zeroed_and_valid() {
        let frame = AlignedFrame::new(FormatTag::Nv12, 33, 17).unwrap();
        assert!(frame.plane(0).iter().all(|&b| b == 0));
        assert!(frame.surface().validate().is_ok());
    }

    #[test]
    fn test_surface_mut_planes_are_disjoint() {
        let mut frame = AlignedFrame::new(FormatTag::I420, 64, 4).unwrap();
        {
            let mut surface = frame.surface_mut();
            let [y, u, v] = surface.planes_mut();
            y.fill(1);
            u.fill(2);
            v.fill(3);
        }
        assert!(frame.plane(0).iter().all(|&b| b == 1));
        assert!(frame.plane(1).iter().all(|&b| b == 2));
        assert!(frame.plane(2).iter().all(|&b| b == 3));
        assert!(frame.plane(3).is_empty());
    }

    #[test]
    fn test_cropped_view_keeps_strides() {
        let mut frame = AlignedFrame::new(FormatTag::Nv12, 1920, 1088).unwrap();
        let surface = frame.surface_mut_at(1280, 720).unwrap();
        assert_eq!(surface.width, 1280);
        assert_eq!(surface.strides[0], 1920);
        assert!(surface.validate().is_ok());

        assert!(matches!(
            frame.surface_mut_at(3840, 720),
            Err(ConvertError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert_eq!(
            AlignedFrame::new(FormatTag::I420, 0, 4).unwrap_err(),
            ConvertError::EmptySurface { width: 0, height: 4 }
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let err = AlignedFrame::new(FormatTag::BgraF32, usize::MAX / 32, 2).unwrap_err();
        assert!(matches!(err, ConvertError::FrameTooLarge { .. }));
    }
}
