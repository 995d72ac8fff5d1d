//! Session and per-frame configuration

use crate::error::ConfigError;
use hwenc_video::format_predicates::{is_420, is_422, is_float_rgb, is_tiled, is_yuv444};
use hwenc_video::{ColorMatrix, FormatTag, PixelSurface};
use std::time::Duration;

/// Encoder session configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub width: usize,
    pub height: usize,
    /// Staging frames are allocated at this size so resolution changes never reallocate
    pub max_width: usize,
    pub max_height: usize,
    pub buffer_format: FormatTag,
    pub gop_length: u32,
    /// Backend signals a completion event per frame instead of finishing inside submit
    pub async_mode: bool,
    /// Leave picture types to the encoder; `gop_length` is then ignored
    pub picture_type_by_encoder: bool,
    pub pool_size: usize,
    /// Bounded wait for a free slot; `None` blocks until one is returned
    pub slot_timeout: Option<Duration>,
    pub completion_timeout: Duration,
    pub max_submit_retries: u32,
    pub retry_backoff: Duration,
    pub color_matrix: ColorMatrix,
    /// Pin the drain worker to this core id
    pub worker_core: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            max_width: 1920,
            max_height: 1080,
            buffer_format: FormatTag::Nv12,
            gop_length: 30,
            async_mode: false,
            picture_type_by_encoder: false,
            pool_size: 32,
            slot_timeout: None,
            completion_timeout: Duration::from_secs(5),
            max_submit_retries: 64,
            retry_backoff: Duration::from_micros(500),
            color_matrix: ColorMatrix::default(),
            worker_core: None,
        }
    }
}

impl PipelineConfig {
    pub fn new(width: usize, height: usize, buffer_format: FormatTag) -> Self {
        Self {
            width,
            height,
            max_width: width,
            max_height: height,
            buffer_format,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_tiled(self.buffer_format) || is_float_rgb(self.buffer_format) {
            return Err(ConfigError::UnsupportedBufferFormat(self.buffer_format));
        }
        self.validate_resolution(self.width, self.height)?;
        if !self.picture_type_by_encoder && self.gop_length == 0 {
            return Err(ConfigError::ZeroGopLength);
        }
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        Ok(())
    }

    /// Check a session resolution against the buffer format and the maximum
    pub fn validate_resolution(&self, width: usize, height: usize) -> Result<(), ConfigError> {
        for (w, h) in [(width, height), (self.max_width, self.max_height)] {
            if w == 0 || h == 0 {
                return Err(ConfigError::ZeroDimension {
                    width: w,
                    height: h,
                });
            }
        }

        if width > self.max_width || height > self.max_height {
            return Err(ConfigError::ExceedsMaximum {
                width,
                height,
                max_width: self.max_width,
                max_height: self.max_height,
            });
        }

        let subsampled = is_420(self.buffer_format) || is_422(self.buffer_format);
        let odd_height = is_420(self.buffer_format) && height % 2 != 0;
        if subsampled && (width % 2 != 0 || odd_height) {
            return Err(ConfigError::OddDimensions {
                format: self.buffer_format,
                width,
                height,
            });
        }

        Ok(())
    }
}

/// Interlacing of a submitted picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldMode {
    #[default]
    Progressive,
    TopFieldFirst,
    BottomFieldFirst,
}

/// Mid-stream session change, applied before the frame it arrives with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconfigureRequest {
    pub resolution: Option<(usize, usize)>,
    /// Average bitrate in bits per second
    pub bitrate: Option<u32>,
    pub max_bitrate: Option<u32>,
}

impl ReconfigureRequest {
    pub fn resolution(width: usize, height: usize) -> Self {
        Self {
            resolution: Some((width, height)),
            ..Default::default()
        }
    }

    pub fn bitrate(bitrate: u32, max_bitrate: u32) -> Self {
        Self {
            bitrate: Some(bitrate),
            max_bitrate: Some(max_bitrate),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resolution.is_none() && self.bitrate.is_none() && self.max_bitrate.is_none()
    }

    pub fn validate(&self, config: &PipelineConfig) -> Result<(), ConfigError> {
        if let Some((width, height)) = self.resolution {
            config.validate_resolution(width, height)?;
        }
        if self.bitrate == Some(0) || self.max_bitrate == Some(0) {
            return Err(ConfigError::ZeroBitrate);
        }
        Ok(())
    }
}

/// One frame handed to `EncodePipeline::submit`
#[derive(Debug, Clone, Copy)]
pub struct EncodeFrameConfig<'a> {
    pub source: PixelSurface<'a>,
    pub timestamp: u64,
    pub field_mode: FieldMode,
    pub reconfigure: Option<ReconfigureRequest>,
    pub force_idr: bool,
}

impl<'a> EncodeFrameConfig<'a> {
    pub fn new(source: PixelSurface<'a>, timestamp: u64) -> Self {
        Self {
            source,
            timestamp,
            field_mode: FieldMode::Progressive,
            reconfigure: None,
            force_idr: false,
        }
    }

    pub fn with_field_mode(mut self, field_mode: FieldMode) -> Self {
        self.field_mode = field_mode;
        self
    }

    pub fn with_reconfigure(mut self, request: ReconfigureRequest) -> Self {
        self.reconfigure = Some(request);
        self
    }

    pub fn with_force_idr(mut self) -> Self {
        self.force_idr = true;
        self
    }
}

/// Encoder input layout for a source format
///
/// 4:4:4 sources stay 4:4:4. Float RGB is kept at full chroma resolution
/// only when `force_444` is set. Subsampled sources land in the interleaved
/// layout encoders prefer, except NV21 whose only conversion is to planar.
/// Tiled layouts have no conversion into any encoder input.
pub fn select_buffer_format(source: FormatTag, force_444: bool) -> Option<FormatTag> {
    if is_tiled(source) {
        return None;
    }

    let format = if is_yuv444(source) {
        FormatTag::I444
    } else if is_float_rgb(source) {
        if force_444 {
            FormatTag::I444
        } else {
            FormatTag::Nv12
        }
    } else if source == FormatTag::Nv21 {
        FormatTag::I420
    } else {
        FormatTag::Nv12
    };

    Some(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwenc_video::ConversionKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 32);
        assert_eq!(config.slot_timeout, None);
    }

    #[test]
    fn test_invalid_configs() {
        let base = PipelineConfig::default();

        let config = PipelineConfig { width: 0, ..base };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDimension {
                width: 0,
                height: 1080
            })
        );

        let config = PipelineConfig { width: 3840, ..base };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ExceedsMaximum { .. })
        ));

        let config = PipelineConfig { gop_length: 0, ..base };
        assert_eq!(config.validate(), Err(ConfigError::ZeroGopLength));

        let config = PipelineConfig {
            gop_length: 0,
            picture_type_by_encoder: true,
            ..base
        };
        assert!(config.validate().is_ok());

        let config = PipelineConfig { pool_size: 0, ..base };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPoolSize));

        let config = PipelineConfig {
            buffer_format: FormatTag::Nv12Tiled16x16,
            ..base
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnsupportedBufferFormat(FormatTag::Nv12Tiled16x16))
        );
    }

    #[test]
    fn test_odd_dimensions_depend_on_subsampling() {
        let nv12 = PipelineConfig::new(641, 480, FormatTag::Nv12);
        assert!(matches!(
            nv12.validate(),
            Err(ConfigError::OddDimensions { .. })
        ));

        let i444 = PipelineConfig::new(641, 481, FormatTag::I444);
        assert!(i444.validate().is_ok());
    }

    #[test]
    fn test_reconfigure_validation() {
        let config = PipelineConfig {
            max_width: 3840,
            max_height: 2160,
            ..Default::default()
        };
        assert!(ReconfigureRequest::resolution(3840, 2160).validate(&config).is_ok());
        assert!(ReconfigureRequest::resolution(4096, 2160).validate(&config).is_err());
        assert_eq!(
            ReconfigureRequest::bitrate(0, 8_000_000).validate(&config),
            Err(ConfigError::ZeroBitrate)
        );
        assert!(ReconfigureRequest::default().is_empty());
    }

    #[test]
    fn test_frame_config_builders() {
        let data = [0u8; 64];
        let source = PixelSurface::packed(FormatTag::Vuya, 4, 4, &data, 16);
        let frame = EncodeFrameConfig::new(source, 42)
            .with_field_mode(FieldMode::TopFieldFirst)
            .with_force_idr();
        assert_eq!(frame.timestamp, 42);
        assert_eq!(frame.field_mode, FieldMode::TopFieldFirst);
        assert!(frame.force_idr);
        assert!(frame.reconfigure.is_none());
    }

    #[test]
    fn test_selected_format_is_convertible() {
        for source in FormatTag::ALL {
            for force_444 in [false, true] {
                match select_buffer_format(source, force_444) {
                    Some(target) => assert!(
                        ConversionKind::resolve(source, target).is_some(),
                        "{:?} -> {:?}",
                        source,
                        target
                    ),
                    None => assert!(is_tiled(source)),
                }
            }
        }
    }

    #[test]
    fn test_force_444_only_affects_rgb() {
        assert_eq!(select_buffer_format(FormatTag::BgraF32, false), Some(FormatTag::Nv12));
        assert_eq!(select_buffer_format(FormatTag::BgraF32, true), Some(FormatTag::I444));
        assert_eq!(select_buffer_format(FormatTag::Uyvy, true), Some(FormatTag::Nv12));
        assert_eq!(select_buffer_format(FormatTag::Vuya, false), Some(FormatTag::I444));
    }
}
