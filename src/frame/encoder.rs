//! Frame encoding types
//!
//! The server streams already-encoded bytes. Producers that hold raw pixel
//! buffers go through a `FrameEncoder`; the `encoder` feature provides one
//! backed by the `image` crate.

use std::borrow::Cow;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::EncodeError;

/// Channel order of raw pixel buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Blue, green, red (OpenCV order)
    #[default]
    Bgr,
    /// Red, green, blue
    Rgb,
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgr" => Ok(PixelFormat::Bgr),
            "rgb" => Ok(PixelFormat::Rgb),
            other => Err(format!("unknown pixel format: {}", other)),
        }
    }
}

/// Output image format of streamed frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    /// MIME type sent in each multipart part header
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Ok(ImageFormat::Jpeg),
            "PNG" => Ok(ImageFormat::Png),
            other => Err(format!("unknown image format: {}", other)),
        }
    }
}

/// Quality knobs handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// PNG compression level (0-9)
    pub png_compression: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 75,
            png_compression: 1,
        }
    }
}

/// A borrowed raw pixel buffer, row-major, interleaved channels
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 3 (color) or 4 (color + alpha)
    pub channels: u8,
    pub pixel_format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Create a raw frame description
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        pixel_format: PixelFormat,
        data: &'a [u8],
    ) -> Self {
        Self {
            width,
            height,
            channels,
            pixel_format,
            data,
        }
    }

    /// Check that the buffer length matches the dimensions
    pub fn validate(&self) -> Result<(), EncodeError> {
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(EncodeError::UnsupportedChannels(self.channels));
        }

        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.data.len() != expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Get pixel data in RGB(A) order
    ///
    /// BGR(A) buffers are copied with the first and third channel swapped;
    /// RGB and grayscale buffers are borrowed as-is.
    pub fn to_rgb(&self) -> Cow<'a, [u8]> {
        if self.pixel_format == PixelFormat::Rgb || self.channels < 3 {
            return Cow::Borrowed(self.data);
        }

        let mut out = self.data.to_vec();
        for pixel in out.chunks_exact_mut(self.channels as usize) {
            pixel.swap(0, 2);
        }
        Cow::Owned(out)
    }
}

/// Turns raw pixel buffers into encoded image bytes
pub trait FrameEncoder: Send + Sync + 'static {
    /// Encode `frame` into `format`
    fn encode(
        &self,
        frame: &RawFrame<'_>,
        format: ImageFormat,
        settings: EncodeSettings,
    ) -> Result<Bytes, EncodeError>;
}

/// `FrameEncoder` backed by the `image` crate
#[cfg(feature = "encoder")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEncoder;

#[cfg(feature = "encoder")]
impl FrameEncoder for ImageEncoder {
    fn encode(
        &self,
        frame: &RawFrame<'_>,
        format: ImageFormat,
        settings: EncodeSettings,
    ) -> Result<Bytes, EncodeError> {
        use image::codecs::jpeg::JpegEncoder;
        use image::codecs::png::{CompressionType, FilterType, PngEncoder};
        use image::{ExtendedColorType, ImageEncoder as _};

        frame.validate()?;
        let rgb = frame.to_rgb();
        let mut out = Vec::new();

        let result = match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                let (pixels, color) = match frame.channels {
                    1 => (Cow::Borrowed(rgb.as_ref()), ExtendedColorType::L8),
                    4 => (
                        Cow::Owned(
                            rgb.chunks_exact(4)
                                .flat_map(|p| [p[0], p[1], p[2]])
                                .collect::<Vec<u8>>(),
                        ),
                        ExtendedColorType::Rgb8,
                    ),
                    _ => (Cow::Borrowed(rgb.as_ref()), ExtendedColorType::Rgb8),
                };
                let quality = settings.jpeg_quality.clamp(1, 100);
                JpegEncoder::new_with_quality(&mut out, quality).write_image(
                    &pixels,
                    frame.width,
                    frame.height,
                    color,
                )
            }
            ImageFormat::Png => {
                let color = match frame.channels {
                    1 => ExtendedColorType::L8,
                    4 => ExtendedColorType::Rgba8,
                    _ => ExtendedColorType::Rgb8,
                };
                let compression = match settings.png_compression {
                    0..=3 => CompressionType::Fast,
                    4..=6 => CompressionType::Default,
                    _ => CompressionType::Best,
                };
                PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive)
                    .write_image(&rgb, frame.width, frame.height, color)
            }
        };

        result.map_err(|e| EncodeError::Backend(e.to_string()))?;
        Ok(Bytes::from(out))
    }
}
