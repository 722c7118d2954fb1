use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

/// Memory layout of a single pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One luma byte per pixel.
    Gray8,
    /// Three bytes per pixel: R, G, B.
    Rgb8,
    /// Four bytes per pixel: R, G, B, A.
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded video frame.
///
/// Pixels are stored tightly packed in row-major order:
///   offset(x, y) = (y * width + x) * channels
///
/// A frame is owned by exactly one slot at a time. `clone()` is always a deep
/// copy; `clone_from()` reuses the destination's allocation, which keeps the
/// per-frame copy into the result slot allocation-free once warmed up.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            format: self.format,
            data: self.data.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.width = source.width;
        self.height = source.height;
        self.format = source.format;
        self.data.clone_from(&source.data);
    }
}

impl Frame {
    /// Create a zeroed (black, fully transparent for RGBA) frame.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    /// Create a frame where every pixel is set to `pixel`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: &[u8]) -> Self {
        let mut frame = Self::new(width, height, format);
        frame.fill(pixel);
        frame
    }

    /// Wrap raw pixel bytes, checking that the length matches the geometry.
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    // -- Accessors ---------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of pixels (not bytes).
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns true if both frames have identical width, height and format.
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * self.format.channels())
    }

    /// The channel bytes of the pixel at (x, y), or None if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let start = self.offset(x, y)?;
        Some(&self.data[start..start + self.format.channels()])
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        let start = self.offset(x, y)?;
        let channels = self.format.channels();
        Some(&mut self.data[start..start + channels])
    }

    /// Overwrite the pixel at (x, y). Returns false if the coordinates are out
    /// of bounds. Extra channels in `pixel` are ignored, missing ones are left
    /// untouched.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: &[u8]) -> bool {
        match self.pixel_mut(x, y) {
            Some(dst) => {
                let n = dst.len().min(pixel.len());
                dst[..n].copy_from_slice(&pixel[..n]);
                true
            }
            None => false,
        }
    }

    /// Set every pixel to `pixel`.
    pub fn fill(&mut self, pixel: &[u8]) {
        let channels = self.format.channels();
        let n = channels.min(pixel.len());
        for chunk in self.data.chunks_exact_mut(channels) {
            chunk[..n].copy_from_slice(&pixel[..n]);
        }
    }

    /// Sum of all channel bytes. Cheap fingerprint used by tests and logging.
    pub fn pixel_sum(&self) -> u64 {
        self.data.iter().map(|&b| b as u64).sum()
    }

    // -- image interop -----------------------------------------------------------

    /// Convert a decoded image into a frame.
    ///
    /// Luma images stay single channel, images with alpha become RGBA, and
    /// everything else (16-bit, float, luma+alpha without color) is
    /// normalized to 8-bit RGB or RGBA.
    pub fn from_image(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(buf) => {
                let (width, height) = buf.dimensions();
                Self {
                    width,
                    height,
                    format: PixelFormat::Gray8,
                    data: buf.into_raw(),
                }
            }
            DynamicImage::ImageRgb8(buf) => {
                let (width, height) = buf.dimensions();
                Self {
                    width,
                    height,
                    format: PixelFormat::Rgb8,
                    data: buf.into_raw(),
                }
            }
            other if other.color().has_alpha() => {
                let buf = other.into_rgba8();
                let (width, height) = buf.dimensions();
                Self {
                    width,
                    height,
                    format: PixelFormat::Rgba8,
                    data: buf.into_raw(),
                }
            }
            other => {
                let buf = other.into_rgb8();
                let (width, height) = buf.dimensions();
                Self {
                    width,
                    height,
                    format: PixelFormat::Rgb8,
                    data: buf.into_raw(),
                }
            }
        }
    }

    /// Copy the frame into an `image` buffer for encoding.
    pub fn to_image(&self) -> Result<DynamicImage, FrameError> {
        let data = self.data.clone();
        let image = match self.format {
            PixelFormat::Gray8 => GrayImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageLuma8),
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(self.width, self.height, data).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(self.width, self.height, data).map(DynamicImage::ImageRgba8)
            }
        };
        image.ok_or(FrameError::SizeMismatch {
            got: self.data.len(),
            expected: self.pixel_count() * self.format.channels(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame data has {got} bytes, expected {expected} for its geometry")]
    SizeMismatch { got: usize, expected: usize },
}
