//! Image decoding and pixel access.
//!
//! This module provides the [`Image`] type, an owned 8-bit RGB image, and [`Resolution`].
//!
//! Decoding is the only part of the crate that deals with encoded image data. Everything past
//! [`Image::decode`] works on decoded pixels.

mod resolution;


use std::path::Path;

use anyhow::Context;
use image::{ImageBuffer, Rgb, RgbImage};

pub use resolution::*;

#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image in RGB channel order.
#[derive(Clone)]
pub struct Image {
    buf: RgbImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data =
            std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
        let buf = image::load_from_memory_with_format(&data, format.to_image_format())?.to_rgb8();
        Ok(Self { buf })
    }

    /// Decodes an encoded image (JPEG, PNG or GIF) from a byte slice.
    ///
    /// The format is guessed from the data. Empty or undecodable data results in an error.
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        if data.is_empty() {
            anyhow::bail!("image data is empty");
        }

        let format = image::guess_format(data).context("unrecognized image format")?;
        let buf = image::load_from_memory_with_format(data, format)
            .with_context(|| format!("failed to decode {:?} image", format))?
            .to_rgb8();
        log::trace!("decoded {:?} image ({}x{})", format, buf.width(), buf.height());
        Ok(Self { buf })
    }

    /// Creates an image from a buffer of tightly packed RGB pixels.
    ///
    /// Returns an error if `buf` does not contain exactly `3 * width * height` bytes.
    pub fn from_rgb8(res: Resolution, buf: &[u8]) -> anyhow::Result<Self> {
        let expected_size = res.num_pixels() * 3;
        anyhow::ensure!(
            expected_size == buf.len() as u64,
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        let buf = ImageBuffer::from_vec(res.width(), res.height(), buf.to_vec())
            .context("buffer size does not match image resolution")?;
        Ok(Self { buf })
    }

    /// Creates an image of a specified size, with every pixel set to black.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image of a specified size, with every pixel set to `rgb`.
    pub fn filled(res: Resolution, rgb: [u8; 3]) -> Self {
        Self {
            buf: ImageBuffer::from_pixel(res.width(), res.height(), Rgb(rgb)),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 3] {
        self.buf[(x, y)].0
    }

    /// Sets the color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.buf[(x, y)] = Rgb(rgb);
    }

    /// Returns a copy of this image, mirrored along the vertical axis.
    pub fn flip_horizontal(&self) -> Image {
        Image {
            buf: image::imageops::flip_horizontal(&self.buf),
        }
    }

    /// Returns the raw RGB pixel data, row by row.
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}
