//! Source image access for tile synthesis
//!
//! The streaming core never decodes images itself. It asks a [`TileSource`]
//! for the dimensions of the full-resolution texture and for cropped pixel
//! regions at a given mip level. [`ImageSource`] is the in-memory
//! implementation backed by the `image` crate.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::{StreamError, StreamResult};

/// Image-decode provider for the tile cache
pub trait TileSource: Send + Sync {
    /// Full-resolution size in pixels, known even when pixels are not resident
    fn dimensions(&self) -> (u32, u32);

    /// Whether decoded pixel data is available
    fn is_resident(&self) -> bool;

    /// Size of the source at `lod`, halved per level and never below 1x1
    fn level_dimensions(&self, lod: u8) -> (u32, u32) {
        let (width, height) = self.dimensions();
        (halve(width, lod), halve(height, lod))
    }

    /// Copy the `width`x`height` region at (`x`, `y`) of mip level `lod`.
    /// Fails with `MissingSourceData` when no pixels are resident.
    fn crop(&self, lod: u8, x: u32, y: u32, width: u32, height: u32) -> StreamResult<RgbaImage>;
}

fn halve(size: u32, lod: u8) -> u32 {
    size.checked_shr(lod as u32).unwrap_or(0).max(1)
}

/// Decoded source image with its mip chain
pub struct ImageSource {
    width: u32,
    height: u32,

    /// Level 0 is the full image, each following level half the size.
    /// `None` until pixels are resident.
    levels: Option<Vec<RgbaImage>>,
}

impl ImageSource {
    /// Take ownership of a decoded image and build its mip chain
    pub fn new(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let levels = build_mip_chain(image);
        log::debug!(
            "Source image {}x{} with {} mip levels",
            width,
            height,
            levels.len()
        );
        Self {
            width,
            height,
            levels: Some(levels),
        }
    }

    /// Source whose size is known but whose pixels have not arrived
    pub fn unresident(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            levels: None,
        }
    }

    /// Decode an encoded image (png/jpeg) from memory
    pub fn from_memory(data: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(data)?;
        Ok(Self::new(img.to_rgba8()))
    }

    /// Decode an image file from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let img = image::open(path)?;
        Ok(Self::new(img.to_rgba8()))
    }

    /// Attach decoded pixels to an unresident source
    pub fn make_resident(&mut self, image: RgbaImage) {
        let (width, height) = image.dimensions();
        self.width = width;
        self.height = height;
        self.levels = Some(build_mip_chain(image));
    }

    /// Drop decoded pixels, keeping the dimensions
    pub fn release(&mut self) {
        self.levels = None;
    }

    pub fn mip_count(&self) -> usize {
        self.levels.as_ref().map_or(0, Vec::len)
    }

    /// Approximate bytes held by the mip chain
    pub fn memory_size(&self) -> usize {
        self.levels
            .as_ref()
            .map_or(0, |levels| levels.iter().map(|level| level.as_raw().len()).sum())
    }
}

impl TileSource for ImageSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_resident(&self) -> bool {
        self.levels.is_some()
    }

    fn level_dimensions(&self, lod: u8) -> (u32, u32) {
        match &self.levels {
            Some(levels) => levels[(lod as usize).min(levels.len() - 1)].dimensions(),
            None => (halve(self.width, lod), halve(self.height, lod)),
        }
    }

    fn crop(&self, lod: u8, x: u32, y: u32, width: u32, height: u32) -> StreamResult<RgbaImage> {
        let levels = self.levels.as_ref().ok_or(StreamError::MissingSourceData)?;
        let level = &levels[(lod as usize).min(levels.len() - 1)];

        if width == 0 || height == 0 {
            return Err(StreamError::SurfaceAllocation { width, height });
        }

        Ok(imageops::crop_imm(level, x, y, width, height).to_image())
    }
}

/// Successive halvings down to 1x1, level 0 being the input
pub fn build_mip_chain(image: RgbaImage) -> Vec<RgbaImage> {
    let mut levels = vec![image];

    loop {
        let Some(last) = levels.last() else {
            break;
        };
        let (width, height) = last.dimensions();
        if width <= 1 && height <= 1 {
            break;
        }
        let next = imageops::resize(
            last,
            (width / 2).max(1),
            (height / 2).max(1),
            FilterType::Triangle,
        );
        levels.push(next);
    }

    levels
}
