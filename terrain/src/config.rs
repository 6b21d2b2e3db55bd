//! Construction-time streaming configuration

use crate::error::ConfigError;

/// Default tile edge length in pixels at LOD 0
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default LOD distances in world units (LOD 1 from 50, LOD 2 from 150, LOD 3 from 300)
pub const DEFAULT_LOD_THRESHOLDS: [f32; 3] = [50.0, 150.0, 300.0];

/// Default window radius around the camera tile (3x3 window)
pub const DEFAULT_VISIBLE_RANGE: u32 = 1;

/// How tile synthesis is scheduled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Crop on the calling thread during `update`
    #[default]
    Synchronous,
    /// Crop on a worker thread and install results on a later frame
    Background,
}

/// Streaming configuration, immutable once a controller is built
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingConfig {
    /// Tile edge length in pixels at LOD 0 (power of two)
    pub tile_size: u32,

    /// Ascending camera distances at which the next coarser LOD starts
    pub lod_thresholds: Vec<f32>,

    /// Radius of the tile window evaluated around the camera
    pub visible_range: u32,

    pub load_mode: LoadMode,

    /// Grid-wide cap on resident tiles; least recently visible tiles go first.
    /// `None` keeps the bounded-window behavior where only tiles inside the
    /// window are ever evicted.
    pub max_resident_tiles: Option<usize>,

    /// Re-synthesize a resident tile when a different LOD is requested
    pub refetch_on_lod_change: bool,
}

impl StreamingConfig {
    pub fn new(tile_size: u32, lod_thresholds: Vec<f32>, visible_range: u32) -> Self {
        Self {
            tile_size,
            lod_thresholds,
            visible_range,
            ..Self::default()
        }
    }

    pub fn with_load_mode(mut self, load_mode: LoadMode) -> Self {
        self.load_mode = load_mode;
        self
    }

    pub fn with_max_resident_tiles(mut self, max: usize) -> Self {
        self.max_resident_tiles = Some(max);
        self
    }

    pub fn with_lod_refetch(mut self, enabled: bool) -> Self {
        self.refetch_on_lod_change = enabled;
        self
    }

    /// Check every field; the first problem found is returned
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 || !self.tile_size.is_power_of_two() {
            return Err(ConfigError::TileSize(self.tile_size));
        }

        validate_thresholds(&self.lod_thresholds)?;

        if self.max_resident_tiles == Some(0) {
            return Err(ConfigError::ZeroResidentBudget);
        }

        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            lod_thresholds: DEFAULT_LOD_THRESHOLDS.to_vec(),
            visible_range: DEFAULT_VISIBLE_RANGE,
            load_mode: LoadMode::Synchronous,
            max_resident_tiles: None,
            refetch_on_lod_change: false,
        }
    }
}

/// Most thresholds a selector accepts; the coarsest LOD must fit a `u8`
pub const MAX_LOD_THRESHOLDS: usize = u8::MAX as usize;

/// Thresholds must be finite, non-negative and non-decreasing
pub fn validate_thresholds(thresholds: &[f32]) -> Result<(), ConfigError> {
    if thresholds.len() > MAX_LOD_THRESHOLDS {
        return Err(ConfigError::TooManyThresholds {
            count: thresholds.len(),
            max: MAX_LOD_THRESHOLDS,
        });
    }

    for (index, &value) in thresholds.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidThreshold { index, value });
        }
    }

    for pair in thresholds.windows(2) {
        if pair[1] < pair[0] {
            return Err(ConfigError::UnsortedThresholds {
                previous: pair[0],
                next: pair[1],
            });
        }
    }

    Ok(())
}
