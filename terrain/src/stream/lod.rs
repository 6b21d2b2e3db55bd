//! Distance-based LOD selection for terrain tiles
//!
//! LOD 0 is full tile resolution; each level halves the tile edge.
//! Thresholds are camera distances in world units, validated ascending at
//! construction so the selection is monotonic in distance.

use glam::Vec3;

use super::tile::TileCoord;
use crate::config::validate_thresholds;
use crate::error::ConfigError;

/// Maps camera-to-tile distance to a discrete LOD
#[derive(Debug, Clone, PartialEq)]
pub struct LodSelector {
    thresholds: Vec<f32>,
}

impl LodSelector {
    pub fn new(thresholds: Vec<f32>) -> Result<Self, ConfigError> {
        validate_thresholds(&thresholds)?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[f32] {
        &self.thresholds
    }

    /// Coarsest level this selector can return
    pub fn max_lod(&self) -> u8 {
        self.thresholds.len().min(u8::MAX as usize) as u8
    }

    /// Index of the first threshold strictly greater than `distance`,
    /// or the number of thresholds when none is
    pub fn select(&self, distance: f32) -> u8 {
        self.thresholds
            .iter()
            .position(|&threshold| distance < threshold)
            .map_or(self.max_lod(), |lod| u8::try_from(lod).unwrap_or(u8::MAX))
    }

    /// LOD for a tile given the camera position. The tile center sits on
    /// the flat terrain plane; the camera height counts toward the distance.
    pub fn select_for_tile(&self, coord: TileCoord, tile_size: u32, camera_position: Vec3) -> u8 {
        let distance = camera_position.distance(coord.center(tile_size));
        self.select(distance)
    }
}

impl Default for LodSelector {
    fn default() -> Self {
        Self {
            thresholds: crate::config::DEFAULT_LOD_THRESHOLDS.to_vec(),
        }
    }
}
