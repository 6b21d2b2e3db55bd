//! Tile grid layout and slot indexing
//! Tiles are square crops of the source image, addressed row-major

use glam::Vec3;

use crate::error::{StreamError, StreamResult};

/// Grid coordinate of a tile
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TileCoord {
    pub column: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// World-space center of the tile on the flat terrain plane (y = 0)
    pub fn center(&self, tile_size: u32) -> Vec3 {
        let size = tile_size as f32;
        Vec3::new(
            (self.column as f32 + 0.5) * size,
            0.0,
            (self.row as f32 + 0.5) * size,
        )
    }
}

/// Square tile grid over one source image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    tile_size: u32,
    tiles_per_axis: u32,
}

impl TileGrid {
    /// Grid covering a source `source_width` pixels wide.
    /// Always at least one tile per axis.
    pub fn new(tile_size: u32, source_width: u32) -> Self {
        debug_assert!(tile_size.is_power_of_two());
        let tiles_per_axis = source_width.div_ceil(tile_size).max(1);
        Self {
            tile_size,
            tiles_per_axis,
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn tiles_per_axis(&self) -> u32 {
        self.tiles_per_axis
    }

    /// Number of slots backing the grid (tiles_per_axis²)
    pub fn slot_count(&self) -> usize {
        (self.tiles_per_axis as usize) * (self.tiles_per_axis as usize)
    }

    /// Row-major flattening. Only meaningful for in-bounds coordinates.
    pub fn flatten_index(&self, column: u32, row: u32) -> usize {
        row as usize * self.tiles_per_axis as usize + column as usize
    }

    /// Inverse of `flatten_index`
    pub fn coord_at(&self, index: usize) -> TileCoord {
        let n = self.tiles_per_axis as usize;
        TileCoord::new((index % n) as u32, (index / n) as u32)
    }

    /// Check signed window coordinates before they become a `TileCoord`
    pub fn contains(&self, column: i64, row: i64) -> bool {
        let n = self.tiles_per_axis as i64;
        column >= 0 && row >= 0 && column < n && row < n
    }

    /// Checked slot lookup
    pub fn slot_index(&self, coord: TileCoord) -> StreamResult<usize> {
        if !self.contains(coord.column as i64, coord.row as i64) {
            return Err(StreamError::OutOfBounds {
                column: coord.column as i64,
                row: coord.row as i64,
                tiles_per_axis: self.tiles_per_axis,
            });
        }
        Ok(self.flatten_index(coord.column, coord.row))
    }

    /// Tile containing a world position (x/z plane), not clamped to the grid
    pub fn world_to_tile(&self, position: Vec3) -> (i64, i64) {
        let size = self.tile_size as f32;
        (
            (position.x / size).floor() as i64,
            (position.z / size).floor() as i64,
        )
    }

    /// In-grid coordinates of the square window of `radius` around `center`,
    /// column by column. The window is clipped to the grid before iterating.
    pub fn window(&self, center: (i64, i64), radius: u32) -> impl Iterator<Item = TileCoord> + '_ {
        let columns = self.clip_axis(center.0, radius);
        let rows = self.clip_axis(center.1, radius);
        columns
            .flat_map(move |column| rows.clone().map(move |row| (column, row)))
            .filter(|&(column, row)| self.contains(column, row))
            .map(|(column, row)| TileCoord::new(column as u32, row as u32))
    }

    /// `center ± radius` on one axis, intersected with `0..tiles_per_axis`
    fn clip_axis(&self, center: i64, radius: u32) -> std::ops::RangeInclusive<i64> {
        let r = radius as i64;
        let low = center.saturating_sub(r).max(0);
        let high = center.saturating_add(r).min(self.tiles_per_axis as i64 - 1);
        low..=high
    }
}

/// Edge length of a tile at `lod`, never below one pixel
pub fn effective_tile_size(tile_size: u32, lod: u8) -> u32 {
    tile_size.checked_shr(lod as u32).unwrap_or(0).max(1)
}
