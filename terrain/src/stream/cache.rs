//! Slot-array cache of synthesized tile images

use std::sync::Arc;

use image::RgbaImage;
use web_time::Instant;

use super::source::TileSource;
use super::tile::{effective_tile_size, TileCoord, TileGrid};
use crate::error::{StreamError, StreamResult};

/// Cropped tile at a specific LOD
#[derive(Debug)]
pub struct TileImage {
    pub coord: TileCoord,
    pub lod: u8,
    pub pixels: RgbaImage,
    pub memory_size: usize,
    pub created_at: Instant,
}

impl TileImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Crop rectangle `(x, y, width, height)` of a tile inside the mip level for
/// `lod`. Edge tiles are clamped to the level bounds and may be smaller than
/// the effective tile size.
pub fn crop_rect(
    coord: TileCoord,
    tile_size: u32,
    lod: u8,
    level_dimensions: (u32, u32),
) -> (u32, u32, u32, u32) {
    let size = effective_tile_size(tile_size, lod);
    let x = coord.column.saturating_mul(size);
    let y = coord.row.saturating_mul(size);
    let width = size.min(level_dimensions.0.saturating_sub(x));
    let height = size.min(level_dimensions.1.saturating_sub(y));
    (x, y, width, height)
}

/// Crop one tile out of the source
pub fn synthesize_tile(
    source: &dyn TileSource,
    coord: TileCoord,
    tile_size: u32,
    lod: u8,
) -> StreamResult<TileImage> {
    if !source.is_resident() {
        return Err(StreamError::MissingSourceData);
    }

    let (x, y, width, height) = crop_rect(coord, tile_size, lod, source.level_dimensions(lod));
    if width == 0 || height == 0 {
        return Err(StreamError::SurfaceAllocation { width, height });
    }

    let pixels = source.crop(lod, x, y, width, height)?;
    let memory_size = tile_memory_size(width, height);

    Ok(TileImage {
        coord,
        lod,
        pixels,
        memory_size,
        created_at: Instant::now(),
    })
}

/// Memory size of an RGBA8 tile
pub fn tile_memory_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Occupied slot
struct Slot {
    tile: Arc<TileImage>,
    /// Frame number of the last visibility hit
    last_visible: u64,
}

/// Tile cache with one slot per grid cell
pub struct TileCache {
    grid: TileGrid,
    source: Arc<dyn TileSource>,
    slots: Vec<Option<Slot>>,
    current_memory: usize,
    refetch_on_lod_change: bool,
}

impl TileCache {
    /// Empty cache sized for `grid`
    pub fn new(grid: TileGrid, source: Arc<dyn TileSource>) -> Self {
        let mut slots = Vec::with_capacity(grid.slot_count());
        slots.resize_with(grid.slot_count(), || None);
        Self {
            grid,
            source,
            slots,
            current_memory: 0,
            refetch_on_lod_change: false,
        }
    }

    /// Re-synthesize resident tiles requested at a different LOD
    pub fn with_lod_refetch(mut self, enabled: bool) -> Self {
        self.refetch_on_lod_change = enabled;
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    fn checked_index(&self, coord: TileCoord) -> StreamResult<usize> {
        self.grid.slot_index(coord).inspect_err(|e| {
            log::error!("Tile cache contract violation: {}", e);
        })
    }

    /// Tile at `coord`, synthesizing it at `lod` when the slot is empty.
    /// A resident tile is returned as is, whatever LOD it was built at,
    /// unless LOD refetch is enabled. A failure leaves the slot untouched.
    pub fn get_tile(&mut self, coord: TileCoord, lod: u8) -> StreamResult<Arc<TileImage>> {
        let index = self.checked_index(coord)?;

        if let Some(slot) = &self.slots[index] {
            if !self.refetch_on_lod_change || slot.tile.lod == lod {
                return Ok(Arc::clone(&slot.tile));
            }
            log::debug!(
                "Refetching tile {:?} at LOD {} (was {})",
                coord,
                lod,
                slot.tile.lod
            );
        }

        let tile = Arc::new(synthesize_tile(
            self.source.as_ref(),
            coord,
            self.grid.tile_size(),
            lod,
        )?);
        log::debug!(
            "Loaded tile {:?} at LOD {} ({}x{})",
            coord,
            lod,
            tile.pixels.width(),
            tile.pixels.height()
        );

        self.store(index, Arc::clone(&tile), 0);
        Ok(tile)
    }

    /// Put a tile decoded elsewhere into its slot. Only fills empty slots;
    /// returns whether the tile was stored.
    pub fn install(&mut self, tile: TileImage) -> StreamResult<bool> {
        let index = self.checked_index(tile.coord)?;
        if self.slots[index].is_some() {
            return Ok(false);
        }
        log::debug!("Installed tile {:?} at LOD {}", tile.coord, tile.lod);
        self.store(index, Arc::new(tile), 0);
        Ok(true)
    }

    fn store(&mut self, index: usize, tile: Arc<TileImage>, last_visible: u64) {
        let memory_size = tile.memory_size;
        if let Some(old) = self.slots[index].replace(Slot { tile, last_visible }) {
            self.current_memory -= old.tile.memory_size;
        }
        self.current_memory += memory_size;
    }

    /// Empty the slot at `coord`. Evicting an empty slot does nothing.
    pub fn evict(&mut self, coord: TileCoord) -> StreamResult<Option<Arc<TileImage>>> {
        let index = self.checked_index(coord)?;
        Ok(self.evict_index(index))
    }

    fn evict_index(&mut self, index: usize) -> Option<Arc<TileImage>> {
        let slot = self.slots[index].take()?;
        self.current_memory -= slot.tile.memory_size;
        log::debug!("Evicted tile {:?}", slot.tile.coord);
        Some(slot.tile)
    }

    /// Record a visibility hit for a resident tile
    pub fn touch(&mut self, coord: TileCoord, frame: u64) {
        if let Ok(index) = self.grid.slot_index(coord) {
            if let Some(slot) = self.slots[index].as_mut() {
                slot.last_visible = frame;
            }
        }
    }

    /// Evict least recently visible tiles across the whole grid until at most
    /// `max_resident` remain. Tiles seen during `current_frame` are kept even
    /// if that leaves the cache over budget.
    pub fn evict_least_recently_visible(
        &mut self,
        max_resident: usize,
        current_frame: u64,
    ) -> Vec<TileCoord> {
        let resident = self.len();
        if resident <= max_resident {
            return Vec::new();
        }

        let mut candidates: Vec<(u64, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (s.last_visible, index)))
            .filter(|&(last_visible, _)| last_visible < current_frame)
            .collect();
        candidates.sort_unstable();

        candidates
            .into_iter()
            .take(resident - max_resident)
            .filter_map(|(_, index)| self.evict_index(index).map(|tile| tile.coord))
            .collect()
    }

    /// Check if a tile is resident
    pub fn contains(&self, coord: TileCoord) -> bool {
        self.grid
            .slot_index(coord)
            .is_ok_and(|index| self.slots[index].is_some())
    }

    /// Resident tile without loading
    pub fn peek(&self, coord: TileCoord) -> Option<Arc<TileImage>> {
        let index = self.grid.slot_index(coord).ok()?;
        self.slots[index].as_ref().map(|slot| Arc::clone(&slot.tile))
    }

    /// LOD of the resident tile at `coord`
    pub fn lod_of(&self, coord: TileCoord) -> Option<u8> {
        self.peek(coord).map(|tile| tile.lod)
    }

    /// Drop every resident tile
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.current_memory = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Coordinates of all resident tiles in slot order
    pub fn resident(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| self.grid.coord_at(index))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tile_count: self.len(),
            slot_count: self.slots.len(),
            memory_used: self.current_memory,
        }
    }
}

/// Cache statistics for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub tile_count: usize,
    pub slot_count: usize,
    pub memory_used: usize,
}

impl CacheStats {
    pub fn occupancy_percent(&self) -> f32 {
        if self.slot_count == 0 {
            0.0
        } else {
            (self.tile_count as f32 / self.slot_count as f32) * 100.0
        }
    }
}
