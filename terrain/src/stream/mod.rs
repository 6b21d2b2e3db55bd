//! Sparse virtual texture streaming for terrain tiles

pub mod cache;
pub mod camera;
pub mod frustum;
pub mod loader;
pub mod lod;
pub mod source;
pub mod surface;
pub mod tile;

use std::sync::Arc;

use cache::{CacheStats, TileCache, TileImage};
use camera::CameraProvider;
use frustum::Frustum;
use loader::{TileLoadResult, TileLoader};
use lod::LodSelector;
use source::TileSource;
use surface::RenderSurface;
use tile::{TileCoord, TileGrid};

use crate::config::{LoadMode, StreamingConfig};
use crate::error::{ConfigError, StreamError, StreamResult};

/// What happened to the tile window during one `update`
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame: u64,

    /// Tile under the camera, possibly outside the grid
    pub camera_tile: (i64, i64),

    /// Visible tiles published this frame with their selected LOD
    pub visible: Vec<(TileCoord, u8)>,

    /// Window tiles that failed the frustum test
    pub culled: Vec<TileCoord>,

    /// Tiles whose slot was emptied this frame
    pub evicted: Vec<TileCoord>,

    /// Visible tiles still being decoded in the background
    pub pending: Vec<TileCoord>,

    /// Background results stored in the cache this frame
    pub installed: Vec<TileCoord>,

    pub failed: Vec<(TileCoord, StreamError)>,

    /// Window coordinates outside the grid
    pub skipped: usize,
}

/// Per-frame streaming driver
pub struct StreamingController {
    config: StreamingConfig,
    grid: TileGrid,
    lod: LodSelector,
    tile_cache: TileCache,
    tile_loader: Option<TileLoader>,
    frame: u64,
}

impl StreamingController {
    /// Create a controller over `source`
    pub fn new(config: StreamingConfig, source: Arc<dyn TileSource>) -> Result<Self, ConfigError> {
        config.validate()?;

        let (source_width, _) = source.dimensions();
        let grid = TileGrid::new(config.tile_size, source_width);
        let lod = LodSelector::new(config.lod_thresholds.clone())?;

        let tile_cache = TileCache::new(grid, Arc::clone(&source))
            .with_lod_refetch(config.refetch_on_lod_change);
        let tile_loader = match config.load_mode {
            LoadMode::Synchronous => None,
            LoadMode::Background => Some(TileLoader::new(source, config.tile_size)),
        };

        log::info!(
            "Streaming {}x{} tiles of {}px ({:?})",
            grid.tiles_per_axis(),
            grid.tiles_per_axis(),
            grid.tile_size(),
            config.load_mode
        );

        Ok(Self {
            config,
            grid,
            lod,
            tile_cache,
            tile_loader,
            frame: 0,
        })
    }

    /// Update the tile window (call each frame)
    pub fn update(
        &mut self,
        camera: &dyn CameraProvider,
        surface: &mut dyn RenderSurface,
    ) -> StreamResult<FrameReport> {
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        // 0. Store tiles finished by the background loader
        self.process_completed_loads(&mut report)?;

        // 1. Frustum, once for the whole window
        let view = camera.view();
        let frustum = Frustum::from_view_projection(&view.view_projection());

        // 2. Camera tile
        let grid = self.grid;
        let tile_size = grid.tile_size();
        report.camera_tile = grid.world_to_tile(view.position);

        // 3. Window around the camera, clipped to the grid
        let window: Vec<TileCoord> = grid
            .window(report.camera_tile, self.config.visible_range)
            .collect();
        let side = (self.config.visible_range as usize)
            .saturating_mul(2)
            .saturating_add(1);
        report.skipped = side.saturating_mul(side).saturating_sub(window.len());

        // 4. Load visible tiles, evict the rest
        for coord in window {
            if frustum::is_visible(coord, tile_size, &frustum) {
                let lod = self.lod.select_for_tile(coord, tile_size, view.position);
                match self.load(coord, lod) {
                    Ok(Some(tile)) => {
                        self.tile_cache.touch(coord, self.frame);
                        surface.set_active_texture(Some(tile));
                        report.visible.push((coord, lod));
                    }
                    Ok(None) => {
                        surface.set_active_texture(None);
                        report.pending.push(coord);
                    }
                    Err(e) if e.is_per_tile() => {
                        log::warn!("Failed to load tile {:?}: {}", coord, e);
                        report.failed.push((coord, e));
                    }
                    Err(e) => return Err(e),
                }
            } else {
                if let Some(loader) = self.tile_loader.as_mut() {
                    loader.cancel(coord);
                }
                if self.tile_cache.evict(coord)?.is_some() {
                    report.evicted.push(coord);
                }
                surface.set_active_texture(None);
                report.culled.push(coord);
            }
        }

        // 5. Material needs re-upload
        surface.mark_needs_update();

        // 6. Optional grid-wide budget
        if let Some(max) = self.config.max_resident_tiles {
            let evicted = self.tile_cache.evict_least_recently_visible(max, self.frame);
            report.evicted.extend(evicted);
        }

        Ok(report)
    }

    /// Resident tile for `coord`, or `None` while it decodes in the background
    fn load(&mut self, coord: TileCoord, lod: u8) -> StreamResult<Option<Arc<TileImage>>> {
        let Some(loader) = self.tile_loader.as_mut() else {
            return self.tile_cache.get_tile(coord, lod).map(Some);
        };

        if let Some(tile) = self.tile_cache.peek(coord) {
            // Keep showing the old level until the new one arrives
            if self.config.refetch_on_lod_change && tile.lod != lod {
                if loader.pending_lod(&coord).is_some_and(|pending| pending != lod) {
                    loader.cancel(coord);
                }
                loader.request(coord, lod)?;
            }
            return Ok(Some(tile));
        }

        loader.request(coord, lod)?;
        Ok(None)
    }

    fn process_completed_loads(&mut self, report: &mut FrameReport) -> StreamResult<()> {
        let Some(loader) = self.tile_loader.as_mut() else {
            return Ok(());
        };

        while let Some(result) = loader.poll() {
            match result {
                TileLoadResult::Success(tile) => {
                    let coord = tile.coord;
                    if self.config.refetch_on_lod_change
                        && self.tile_cache.lod_of(coord).is_some_and(|lod| lod != tile.lod)
                    {
                        self.tile_cache.evict(coord)?;
                    }
                    if self.tile_cache.install(tile)? {
                        report.installed.push(coord);
                    }
                }
                TileLoadResult::Failed(coord, e) => {
                    log::warn!("Failed to load tile {:?}: {}", coord, e);
                    report.failed.push((coord, e));
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn lod_selector(&self) -> &LodSelector {
        &self.lod
    }

    pub fn cache(&self) -> &TileCache {
        &self.tile_cache
    }

    /// Number of frames processed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.tile_cache.stats()
    }

    /// Get pending tile count
    pub fn pending_tiles(&self) -> usize {
        self.tile_loader
            .as_ref()
            .map_or(0, TileLoader::pending_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::camera::CameraView;
    use crate::stream::source::tests::gradient;
    use crate::stream::source::ImageSource;
    use crate::stream::surface::TextureSlot;
    use glam::{Mat4, Vec3};
    use std::time::{Duration, Instant};

    const TILE: u32 = 16;

    /// 8x8 grid of 16px tiles
    fn controller(config: StreamingConfig) -> StreamingController {
        let source: Arc<dyn TileSource> = Arc::new(ImageSource::new(gradient(128, 128)));
        StreamingController::new(config, source).unwrap()
    }

    fn small_config() -> StreamingConfig {
        StreamingConfig::new(TILE, vec![20.0, 40.0, 80.0], 1)
    }

    fn projection() -> Mat4 {
        Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.5, 1000.0)
    }

    /// Camera above `target` looking straight down
    fn top_down(target: Vec3, height: f32) -> CameraView {
        CameraView::look_at(target + Vec3::Y * height, target, Vec3::NEG_Z, projection())
    }

    /// Low camera looking along +x
    fn looking_east(eye: Vec3) -> CameraView {
        CameraView::look_at(eye, eye + Vec3::X, Vec3::Y, projection())
    }

    fn tile_center(column: u32, row: u32) -> Vec3 {
        TileCoord::new(column, row).center(TILE)
    }

    #[test]
    fn test_window_around_camera_tile() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();
        let camera = top_down(tile_center(5, 5), 40.0);

        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.camera_tile, (5, 5));
        assert_eq!(report.skipped, 0);
        assert_eq!(report.visible.len() + report.culled.len(), 9);

        for column in 4..=6 {
            for row in 4..=6 {
                let coord = TileCoord::new(column, row);
                let visible = report.visible.iter().any(|(c, _)| *c == coord);
                assert_eq!(visible, streaming.cache().contains(coord));
                assert_eq!(visible, !report.culled.contains(&coord));
            }
        }
        assert!(surface.needs_update());
    }

    #[test]
    fn test_culled_tiles_are_evicted_and_cleared() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();

        // Load the whole window first
        let above = top_down(tile_center(5, 5), 40.0);
        let report = streaming.update(&above, &mut surface).unwrap();
        assert_eq!(report.visible.len(), 9);
        assert_eq!(streaming.cache().len(), 9);

        // Turn east: column 4 is behind the camera
        let camera = looking_east(tile_center(5, 5) + Vec3::new(0.0, 2.0, 0.0));
        let report = streaming.update(&camera, &mut surface).unwrap();

        for row in 4..=6 {
            let behind = TileCoord::new(4, row);
            assert!(report.culled.contains(&behind));
            assert!(report.evicted.contains(&behind));
            assert!(!streaming.cache().contains(behind));
        }
        assert!(report.visible.iter().any(|(c, _)| *c == TileCoord::new(6, 5)));
        assert!(streaming.cache().contains(TileCoord::new(6, 5)));

        // Window order ends at (6, 6); last write wins
        let last_visible = report.visible.iter().any(|(c, _)| *c == TileCoord::new(6, 6));
        assert_eq!(surface.active().is_some(), last_visible);
    }

    #[test]
    fn test_out_of_grid_window_coordinates_are_skipped() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();
        let camera = top_down(tile_center(0, 0), 40.0);

        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.camera_tile, (0, 0));
        assert_eq!(report.skipped, 5);
        assert_eq!(report.visible.len() + report.culled.len(), 4);
        assert!(report.failed.is_empty());

        // Camera entirely off the grid
        let camera = top_down(Vec3::new(-500.0, 0.0, -500.0), 40.0);
        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.skipped, 9);
        assert!(report.visible.is_empty());
    }

    #[test]
    fn test_camera_at_extreme_position_is_skipped() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();
        let camera = CameraView::new(
            Mat4::from_translation(Vec3::new(f32::MAX, 10.0, 0.0)),
            projection(),
        );

        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.camera_tile.0, i64::MAX);
        assert_eq!(report.skipped, 9);
        assert!(report.visible.is_empty());
        assert!(report.culled.is_empty());
        assert!(streaming.cache().is_empty());
    }

    #[test]
    fn test_huge_visible_range_stays_in_grid() {
        let mut streaming = controller(StreamingConfig::new(TILE, vec![20.0, 40.0, 80.0], u32::MAX));
        let mut surface = TextureSlot::new();
        let camera = top_down(tile_center(4, 4), 40.0);

        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.visible.len() + report.culled.len(), 64);
        assert!(report.skipped > 0);
    }

    #[test]
    fn test_lod_follows_distance() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();

        let camera = top_down(tile_center(3, 3), 10.0);
        let report = streaming.update(&camera, &mut surface).unwrap();
        let center = report
            .visible
            .iter()
            .find(|(c, _)| *c == TileCoord::new(3, 3))
            .map(|(_, lod)| *lod);
        assert_eq!(center, Some(0));
        assert_eq!(streaming.cache().lod_of(TileCoord::new(3, 3)), Some(0));

        let far = top_down(tile_center(1, 1), 60.0);
        let report = streaming.update(&far, &mut surface).unwrap();
        let lod = report
            .visible
            .iter()
            .find(|(c, _)| *c == TileCoord::new(1, 1))
            .map(|(_, lod)| *lod);
        assert_eq!(lod, Some(2));
        let tile = streaming.cache().peek(TileCoord::new(1, 1)).unwrap();
        assert_eq!(tile.dimensions(), (4, 4));
    }

    #[test]
    fn test_tiles_outside_window_are_kept() {
        let mut streaming = controller(small_config());
        let mut surface = TextureSlot::new();

        streaming
            .update(&top_down(tile_center(1, 1), 40.0), &mut surface)
            .unwrap();
        assert!(streaming.cache().contains(TileCoord::new(0, 0)));

        // Far away window; (0, 0) is never revisited
        streaming
            .update(&top_down(tile_center(6, 6), 40.0), &mut surface)
            .unwrap();
        assert!(streaming.cache().contains(TileCoord::new(0, 0)));
        assert_eq!(streaming.cache().len(), 18);
    }

    #[test]
    fn test_resident_budget_evicts_stale_tiles() {
        let mut streaming = controller(small_config().with_max_resident_tiles(9));
        let mut surface = TextureSlot::new();

        streaming
            .update(&top_down(tile_center(1, 1), 40.0), &mut surface)
            .unwrap();
        let report = streaming
            .update(&top_down(tile_center(6, 6), 40.0), &mut surface)
            .unwrap();

        assert_eq!(streaming.cache().len(), 9);
        assert_eq!(report.evicted.len(), 9);
        assert!(!streaming.cache().contains(TileCoord::new(0, 0)));
        assert!(streaming.cache().contains(TileCoord::new(6, 6)));
    }

    #[test]
    fn test_missing_source_is_isolated_per_tile() {
        let source: Arc<dyn TileSource> = Arc::new(ImageSource::unresident(128, 128));
        let mut streaming = StreamingController::new(small_config(), source).unwrap();
        let mut surface = TextureSlot::new();

        let report = streaming
            .update(&top_down(tile_center(4, 4), 40.0), &mut surface)
            .unwrap();
        assert_eq!(report.failed.len(), 9);
        assert!(report
            .failed
            .iter()
            .all(|(_, e)| *e == StreamError::MissingSourceData));
        assert!(streaming.cache().is_empty());
        assert!(surface.needs_update());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source: Arc<dyn TileSource> = Arc::new(ImageSource::new(gradient(8, 8)));
        let config = StreamingConfig::new(24, vec![1.0], 1);
        assert!(matches!(
            StreamingController::new(config, source),
            Err(ConfigError::TileSize(24))
        ));
    }

    #[test]
    fn test_background_mode_installs_on_later_frame() {
        let config = small_config().with_load_mode(LoadMode::Background);
        let mut streaming = controller(config);
        let mut surface = TextureSlot::new();
        let camera = top_down(tile_center(5, 5), 40.0);

        let first = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(first.pending.len(), 9);
        assert!(first.visible.is_empty());
        assert!(surface.active().is_none());

        let deadline = Instant::now() + Duration::from_secs(10);
        while streaming.cache().len() < 9 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
            streaming.update(&camera, &mut surface).unwrap();
        }

        let report = streaming.update(&camera, &mut surface).unwrap();
        assert_eq!(report.visible.len(), 9);
        assert!(report.pending.is_empty());
        assert_eq!(streaming.pending_tiles(), 0);
        assert!(surface.active().is_some());
    }

    #[test]
    fn test_background_cancel_never_fills_slot() {
        let config = small_config().with_load_mode(LoadMode::Background);
        let mut streaming = controller(config);
        let mut surface = TextureSlot::new();

        // Request the window, then immediately look away from column 4
        streaming
            .update(&top_down(tile_center(5, 5), 40.0), &mut surface)
            .unwrap();
        let east = looking_east(tile_center(5, 5) + Vec3::new(0.0, 2.0, 0.0));

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            streaming.update(&east, &mut surface).unwrap();
            if streaming.pending_tiles() == 0 || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        // Drain anything still on the channel
        std::thread::sleep(Duration::from_millis(20));
        streaming.update(&east, &mut surface).unwrap();

        for row in 4..=6 {
            assert!(!streaming.cache().contains(TileCoord::new(4, row)));
        }
        assert!(streaming.cache().contains(TileCoord::new(6, 5)));
    }
}
