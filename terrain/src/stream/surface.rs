//! Rendering-surface collaborator

use std::sync::Arc;

use super::cache::TileImage;

/// Renderable surface with one active texture slot
pub trait RenderSurface {
    /// Replace the active texture, `None` clears it
    fn set_active_texture(&mut self, tile: Option<Arc<TileImage>>);

    /// Flag the material for re-upload before the next draw
    fn mark_needs_update(&mut self);
}

/// In-memory surface; the renderer reads and resets it after each frame
#[derive(Debug, Default)]
pub struct TextureSlot {
    active: Option<Arc<TileImage>>,
    needs_update: bool,

    /// Texture assignments since the last `take_update`
    pub writes: usize,
}

impl TextureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Arc<TileImage>> {
        self.active.as_ref()
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Consume the update flag, returning the texture to upload if any
    pub fn take_update(&mut self) -> Option<Option<Arc<TileImage>>> {
        if !self.needs_update {
            return None;
        }
        self.needs_update = false;
        self.writes = 0;
        Some(self.active.clone())
    }
}

impl RenderSurface for TextureSlot {
    fn set_active_texture(&mut self, tile: Option<Arc<TileImage>>) {
        self.active = tile;
        self.writes += 1;
    }

    fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::tile::TileCoord;
    use image::RgbaImage;
    use web_time::Instant;

    fn tile() -> Arc<TileImage> {
        Arc::new(TileImage {
            coord: TileCoord::new(0, 0),
            lod: 0,
            pixels: RgbaImage::new(2, 2),
            memory_size: 16,
            created_at: Instant::now(),
        })
    }

    #[test]
    fn test_take_update_resets_flag() {
        let mut slot = TextureSlot::new();
        assert!(slot.take_update().is_none());

        slot.set_active_texture(Some(tile()));
        slot.mark_needs_update();
        assert_eq!(slot.writes, 1);

        let update = slot.take_update().unwrap();
        assert!(update.is_some());
        assert!(!slot.needs_update());
        assert_eq!(slot.writes, 0);
        assert!(slot.active().is_some());
    }

    #[test]
    fn test_clear_active_texture() {
        let mut slot = TextureSlot::new();
        slot.set_active_texture(Some(tile()));
        slot.set_active_texture(None);
        slot.mark_needs_update();
        assert!(slot.active().is_none());
        assert!(matches!(slot.take_update(), Some(None)));
    }
}
