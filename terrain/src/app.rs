//! Application context driving the streaming core once per frame
//!
//! Built once at startup and kept for the life of the process. Dropping it
//! stops the background loader; nothing else needs tearing down.

use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::config::StreamingConfig;
use crate::error::{ConfigError, StreamResult};
use crate::stream::camera::PerspectiveCamera;
use crate::stream::source::TileSource;
use crate::stream::surface::TextureSlot;
use crate::stream::{FrameReport, StreamingController};

/// Camera, surface and streaming state for one terrain
pub struct App {
    pub camera: PerspectiveCamera,
    pub surface: TextureSlot,
    streaming: StreamingController,

    /// Texture uploads handed to the renderer so far
    uploads: u64,
    last_frame: Option<Instant>,
    frame_time: Duration,
}

impl App {
    pub fn new(
        config: StreamingConfig,
        source: Arc<dyn TileSource>,
        viewport_width: u32,
        viewport_height: u32,
    ) -> Result<Self, ConfigError> {
        let streaming = StreamingController::new(config, source)?;
        let camera = PerspectiveCamera::new(45.0, viewport_width, viewport_height, 1.0, 1000.0);

        Ok(Self {
            camera,
            surface: TextureSlot::new(),
            streaming,
            uploads: 0,
            last_frame: None,
            frame_time: Duration::ZERO,
        })
    }

    /// Stream tiles for the current camera and consume the surface update
    pub fn frame(&mut self) -> StreamResult<FrameReport> {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            self.frame_time = now.duration_since(last);
        }

        let report = self.streaming.update(&self.camera, &mut self.surface)?;

        if let Some(texture) = self.surface.take_update() {
            self.uploads += 1;
            match texture {
                Some(tile) => log::trace!(
                    "Upload tile {:?} LOD {} ({}x{})",
                    tile.coord,
                    tile.lod,
                    tile.pixels.width(),
                    tile.pixels.height()
                ),
                None => log::trace!("Upload cleared texture"),
            }
        }

        Ok(report)
    }

    /// Handle viewport resize
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.camera.set_viewport(width, height);
        }
    }

    /// Pan camera and target over the terrain
    pub fn pan(&mut self, dx: f32, dz: f32) {
        self.camera.pan(dx, dz);
    }

    /// Move toward (positive) or away from the target
    pub fn zoom(&mut self, amount: f32) {
        self.camera.dolly(amount);
    }

    pub fn streaming(&self) -> &StreamingController {
        &self.streaming
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Time between the last two frames
    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }
}
