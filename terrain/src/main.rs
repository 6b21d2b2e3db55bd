//! Headless streaming demo: flies a camera diagonally across a terrain
//! texture and logs what the streaming core loads and evicts.
//!
//! Usage: `svt-demo [IMAGE] [FRAMES]`. Without an image a procedural
//! 2048x2048 texture is used. Set `RUST_LOG=debug` to see tile traffic.

use std::sync::Arc;

use anyhow::Context;
use image::{Rgba, RgbaImage};
use log::{error, info, warn};
use svt_terrain::app::App;
use svt_terrain::{ImageSource, LoadMode, StreamingConfig, TileSource};

const DEFAULT_FRAMES: u32 = 240;
const PROCEDURAL_SIZE: u32 = 2048;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let image_path = args.next();
    let frames = match args.next() {
        Some(value) => value
            .parse::<u32>()
            .with_context(|| format!("invalid frame count {:?}", value))?,
        None => DEFAULT_FRAMES,
    };

    let source = match &image_path {
        Some(path) => ImageSource::open(path).with_context(|| format!("failed to open {}", path))?,
        None => {
            info!("No image given, using a procedural {0}x{0} texture", PROCEDURAL_SIZE);
            ImageSource::new(procedural_texture(PROCEDURAL_SIZE))
        }
    };
    let (width, height) = source.dimensions();
    info!("Source {}x{} ({} mip levels)", width, height, source.mip_count());

    let load_mode = match std::env::var("SVT_BACKGROUND") {
        Ok(_) => LoadMode::Background,
        Err(_) => LoadMode::Synchronous,
    };
    let config = StreamingConfig::default().with_load_mode(load_mode);
    let mut app = App::new(config, Arc::new(source), 1280, 720).context("invalid configuration")?;

    // Start over the first tile, looking down from 50 units
    let tile_size = app.streaming().grid().tile_size() as f32;
    let half = tile_size * 0.5;
    app.camera.position = glam::Vec3::new(half, 50.0, half);
    app.camera.target = glam::Vec3::new(half, 0.0, half);

    let step = width.max(1) as f32 / frames.max(1) as f32;

    for _ in 0..frames {
        match app.frame() {
            Ok(report) => {
                for (coord, e) in &report.failed {
                    warn!("frame {}: tile {:?} failed: {}", report.frame, coord, e);
                }
                log::debug!(
                    "frame {}: camera tile {:?}, {} visible, {} culled, {} evicted, {} pending",
                    report.frame,
                    report.camera_tile,
                    report.visible.len(),
                    report.culled.len(),
                    report.evicted.len(),
                    report.pending.len()
                );
            }
            Err(e) => error!("frame: {}", e),
        }
        app.pan(step, step);
    }

    let stats = app.streaming().cache_stats();
    info!(
        "{} frames, {} uploads, {}/{} tiles resident ({:.1}%), {} KiB, last frame {:?}",
        app.streaming().frame(),
        app.uploads(),
        stats.tile_count,
        stats.slot_count,
        stats.occupancy_percent(),
        stats.memory_used / 1024,
        app.frame_time()
    );

    Ok(())
}

/// Checkerboard with a diagonal gradient so tiles and LODs are easy to tell apart
fn procedural_texture(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let checker = ((x / 64) + (y / 64)) % 2 == 0;
        let shade = ((x + y) * 255 / (2 * size)) as u8;
        if checker {
            Rgba([shade, 160, 255 - shade, 255])
        } else {
            Rgba([40, shade, 90, 255])
        }
    })
}
