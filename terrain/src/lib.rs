//! Sparse virtual texture streaming for large terrain surfaces.
//!
//! One high-resolution source image is split into a square grid of tiles.
//! Each frame, [`StreamingController`] walks a small window of tiles around
//! the camera, culls them against the view frustum, picks a level of detail
//! from the camera distance and loads or evicts tiles in the [`TileCache`].

pub mod app;
pub mod config;
pub mod error;
pub mod stream;

pub use config::{LoadMode, StreamingConfig};
pub use error::{ConfigError, StreamError, StreamResult};
pub use stream::cache::{TileCache, TileImage};
pub use stream::camera::{CameraProvider, CameraView, PerspectiveCamera};
pub use stream::source::{ImageSource, TileSource};
pub use stream::surface::{RenderSurface, TextureSlot};
pub use stream::tile::{TileCoord, TileGrid};
pub use stream::{FrameReport, StreamingController};
