//! Error types for tile streaming

/// Rejected streaming configuration
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tile size must be a positive power of two, got {0}")]
    TileSize(u32),

    #[error("LOD threshold {index} is not a finite non-negative distance: {value}")]
    InvalidThreshold { index: usize, value: f32 },

    #[error("LOD thresholds must be ascending: {previous} is followed by {next}")]
    UnsortedThresholds { previous: f32, next: f32 },

    #[error("at most {max} LOD thresholds are supported, got {count}")]
    TooManyThresholds { count: usize, max: usize },

    #[error("max_resident_tiles must be at least 1")]
    ZeroResidentBudget,
}

/// Failure while streaming a single tile or frame
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("source image has no resident pixel data")]
    MissingSourceData,

    #[error("tile ({column}, {row}) is outside the {tiles_per_axis}x{tiles_per_axis} grid")]
    OutOfBounds {
        column: i64,
        row: i64,
        tiles_per_axis: u32,
    },

    #[error("cannot allocate a {width}x{height} tile surface")]
    SurfaceAllocation { width: u32, height: u32 },

    #[error("tile loader worker is no longer running")]
    LoaderDisconnected,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl StreamError {
    /// Whether the failure only affects one tile for one frame
    pub fn is_per_tile(&self) -> bool {
        matches!(
            self,
            StreamError::MissingSourceData
                | StreamError::SurfaceAllocation { .. }
                | StreamError::LoaderDisconnected
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
