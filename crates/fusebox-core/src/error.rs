use thiserror::Error;

use crate::fusion::FusionKey;
use crate::series::SeriesId;
use crate::viewport::ViewportId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FuseboxError {
    #[error("Image load failed for {viewport}: {message}")]
    ImageLoad {
        viewport: ViewportId,
        message: String,
    },

    #[error("Fusion preload failed for {key}: {reason}")]
    FusionPreload { key: FusionKey, reason: String },

    #[error("Slice {index} of {key} could not be fused: {reason}")]
    SliceFusion {
        key: FusionKey,
        index: usize,
        reason: String,
    },

    #[error("Secondary {secondary} is already assigned to another viewport")]
    AssignmentConflict { secondary: SeriesId },

    #[error("Primary {series} is unavailable: {reason}")]
    PrimarySeriesUnavailable { series: SeriesId, reason: String },

    #[error("Could not fetch {series}: {reason}")]
    SeriesFetch { series: SeriesId, reason: String },

    #[error("Invalid sync value for {field}: {value}")]
    InvalidSyncValue { field: &'static str, value: f32 },

    #[error("Unknown viewport: {0}")]
    UnknownViewport(ViewportId),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FuseboxError>;
