//! Error types for image operations.
//!
//! Only genuine faults live here. Expected absences (no face, no asset,
//! segmentation unavailable) are modelled as outcome enums next to the
//! operation that produces them and never surface as a `MediaError`.

use std::path::PathBuf;
use thiserror::Error;

use facefx_models::ParamError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during image processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Input image not readable: {0}")]
    InvalidImage(String),

    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] ParamError),

    #[error("Landmark detection failed: {0}")]
    DetectionFailed(String),

    #[error("Segmentation failed: {0}")]
    SegmentationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Buffer dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("No transform slot available after {0} seconds")]
    GateTimeout(u64),

    #[error("Concurrency gate closed")]
    GateClosed,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an unreadable-input error.
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create a segmentation failure error.
    pub fn segmentation_failed(message: impl Into<String>) -> Self {
        Self::SegmentationFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the caller supplied something unusable (bad bytes, bad params).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            MediaError::InvalidImage(_) | MediaError::InvalidParams(_) | MediaError::FileNotFound(_)
        )
    }

    /// Whether the request was rejected for lack of capacity and may be retried.
    pub fn is_capacity_fault(&self) -> bool {
        matches!(
            self,
            MediaError::GateTimeout(_) | MediaError::GateClosed | MediaError::Timeout(_)
        )
    }
}
