//! Face-anchored compositing and image filters.
//!
//! This crate provides:
//! - Lazy, call-serialized face landmark detection
//! - Landmark-anchored overlay placement with alpha compositing
//! - A cached overlay asset store with an override directory
//! - Background blur behind a segmented foreground, degrading to blur-only
//! - Skin smoothing and LUT / colormap colour grading
//! - A concurrency gate bounding model-backed work
//! - ONNX Runtime face mesh and segmentation collaborators

pub mod anchor;
pub mod assets;
pub mod background;
pub mod compositor;
pub mod config;
pub mod error;
pub mod files;
pub mod gate;
pub mod imaging;
pub mod inference;
pub mod landmarks;
pub mod metrics;
pub mod morph;
pub mod service;
pub mod sticker;
pub mod tone;

pub use anchor::{compute_placement, PlacementRect};
pub use assets::{AssetCache, OverlayAsset};
pub use background::{BackgroundCompositor, BlurPath, FallbackReason, ForegroundSegmenter};
pub use compositor::{composite_region, merge};
pub use config::MediaConfig;
pub use error::{MediaError, MediaResult};
pub use files::{output_path, output_suffix};
pub use gate::{ConcurrencyGate, GatePermit};
pub use imaging::OutputFormat;
pub use inference::{OrtFaceMeshDetector, OrtSegmenter};
pub use landmarks::{
    DetectorOptions, LandmarkDetector, LandmarkProvider, LandmarkSet, NormalizedPoint,
    FACE_MESH_LANDMARK_COUNT,
};
pub use morph::MorphOutcome;
pub use service::{output_format, EncodedImage, FilterService, Processed, Readiness, TransformOutcome};
pub use sticker::{SkipReason, StickerOutcome, StickerPlacer};
pub use tone::{ChannelLut, GradeSource};
