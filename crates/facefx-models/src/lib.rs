//! Shared data models for the FaceFX filter service.
//!
//! This crate provides Serde-serializable types for:
//! - Filter kinds and colour-grading presets
//! - Sticker anchor strategies
//! - Per-filter request parameters with validation
//! - A tagged `FilterRequest` covering every transform

pub mod anchor;
pub mod filter;
pub mod params;

// Re-export common types
pub use anchor::AnchorMode;
pub use filter::{FilterKind, GradeFilter, GradeFilterParseError};
pub use params::{
    is_valid_asset_name, BackgroundBlurParams, BeautyParams, FilterRequest, GradeParams, MorphParams,
    ParamError, StickerParams, MAX_ASSET_NAME_LEN,
};
