//! Per-filter request parameters.
//!
//! Defaults match the service's form defaults. Smoothing intensity and blur
//! strength only have to be finite; the transforms clamp them to [0, 1].
//! Morph parameters must lie in [0, 1]. Sticker names are never rejected:
//! an unusable name resolves to no asset and the image is returned unchanged.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::{FilterKind, GradeFilter};

/// Longest accepted overlay asset name.
pub const MAX_ASSET_NAME_LEN: usize = 64;

/// Parameter validation failure.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
}

fn check_finite(field: &'static str, value: f32) -> Result<(), ParamError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ParamError::NotFinite { field })
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ParamError> {
    check_finite(field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ParamError::OutOfRange { field, value });
    }
    Ok(())
}

/// Check an overlay asset name is safe to join onto a search directory.
///
/// Names are 1-64 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_asset_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_ASSET_NAME_LEN {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Skin smoothing parameters. Intensity is clamped to [0, 1] when applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BeautyParams {
    #[serde(default = "default_intensity")]
    pub intensity: f32,
}

fn default_intensity() -> f32 {
    0.8
}

impl Default for BeautyParams {
    fn default() -> Self {
        Self {
            intensity: default_intensity(),
        }
    }
}

impl BeautyParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_finite("intensity", self.intensity)
    }
}

/// Background blur parameters. Strength is clamped to [0, 1] when applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundBlurParams {
    #[serde(default = "default_half")]
    pub blur_strength: f32,
}

fn default_half() -> f32 {
    0.5
}

impl Default for BackgroundBlurParams {
    fn default() -> Self {
        Self {
            blur_strength: default_half(),
        }
    }
}

impl BackgroundBlurParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_finite("blur_strength", self.blur_strength)
    }
}

/// Colour grading parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GradeParams {
    #[serde(default)]
    pub filter_type: GradeFilter,
}

/// Sticker overlay parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StickerParams {
    #[serde(default = "default_sticker")]
    pub sticker_name: String,
}

fn default_sticker() -> String {
    "crown".to_string()
}

impl Default for StickerParams {
    fn default() -> Self {
        Self {
            sticker_name: default_sticker(),
        }
    }
}

/// Face morph parameters, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MorphParams {
    #[serde(default = "default_half")]
    pub eye_size: f32,
    #[serde(default = "default_half")]
    pub smile: f32,
    #[serde(default = "default_half")]
    pub chin: f32,
}

impl Default for MorphParams {
    fn default() -> Self {
        Self {
            eye_size: default_half(),
            smile: default_half(),
            chin: default_half(),
        }
    }
}

impl MorphParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_unit("eye_size", self.eye_size)?;
        check_unit("smile", self.smile)?;
        check_unit("chin", self.chin)
    }
}

/// One transform request with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum FilterRequest {
    Beauty(BeautyParams),
    BackgroundBlur(BackgroundBlurParams),
    Grade(GradeParams),
    Sticker(StickerParams),
    FaceMorph(MorphParams),
}

impl FilterRequest {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterRequest::Beauty(_) => FilterKind::Beauty,
            FilterRequest::BackgroundBlur(_) => FilterKind::BackgroundBlur,
            FilterRequest::Grade(_) => FilterKind::Grade,
            FilterRequest::Sticker(_) => FilterKind::Sticker,
            FilterRequest::FaceMorph(_) => FilterKind::FaceMorph,
        }
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        match self {
            FilterRequest::Beauty(p) => p.validate(),
            FilterRequest::BackgroundBlur(p) => p.validate(),
            FilterRequest::FaceMorph(p) => p.validate(),
            FilterRequest::Grade(_) | FilterRequest::Sticker(_) => Ok(()),
        }
    }
}
