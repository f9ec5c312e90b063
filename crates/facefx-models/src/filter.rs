//! Filter and colour-grading definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The per-image transforms the service offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Edge-preserving skin smoothing
    Beauty,
    /// Sharp subject over a blurred background
    BackgroundBlur,
    /// LUT / colormap colour grading
    Grade,
    /// Face-anchored overlay asset
    Sticker,
    /// Face morph (currently a pass-through)
    FaceMorph,
}

impl FilterKind {
    pub const ALL: &'static [FilterKind] = &[
        FilterKind::Beauty,
        FilterKind::BackgroundBlur,
        FilterKind::Grade,
        FilterKind::Sticker,
        FilterKind::FaceMorph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Beauty => "beauty",
            FilterKind::BackgroundBlur => "background_blur",
            FilterKind::Grade => "grade",
            FilterKind::Sticker => "sticker",
            FilterKind::FaceMorph => "face_morph",
        }
    }

    /// Whether this transform needs the landmark detector or segmentation model.
    ///
    /// Heavy transforms run behind the concurrency gate.
    pub fn is_heavy(&self) -> bool {
        matches!(self, FilterKind::BackgroundBlur | FilterKind::Sticker)
    }

    /// Whether the encoded output should keep a lossless, alpha-capable format.
    pub fn prefers_png(&self) -> bool {
        matches!(self, FilterKind::Sticker)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Colour-grading presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradeFilter {
    /// Blue-green ocean tint
    #[default]
    Cool,
    /// Red-yellow autumn tint
    Warm,
    /// Teal/contrast film look
    Cinematic,
    /// Classic brown-toned sepia
    Sepia,
}

impl GradeFilter {
    pub const ALL: &'static [GradeFilter] = &[
        GradeFilter::Cool,
        GradeFilter::Warm,
        GradeFilter::Cinematic,
        GradeFilter::Sepia,
    ];

    /// Name used for LUT file lookup and output file suffixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeFilter::Cool => "cool",
            GradeFilter::Warm => "warm",
            GradeFilter::Cinematic => "cinematic",
            GradeFilter::Sepia => "sepia",
        }
    }
}

impl fmt::Display for GradeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GradeFilter {
    type Err = GradeFilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cool" => Ok(GradeFilter::Cool),
            "warm" => Ok(GradeFilter::Warm),
            "cinematic" => Ok(GradeFilter::Cinematic),
            "sepia" => Ok(GradeFilter::Sepia),
            _ => Err(GradeFilterParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown grade filter: {0}")]
pub struct GradeFilterParseError(String);
