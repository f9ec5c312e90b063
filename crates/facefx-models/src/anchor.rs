//! Sticker anchor strategy selection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a sticker's placement rectangle is derived from face landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// Two fixed forehead-adjacent landmarks
    #[default]
    TwoPoint,
    /// Bounding box of the whole landmark set
    BoundingBox,
}

impl AnchorMode {
    pub const ALL: &'static [AnchorMode] = &[AnchorMode::TwoPoint, AnchorMode::BoundingBox];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorMode::TwoPoint => "two_point",
            AnchorMode::BoundingBox => "bounding_box",
        }
    }
}

impl fmt::Display for AnchorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnchorMode {
    type Err = AnchorModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "two_point" | "two-point" | "twopoint" => Ok(AnchorMode::TwoPoint),
            "bounding_box" | "bounding-box" | "bbox" => Ok(AnchorMode::BoundingBox),
            _ => Err(AnchorModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown anchor mode: {0}")]
pub struct AnchorModeParseError(String);
