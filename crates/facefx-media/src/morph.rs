//! Face morph.
//!
//! Parameters are accepted and validated, but the image passes through
//! unchanged until a warp model is wired in.

use image::RgbImage;
use tracing::debug;

use facefx_models::MorphParams;

/// Result of a morph request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOutcome {
    /// Input returned as-is
    Placeholder,
}

impl MorphOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MorphOutcome::Placeholder => "placeholder",
        }
    }
}

pub fn morph(image: RgbImage, params: &MorphParams) -> (RgbImage, MorphOutcome) {
    debug!(
        eye_size = params.eye_size,
        smile = params.smile,
        chin = params.chin,
        "Face morph is a pass-through"
    );
    (image, MorphOutcome::Placeholder)
}
