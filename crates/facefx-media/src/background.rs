//! Background blur with a segmentation mask.
//!
//! The whole frame is blurred, then the sharp original is merged back in
//! wherever the segmenter marks foreground. If segmentation is unavailable
//! or its result is unusable the blurred frame is returned on its own and
//! the [`BlurPath`] says so.
//!
//! The segmenter sees a copy capped at the configured long side, and its
//! mask is scaled back up to the frame with nearest-neighbour sampling.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use tracing::{debug, warn};

use crate::compositor::merge;
use crate::error::MediaResult;
use crate::imaging;

/// Largest Gaussian kernel, reached at strength 1.0.
pub const MAX_KERNEL_SIZE: u32 = 25;
/// Smallest Gaussian kernel.
pub const MIN_KERNEL_SIZE: u32 = 3;

/// Foreground segmentation model.
pub trait ForegroundSegmenter: Send + Sync {
    /// Segment `image`, returning an image whose alpha is foreground opacity.
    ///
    /// The result may be at a different resolution than the input.
    fn segment(&self, image: &RgbImage) -> MediaResult<DynamicImage>;

    /// Segmenter name for logging.
    fn name(&self) -> &'static str;
}

/// Why the blur-only result was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No segmenter configured
    Unavailable,
    /// Segmenter returned an error
    SegmentationFailed,
    /// Segmenter result had no alpha channel
    MissingAlpha,
}

/// Which path produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurPath {
    /// Sharp foreground merged over the blurred frame
    Composited,
    /// Blurred frame only
    BlurOnly(FallbackReason),
}

impl BlurPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlurPath::Composited => "composited",
            BlurPath::BlurOnly(_) => "blur_only",
        }
    }
}

/// Odd Gaussian kernel size for a blur strength in `[0, 1]`.
///
/// Out-of-range strengths are clamped; NaN counts as 0. The size only picks
/// the sigma through [`kernel_sigma`]: `imageops::blur` derives its own
/// kernel width from sigma.
pub fn kernel_size(strength: f32) -> u32 {
    let strength = if strength.is_nan() { 0.0 } else { strength.clamp(0.0, 1.0) };
    let k = (MAX_KERNEL_SIZE as f32 * strength).round() as u32 | 1;
    k.max(MIN_KERNEL_SIZE)
}

/// Gaussian sigma matching a kernel of size `k`.
pub fn kernel_sigma(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Blur the full frame at `strength` with a Gaussian of [`kernel_sigma`].
pub fn blur_frame(image: &RgbImage, strength: f32) -> RgbImage {
    imageops::blur(image, kernel_sigma(kernel_size(strength)))
}

/// Foreground mask from a segmenter result, at `width` x `height`.
///
/// `None` when the result carries no alpha channel.
fn foreground_mask(segmented: &DynamicImage, width: u32, height: u32) -> Option<GrayImage> {
    if !segmented.color().has_alpha() {
        return None;
    }
    let rgba = segmented.to_rgba8();
    let mask = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| Luma([rgba.get_pixel(x, y)[3]]));
    if mask.dimensions() == (width, height) {
        return Some(mask);
    }
    debug!(
        mask_width = mask.width(),
        mask_height = mask.height(),
        width,
        height,
        "Resizing segmentation mask"
    );
    Some(imageops::resize(&mask, width, height, FilterType::Nearest))
}

/// Blurs backgrounds, keeping the segmented foreground sharp.
#[derive(Clone)]
pub struct BackgroundCompositor {
    segmenter: Option<Arc<dyn ForegroundSegmenter>>,
    max_segment_side: u32,
}

impl Default for BackgroundCompositor {
    fn default() -> Self {
        Self::without_segmenter()
    }
}

impl BackgroundCompositor {
    pub fn new(segmenter: Arc<dyn ForegroundSegmenter>) -> Self {
        Self {
            segmenter: Some(segmenter),
            max_segment_side: u32::MAX,
        }
    }

    /// Compositor that always takes the blur-only path.
    pub fn without_segmenter() -> Self {
        Self {
            segmenter: None,
            max_segment_side: u32::MAX,
        }
    }

    /// Cap the long side of the image handed to the segmenter.
    pub fn with_max_segment_side(mut self, side: u32) -> Self {
        self.max_segment_side = side.max(1);
        self
    }

    pub fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    /// Blur the background of `image`.
    ///
    /// Never fails: segmentation problems fall back to the blurred frame.
    pub fn blur_background(&self, image: &RgbImage, strength: f32) -> (RgbImage, BlurPath) {
        let blurred = blur_frame(image, strength);

        let Some(segmenter) = &self.segmenter else {
            debug!("No segmenter configured, returning blur only");
            return (blurred, BlurPath::BlurOnly(FallbackReason::Unavailable));
        };

        let segmented = match segmenter.segment(&imaging::downscaled(image, self.max_segment_side)) {
            Ok(segmented) => segmented,
            Err(e) => {
                warn!(segmenter = segmenter.name(), error = %e, "Segmentation failed, returning blur only");
                return (blurred, BlurPath::BlurOnly(FallbackReason::SegmentationFailed));
            }
        };

        let Some(mask) = foreground_mask(&segmented, image.width(), image.height()) else {
            warn!(segmenter = segmenter.name(), "Segmentation result has no alpha, returning blur only");
            return (blurred, BlurPath::BlurOnly(FallbackReason::MissingAlpha));
        };

        match merge(image, &blurred, &mask) {
            Ok(merged) => (merged, BlurPath::Composited),
            Err(e) => {
                warn!(error = %e, "Mask merge failed, returning blur only");
                (blurred, BlurPath::BlurOnly(FallbackReason::SegmentationFailed))
            }
        }
    }
}
