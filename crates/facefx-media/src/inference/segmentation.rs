//! Salient-object segmentation via ONNX Runtime.
//!
//! U²-Net family models: 320x320 RGB input with ImageNet normalization,
//! first output is a single-channel saliency map. The map is min-max
//! stretched to 0-255 and returned at model resolution as the alpha channel;
//! the compositor scales it to the frame.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayAlphaImage, GrayImage, Luma, LumaA, RgbImage};
use ort::session::Session;
use ort::value::{Tensor, Value};

use crate::background::ForegroundSegmenter;
use crate::error::{MediaError, MediaResult};

use super::{create_session, find_model};

/// Model input side in pixels.
pub const INPUT_SIZE: u32 = 320;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Default model locations, in priority order.
pub const MODEL_CANDIDATES: &[&str] = &[
    "./models/segmentation/u2net.onnx",
    "/app/models/segmentation/u2net.onnx",
];

fn to_normalized_tensor(image: &RgbImage) -> MediaResult<Value> {
    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut chw = vec![0f32; plane * 3];
    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = (px[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    let shape = vec![1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
    Tensor::from_array((shape, chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::segmentation_failed(format!("ORT tensor: {e}")))
}

/// Min-max stretch a saliency map into an 8-bit mask.
fn saliency_to_mask(data: &[f32], side: u32) -> MediaResult<GrayImage> {
    let plane = (side * side) as usize;
    if data.len() < plane {
        return Err(MediaError::segmentation_failed(format!(
            "Saliency map too small: {} values",
            data.len()
        )));
    }
    let map = &data[..plane];
    let (lo, hi) = map
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = (hi - lo).max(f32::EPSILON);

    Ok(GrayImage::from_fn(side, side, |x, y| {
        let v = (map[(y * side + x) as usize] - lo) / range;
        Luma([(v * 255.0).round().clamp(0.0, 255.0) as u8])
    }))
}

/// Mask as an image whose alpha channel is foreground opacity.
fn mask_to_alpha(mask: &GrayImage) -> DynamicImage {
    DynamicImage::ImageLumaA8(GrayAlphaImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = mask.get_pixel(x, y)[0];
        LumaA([v, v])
    }))
}

/// ONNX Runtime foreground segmenter.
pub struct OrtSegmenter {
    session: Mutex<Session>,
    model_path: PathBuf,
}

impl OrtSegmenter {
    /// Load from an explicit path, falling back to the default locations.
    pub fn load(explicit: Option<&Path>) -> MediaResult<Self> {
        let model_path = find_model(explicit, MODEL_CANDIDATES).ok_or_else(|| {
            MediaError::model_not_found(
                "u2net.onnx not found; set FACEFX_SEGMENTATION_MODEL or place it under models/segmentation/",
            )
        })?;
        let session = create_session(&model_path)?;
        Ok(Self {
            session: Mutex::new(session),
            model_path,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl ForegroundSegmenter for OrtSegmenter {
    fn segment(&self, image: &RgbImage) -> MediaResult<DynamicImage> {
        let tensor = to_normalized_tensor(image)?;

        let mask = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| MediaError::segmentation_failed("ORT session poisoned"))?;
            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| MediaError::segmentation_failed(format!("ORT run failed: {e}")))?;
            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| MediaError::segmentation_failed("ORT returned no outputs"))?;
            let (_, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| MediaError::segmentation_failed(format!("ORT extract: {e}")))?;
            saliency_to_mask(data, INPUT_SIZE)?
        };

        Ok(mask_to_alpha(&mask))
    }

    fn name(&self) -> &'static str {
        "u2net_onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saliency_is_stretched() {
        let data = [0.0f32, 0.0, 0.5, 1.0];
        let mask = saliency_to_mask(&data, 2).unwrap();
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 1)[0], 128);
    }

    #[test]
    fn test_flat_saliency_does_not_divide_by_zero() {
        let mask = saliency_to_mask(&[0.5; 4], 2).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_mask_becomes_alpha_at_model_size() {
        let mask = saliency_to_mask(&[0.0, 1.0, 1.0, 0.0], 2).unwrap();
        let segmented = mask_to_alpha(&mask);
        assert!(segmented.color().has_alpha());
        assert_eq!((segmented.width(), segmented.height()), (2, 2));
        assert_eq!(segmented.to_rgba8().get_pixel(1, 0)[3], 255);
        assert_eq!(segmented.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_short_saliency_is_an_error() {
        assert!(saliency_to_mask(&[0.0; 3], 2).is_err());
    }
}
