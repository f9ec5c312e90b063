//! MediaPipe face mesh via ONNX Runtime.
//!
//! The model expects a 192x192 RGB face crop normalized to [-1, 1] and
//! returns 468 (x, y, z) points in input-pixel units, plus an optional face
//! presence logit. Without a separate face detector the whole image is
//! letterboxed into the input square, so results are best when the face
//! fills most of the frame.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::landmarks::{
    DetectorOptions, LandmarkDetector, LandmarkSet, NormalizedPoint, FACE_MESH_LANDMARK_COUNT,
};

use super::{create_session, find_model};

/// Model input side in pixels.
pub const INPUT_SIZE: u32 = 192;

/// Default model locations, in priority order.
pub const MODEL_CANDIDATES: &[&str] = &[
    "./models/face_mesh/face_landmark.onnx",
    "/app/models/face_mesh/face_landmark.onnx",
];

/// Placement of the source image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    /// Fit a `width` x `height` image centred inside a `side` square.
    pub fn fit(width: u32, height: u32, side: u32) -> Self {
        let scale = side as f32 / width.max(height).max(1) as f32;
        let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, side);
        let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, side);
        Self {
            scale,
            offset_x: ((side - scaled_w) / 2) as f32,
            offset_y: ((side - scaled_h) / 2) as f32,
            source_width: width,
            source_height: height,
        }
    }

    fn scaled_dims(&self) -> (u32, u32) {
        (
            ((self.source_width as f32 * self.scale).round() as u32).max(1),
            ((self.source_height as f32 * self.scale).round() as u32).max(1),
        )
    }

    /// Map a point in model-input pixels to normalized source coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> NormalizedPoint {
        let sx = (x - self.offset_x) / self.scale;
        let sy = (y - self.offset_y) / self.scale;
        NormalizedPoint::new(
            sx / self.source_width.max(1) as f32,
            sy / self.source_height.max(1) as f32,
        )
    }
}

/// Letterbox `image` into a black `INPUT_SIZE` square.
fn letterbox_image(image: &RgbImage) -> (RgbImage, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), INPUT_SIZE);
    let (w, h) = letterbox.scaled_dims();
    let resized = imageops::resize(image, w, h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );
    (canvas, letterbox)
}

/// Convert RGB HWC to a (1, 3, H, W) tensor normalized to [-1, 1].
fn to_chw_tensor(image: &RgbImage) -> MediaResult<Value> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut chw = vec![0f32; plane * 3];
    for (i, px) in image.pixels().enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = px[c] as f32 / 127.5 - 1.0;
        }
    }

    let shape = vec![1usize, 3, h as usize, w as usize];
    Tensor::from_array((shape, chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::detection_failed(format!("ORT tensor: {e}")))
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Landmarks from a flat `[x, y, z]*` buffer in model-input pixels.
fn decode_landmarks(data: &[f32], letterbox: &Letterbox) -> MediaResult<LandmarkSet> {
    if data.len() < FACE_MESH_LANDMARK_COUNT * 3 {
        return Err(MediaError::detection_failed(format!(
            "Face mesh output too short: {} values",
            data.len()
        )));
    }
    let points = data
        .chunks_exact(3)
        .take(FACE_MESH_LANDMARK_COUNT)
        .map(|p| letterbox.to_source(p[0], p[1]))
        .collect();
    Ok(LandmarkSet::new(points))
}

/// ONNX Runtime face mesh landmark detector.
///
/// Owned exclusively by a `LandmarkProvider`, which serializes calls, so the
/// session needs no lock of its own.
pub struct OrtFaceMeshDetector {
    session: Session,
    options: DetectorOptions,
    model_path: PathBuf,
}

impl OrtFaceMeshDetector {
    /// Load from an explicit path, falling back to the default locations.
    pub fn load(explicit: Option<&Path>, options: DetectorOptions) -> MediaResult<Self> {
        let model_path = find_model(explicit, MODEL_CANDIDATES).ok_or_else(|| {
            MediaError::model_not_found(
                "face_landmark.onnx not found; set FACEFX_FACE_MESH_MODEL or place it under models/face_mesh/",
            )
        })?;
        let session = create_session(&model_path)?;
        Ok(Self {
            session,
            options,
            model_path,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl LandmarkDetector for OrtFaceMeshDetector {
    fn detect(&mut self, image: &RgbImage) -> MediaResult<Vec<LandmarkSet>> {
        let (input, letterbox) = letterbox_image(image);
        let tensor = to_chw_tensor(&input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| MediaError::detection_failed(format!("ORT run failed: {e}")))?;

        let mut landmarks = None;
        let mut presence = None;
        for (_, value) in outputs.iter() {
            let (_, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| MediaError::detection_failed(format!("ORT extract: {e}")))?;
            if data.len() >= FACE_MESH_LANDMARK_COUNT * 3 && landmarks.is_none() {
                landmarks = Some(decode_landmarks(data, &letterbox)?);
            } else if data.len() == 1 {
                presence = Some(sigmoid(data[0]));
            }
        }

        if let Some(score) = presence {
            if score < self.options.min_detection_confidence {
                debug!(score = score, "Face presence below threshold");
                return Ok(Vec::new());
            }
        }

        let landmarks = landmarks
            .ok_or_else(|| MediaError::detection_failed("Face mesh returned no landmark tensor"))?;
        Ok(vec![landmarks])
    }

    fn name(&self) -> &'static str {
        "face_mesh_onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(400, 200, INPUT_SIZE);
        assert_eq!(lb.scale, 192.0 / 400.0);
        assert_eq!(lb.offset_x, 0.0);
        assert_eq!(lb.offset_y, 48.0);
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let lb = Letterbox::fit(400, 200, INPUT_SIZE);
        // Input centre is the source centre
        let p = lb.to_source(96.0, 96.0);
        assert!((p.x - 0.5).abs() < 1e-5);
        assert!((p.y - 0.5).abs() < 1e-5);
        // Top-left of the scaled image is source origin
        let p = lb.to_source(0.0, 48.0);
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
    }

    #[test]
    fn test_letterboxed_canvas_is_square() {
        let img = RgbImage::from_pixel(300, 100, Rgb([200, 10, 10]));
        let (canvas, lb) = letterbox_image(&img);
        assert_eq!(canvas.dimensions(), (INPUT_SIZE, INPUT_SIZE));
        assert_eq!(canvas.get_pixel(96, 0), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(96, 96), &Rgb([200, 10, 10]));
        assert_eq!(lb.offset_x, 0.0);
    }

    #[test]
    fn test_decode_landmarks_rejects_short_output() {
        let lb = Letterbox::fit(192, 192, INPUT_SIZE);
        assert!(decode_landmarks(&[0.0; 30], &lb).is_err());

        let data: Vec<f32> = (0..FACE_MESH_LANDMARK_COUNT)
            .flat_map(|_| [96.0, 48.0, 0.0])
            .collect();
        let set = decode_landmarks(&data, &lb).unwrap();
        assert_eq!(set.len(), FACE_MESH_LANDMARK_COUNT);
        assert_eq!(set.get(0), Some(&NormalizedPoint::new(0.5, 0.25)));
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
    }
}
