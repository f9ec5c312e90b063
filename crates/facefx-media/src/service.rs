//! Async facade over the filter pipeline.
//!
//! [`FilterService`] owns the long-lived collaborators (landmark provider,
//! asset cache, segmenter) and runs every transform on the blocking pool.
//! Transforms that touch a model go through the [`ConcurrencyGate`]; tone
//! transforms run ungated. Only the copy handed to a model is capped at the
//! configured long side; outputs keep the input's dimensions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{info, info_span, warn, Instrument};

use facefx_models::{FilterKind, FilterRequest};

use crate::assets::AssetCache;
use crate::background::{BackgroundCompositor, BlurPath, ForegroundSegmenter};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::gate::ConcurrencyGate;
use crate::imaging::{self, OutputFormat};
use crate::inference::{face_mesh, find_model, OrtFaceMeshDetector, OrtSegmenter};
use crate::landmarks::{DetectorOptions, LandmarkDetector, LandmarkProvider};
use crate::metrics;
use crate::morph::{self, MorphOutcome};
use crate::sticker::{StickerOutcome, StickerPlacer};
use crate::tone::{self, GradeSource};

/// Which path a transform took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    Smoothed,
    Graded(GradeSource),
    Sticker(StickerOutcome),
    Blur(BlurPath),
    Morph(MorphOutcome),
}

impl TransformOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformOutcome::Smoothed => "smoothed",
            TransformOutcome::Graded(source) => source.as_str(),
            TransformOutcome::Sticker(outcome) => outcome.as_str(),
            TransformOutcome::Blur(path) => path.as_str(),
            TransformOutcome::Morph(outcome) => outcome.as_str(),
        }
    }
}

/// A transformed image buffer.
#[derive(Debug, Clone)]
pub struct Processed {
    pub image: RgbImage,
    pub outcome: TransformOutcome,
}

/// A transformed, encoded image.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub outcome: TransformOutcome,
    pub width: u32,
    pub height: u32,
}

/// Model availability for readiness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Detector built, or its model file is present
    pub landmarks: bool,
    /// Segmentation model loaded
    pub segmentation: bool,
    pub gate_capacity: usize,
    pub gate_available: usize,
}

/// Output container for a transform.
pub fn output_format(kind: FilterKind) -> OutputFormat {
    if kind.prefers_png() {
        OutputFormat::Png
    } else {
        OutputFormat::Jpeg
    }
}

/// Synchronous transform dispatch, shared by every blocking task.
struct Pipeline {
    lut_dir: PathBuf,
    stickers: StickerPlacer,
    background: BackgroundCompositor,
}

impl Pipeline {
    fn run(&self, image: RgbImage, request: &FilterRequest) -> (RgbImage, TransformOutcome) {
        match request {
            FilterRequest::Beauty(params) => {
                (tone::smooth(&image, params.intensity), TransformOutcome::Smoothed)
            }
            FilterRequest::BackgroundBlur(params) => {
                let (image, path) = self.background.blur_background(&image, params.blur_strength);
                (image, TransformOutcome::Blur(path))
            }
            FilterRequest::Grade(params) => {
                let (image, source) = tone::grade(&image, params.filter_type, &self.lut_dir);
                (image, TransformOutcome::Graded(source))
            }
            FilterRequest::Sticker(params) => {
                let (image, outcome) = self.stickers.place(image, &params.sticker_name);
                (image, TransformOutcome::Sticker(outcome))
            }
            FilterRequest::FaceMorph(params) => {
                let (image, outcome) = morph::morph(image, params);
                (image, TransformOutcome::Morph(outcome))
            }
        }
    }
}

/// Image filter service.
pub struct FilterService {
    pipeline: Arc<Pipeline>,
    gate: ConcurrencyGate,
    landmarks: Arc<LandmarkProvider>,
    face_mesh_model: Option<PathBuf>,
}

impl FilterService {
    /// Service around injected collaborators.
    pub fn new(
        config: &MediaConfig,
        landmarks: Arc<LandmarkProvider>,
        segmenter: Option<Arc<dyn ForegroundSegmenter>>,
    ) -> Self {
        let assets = Arc::new(AssetCache::from_config(config));
        let stickers = StickerPlacer::new(assets, Arc::clone(&landmarks), config.anchor_mode)
            .with_max_detect_side(config.max_image_side);
        let background = match segmenter {
            Some(segmenter) => BackgroundCompositor::new(segmenter),
            None => BackgroundCompositor::without_segmenter(),
        }
        .with_max_segment_side(config.max_image_side);

        Self {
            pipeline: Arc::new(Pipeline {
                lut_dir: config.lut_dir.clone(),
                stickers,
                background,
            }),
            gate: ConcurrencyGate::from_config(config),
            landmarks,
            face_mesh_model: config.face_mesh_model.clone(),
        }
    }

    /// Service backed by the ONNX models.
    ///
    /// The face mesh session is built on first use. The segmentation model
    /// loads now; if it cannot, background blur runs blur-only.
    pub fn from_config(config: &MediaConfig) -> Self {
        let face_mesh_model = config.face_mesh_model.clone();
        let landmarks = LandmarkProvider::new(move || {
            let detector = OrtFaceMeshDetector::load(face_mesh_model.as_deref(), DetectorOptions::default())?;
            Ok(Box::new(detector) as Box<dyn LandmarkDetector>)
        });

        let segmenter = match OrtSegmenter::load(config.segmentation_model.as_deref()) {
            Ok(segmenter) => {
                info!(model = %segmenter.model_path().display(), "Segmentation model ready");
                Some(Arc::new(segmenter) as Arc<dyn ForegroundSegmenter>)
            }
            Err(e) => {
                warn!(error = %e, "Segmentation model unavailable, background blur will skip compositing");
                None
            }
        };

        info!(
            max_concurrent = config.max_concurrent_transforms,
            max_image_side = config.max_image_side,
            anchor = %config.anchor_mode,
            "Filter service configured"
        );
        Self::new(config, Arc::new(landmarks), segmenter)
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn landmarks(&self) -> &LandmarkProvider {
        &self.landmarks
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            landmarks: self.landmarks.is_initialized() || self.face_mesh_model().is_some(),
            segmentation: self.pipeline.background.has_segmenter(),
            gate_capacity: self.gate.capacity(),
            gate_available: self.gate.available(),
        }
    }

    /// Transform a decoded image.
    pub async fn apply(&self, image: RgbImage, request: FilterRequest) -> MediaResult<Processed> {
        request.validate()?;
        let kind = request.kind();
        let pipeline = Arc::clone(&self.pipeline);

        let started = Instant::now();
        let result = self
            .execute(kind, move || {
                let (image, outcome) = pipeline.run(image, &request);
                Ok(Processed { image, outcome })
            })
            .await;
        observe(kind, started, result.as_ref().map(|p| p.outcome));
        result
    }

    /// Decode, transform and re-encode an uploaded image.
    ///
    /// The output is JPEG, except stickers which are PNG.
    pub async fn process(&self, bytes: Vec<u8>, request: FilterRequest) -> MediaResult<EncodedImage> {
        request.validate()?;
        let kind = request.kind();
        let pipeline = Arc::clone(&self.pipeline);

        let started = Instant::now();
        let result = self
            .execute(kind, move || {
                let image = imaging::decode_rgb(&bytes)?;
                let (image, outcome) = pipeline.run(image, &request);
                let format = output_format(kind);
                let bytes = imaging::encode(&image, format)?;
                Ok(EncodedImage {
                    bytes,
                    format,
                    outcome,
                    width: image.width(),
                    height: image.height(),
                })
            })
            .await;
        observe(kind, started, result.as_ref().map(|e| e.outcome));
        result
    }

    /// Run `work` on the blocking pool, gated when the transform is heavy.
    async fn execute<F, T>(&self, kind: FilterKind, work: F) -> MediaResult<T>
    where
        F: FnOnce() -> MediaResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let span = info_span!("transform", kind = kind.as_str(), heavy = kind.is_heavy());
        let work = {
            let span = span.clone();
            move || span.in_scope(work)
        };

        async move {
            if kind.is_heavy() {
                self.gate.run_blocking(work).await
            } else {
                tokio::task::spawn_blocking(work)
                    .await
                    .map_err(|e| MediaError::internal(format!("Blocking task join error: {e}")))?
            }
        }
        .instrument(span)
        .await
    }

    /// Path of the model-backed face mesh, if one is configured or present.
    pub fn face_mesh_model(&self) -> Option<PathBuf> {
        find_model(self.face_mesh_model.as_deref(), face_mesh::MODEL_CANDIDATES)
    }
}

fn failure_reason(error: &MediaError) -> &'static str {
    if error.is_client_fault() {
        "invalid_input"
    } else if error.is_capacity_fault() {
        "capacity"
    } else {
        "internal"
    }
}

fn observe(kind: FilterKind, started: Instant, result: Result<TransformOutcome, &MediaError>) {
    let elapsed = started.elapsed();
    match result {
        Ok(outcome) => {
            metrics::record_transform(kind.as_str(), outcome.as_str(), elapsed.as_secs_f64());
            info!(
                kind = kind.as_str(),
                outcome = outcome.as_str(),
                duration_ms = elapsed.as_millis() as u64,
                "Transform complete"
            );
        }
        Err(e) => {
            metrics::record_transform_failure(kind.as_str(), failure_reason(e));
            warn!(
                kind = kind.as_str(),
                error = %e,
                duration_ms = elapsed.as_millis() as u64,
                "Transform failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefx_models::{
        BackgroundBlurParams, BeautyParams, GradeFilter, GradeParams, MorphParams, StickerParams,
    };
    use image::Rgb;
    use tempfile::TempDir;

    use crate::sticker::SkipReason;

    fn service(dir: &TempDir) -> FilterService {
        let config = MediaConfig::default()
            .with_sticker_fallback_dirs(vec![dir.path().to_path_buf()])
            .with_lut_dir(dir.path());
        let landmarks = LandmarkProvider::new(|| Err(MediaError::model_not_found("test")));
        FilterService::new(&config, Arc::new(landmarks), None)
    }

    #[tokio::test]
    async fn test_grade_reports_colormap_without_lut() {
        let dir = TempDir::new().unwrap();
        let img = RgbImage::from_pixel(4, 4, Rgb([40, 80, 120]));
        let processed = service(&dir)
            .apply(
                img,
                FilterRequest::Grade(GradeParams {
                    filter_type: GradeFilter::Warm,
                }),
            )
            .await
            .unwrap();
        assert_eq!(processed.outcome, TransformOutcome::Graded(GradeSource::Colormap));
        assert_eq!(processed.outcome.as_str(), "colormap");
    }

    #[tokio::test]
    async fn test_out_of_range_strength_is_clamped() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let img = RgbImage::from_fn(12, 12, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, 90]));

        let strong = svc
            .apply(img.clone(), FilterRequest::Beauty(BeautyParams { intensity: 3.0 }))
            .await
            .unwrap();
        let full = svc
            .apply(img.clone(), FilterRequest::Beauty(BeautyParams { intensity: 1.0 }))
            .await
            .unwrap();
        assert_eq!(strong.image, full.image);

        let blurred = svc
            .apply(
                img.clone(),
                FilterRequest::BackgroundBlur(BackgroundBlurParams { blur_strength: 1.5 }),
            )
            .await
            .unwrap();
        assert_eq!(blurred.image, crate::background::blur_frame(&img, 1.0));
    }

    #[tokio::test]
    async fn test_invalid_params_rejected_before_work() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let err = svc
            .apply(
                RgbImage::new(2, 2),
                FilterRequest::Beauty(BeautyParams {
                    intensity: f32::NAN,
                }),
            )
            .await
            .unwrap_err();
        assert!(err.is_client_fault());

        let err = svc
            .apply(
                RgbImage::new(2, 2),
                FilterRequest::FaceMorph(MorphParams {
                    chin: 1.5,
                    ..Default::default()
                }),
            )
            .await
            .unwrap_err();
        assert!(err.is_client_fault());
    }

    #[tokio::test]
    async fn test_sticker_without_asset_is_png_and_unchanged() {
        let dir = TempDir::new().unwrap();
        let img = RgbImage::from_pixel(6, 6, Rgb([10, 20, 30]));
        let bytes = imaging::encode(&img, OutputFormat::Png).unwrap();

        let svc = service(&dir);
        let encoded = svc
            .process(bytes, FilterRequest::Sticker(StickerParams::default()))
            .await
            .unwrap();
        assert_eq!(encoded.format, OutputFormat::Png);
        assert_eq!(
            encoded.outcome,
            TransformOutcome::Sticker(StickerOutcome::Skipped(SkipReason::AssetMissing))
        );
        assert_eq!(imaging::decode_rgb(&encoded.bytes).unwrap(), img);
        assert_eq!(svc.landmarks().call_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_client_fault() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir)
            .process(b"not an image".to_vec(), FilterRequest::FaceMorph(MorphParams::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_oversized_input_keeps_its_size() {
        let dir = TempDir::new().unwrap();
        let config = MediaConfig::default()
            .with_sticker_fallback_dirs(vec![dir.path().to_path_buf()])
            .with_lut_dir(dir.path())
            .with_max_image_side(50);
        let landmarks = LandmarkProvider::new(|| Err(MediaError::model_not_found("test")));
        let svc = FilterService::new(&config, Arc::new(landmarks), None);
        let img = RgbImage::from_fn(200, 100, |x, y| Rgb([x as u8, y as u8, 7]));

        let morphed = svc
            .apply(img.clone(), FilterRequest::FaceMorph(MorphParams::default()))
            .await
            .unwrap();
        assert_eq!(morphed.image, img);

        let skipped = svc
            .apply(img.clone(), FilterRequest::Sticker(StickerParams::default()))
            .await
            .unwrap();
        assert_eq!(
            skipped.outcome,
            TransformOutcome::Sticker(StickerOutcome::Skipped(SkipReason::AssetMissing))
        );
        assert_eq!(skipped.image, img);

        for request in [
            FilterRequest::Beauty(BeautyParams::default()),
            FilterRequest::BackgroundBlur(BackgroundBlurParams::default()),
            FilterRequest::Grade(GradeParams::default()),
        ] {
            let processed = svc.apply(img.clone(), request).await.unwrap();
            assert_eq!(processed.image.dimensions(), (200, 100));
        }
    }

    #[test]
    fn test_readiness_without_models() {
        let dir = TempDir::new().unwrap();
        let readiness = service(&dir).readiness();
        assert!(!readiness.segmentation);
        assert_eq!(readiness.gate_capacity, 2);
        assert_eq!(readiness.gate_available, 2);
    }
}
