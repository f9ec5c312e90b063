//! Face-anchored sticker placement.
//!
//! Linear pipeline: resolve asset, detect landmarks, compute placement,
//! composite. Each step can end the pipeline early with the image returned
//! unchanged; the reason is reported as a [`SkipReason`].
//!
//! The detector sees a copy capped at the configured long side. Landmarks
//! are normalized, so the sticker lands on the full-size image.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, warn};

use facefx_models::AnchorMode;

use crate::anchor::{compute_placement, PlacementRect};
use crate::assets::AssetCache;
use crate::compositor::composite_region;
use crate::imaging;
use crate::landmarks::LandmarkProvider;
use crate::metrics;

/// Why a sticker was not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No usable asset under that name
    AssetMissing,
    /// Detector ran and found no face
    NoFace,
    /// Detector could not be built or failed to run
    DetectorFailed,
    /// Placement clamped to nothing
    DegeneratePlacement,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AssetMissing => "asset_missing",
            SkipReason::NoFace => "no_face",
            SkipReason::DetectorFailed => "detector_failed",
            SkipReason::DegeneratePlacement => "degenerate_placement",
        }
    }
}

/// Result of a placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerOutcome {
    Placed(PlacementRect),
    Skipped(SkipReason),
}

impl StickerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StickerOutcome::Placed(_) => "placed",
            StickerOutcome::Skipped(reason) => reason.as_str(),
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, StickerOutcome::Placed(_))
    }
}

/// Places overlay assets above detected faces.
pub struct StickerPlacer {
    assets: Arc<AssetCache>,
    landmarks: Arc<LandmarkProvider>,
    anchor_mode: AnchorMode,
    max_detect_side: u32,
}

impl StickerPlacer {
    pub fn new(assets: Arc<AssetCache>, landmarks: Arc<LandmarkProvider>, anchor_mode: AnchorMode) -> Self {
        Self {
            assets,
            landmarks,
            anchor_mode,
            max_detect_side: u32::MAX,
        }
    }

    /// Cap the long side of the image handed to the detector.
    pub fn with_max_detect_side(mut self, side: u32) -> Self {
        self.max_detect_side = side.max(1);
        self
    }

    pub fn anchor_mode(&self) -> AnchorMode {
        self.anchor_mode
    }

    /// Place sticker `name` on `image`.
    ///
    /// Always hands back a valid image. Every skip returns the input buffer
    /// itself, untouched.
    pub fn place(&self, image: RgbImage, name: &str) -> (RgbImage, StickerOutcome) {
        let Some(asset) = self.assets.resolve(name) else {
            info!(name = %name, "Sticker asset not found, returning original");
            return (image, StickerOutcome::Skipped(SkipReason::AssetMissing));
        };

        let started = Instant::now();
        let detected = self
            .landmarks
            .detect(&imaging::downscaled(&image, self.max_detect_side));
        metrics::record_detector_call(started.elapsed().as_secs_f64());

        let landmarks = match detected {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                debug!(name = %name, "No face found, returning original");
                return (image, StickerOutcome::Skipped(SkipReason::NoFace));
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Landmark detection failed, returning original");
                return (image, StickerOutcome::Skipped(SkipReason::DetectorFailed));
            }
        };

        let Some(rect) = compute_placement(
            self.anchor_mode,
            &landmarks,
            image.dimensions(),
            asset.dimensions(),
        ) else {
            debug!(name = %name, "Placement clamped to nothing, returning original");
            return (image, StickerOutcome::Skipped(SkipReason::DegeneratePlacement));
        };

        debug!(
            name = %name,
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            anchor = %self.anchor_mode,
            "Placing sticker"
        );
        let image = composite_region(image, asset.image(), rect);
        (image, StickerOutcome::Placed(rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, MediaResult};
    use crate::landmarks::{LandmarkDetector, LandmarkSet, NormalizedPoint, FACE_MESH_LANDMARK_COUNT};
    use crate::anchor::{FOREHEAD_LEFT, FOREHEAD_RIGHT};
    use image::{Rgb, Rgba, RgbaImage};
    use tempfile::TempDir;

    enum Script {
        Face(LandmarkSet),
        Nothing,
        Fail,
    }

    struct ScriptedDetector(Script);

    impl LandmarkDetector for ScriptedDetector {
        fn detect(&mut self, _image: &RgbImage) -> MediaResult<Vec<LandmarkSet>> {
            match &self.0 {
                Script::Face(set) => Ok(vec![set.clone()]),
                Script::Nothing => Ok(Vec::new()),
                Script::Fail => Err(MediaError::detection_failed("session exploded")),
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn forehead_face() -> LandmarkSet {
        let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
        points[FOREHEAD_LEFT] = NormalizedPoint::new(300.5 / 800.0, 200.5 / 600.0);
        points[FOREHEAD_RIGHT] = NormalizedPoint::new(500.5 / 800.0, 200.5 / 600.0);
        LandmarkSet::new(points)
    }

    fn photo() -> RgbImage {
        RgbImage::from_fn(800, 600, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 40]))
    }

    fn placer(dir: &TempDir, script: Script) -> (StickerPlacer, Arc<LandmarkProvider>) {
        placer_with_mode(dir, script, AnchorMode::TwoPoint)
    }

    fn placer_with_mode(
        dir: &TempDir,
        script: Script,
        mode: AnchorMode,
    ) -> (StickerPlacer, Arc<LandmarkProvider>) {
        RgbaImage::from_pixel(32, 32, Rgba([255, 215, 0, 255]))
            .save(dir.path().join("crown.png"))
            .unwrap();
        let assets = Arc::new(AssetCache::new(vec![dir.path().to_path_buf()]));
        let provider = Arc::new(LandmarkProvider::with_detector(ScriptedDetector(script)));
        (
            StickerPlacer::new(assets, Arc::clone(&provider), mode),
            provider,
        )
    }

    #[test]
    fn test_places_crown_above_forehead() {
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer(&dir, Script::Face(forehead_face()));

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(outcome, StickerOutcome::Placed(PlacementRect::new(250, 0, 300, 200)));
        assert_eq!(out.get_pixel(250, 0), &Rgb([255, 215, 0]));
        assert_eq!(out.get_pixel(549, 199), &Rgb([255, 215, 0]));
        assert_eq!(out.get_pixel(249, 0), photo().get_pixel(249, 0));
        assert_eq!(out.get_pixel(300, 200), photo().get_pixel(300, 200));
    }

    #[test]
    fn test_no_face_returns_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer(&dir, Script::Nothing);

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(outcome, StickerOutcome::Skipped(SkipReason::NoFace));
        assert_eq!(out.as_raw(), photo().as_raw());
    }

    #[test]
    fn test_missing_asset_skips_before_detection() {
        let dir = TempDir::new().unwrap();
        let (placer, provider) = placer(&dir, Script::Face(forehead_face()));

        let (out, outcome) = placer.place(photo(), "halo");
        assert_eq!(outcome, StickerOutcome::Skipped(SkipReason::AssetMissing));
        assert_eq!(out.as_raw(), photo().as_raw());
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_detector_failure_degrades() {
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer(&dir, Script::Fail);

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(outcome, StickerOutcome::Skipped(SkipReason::DetectorFailed));
        assert_eq!(out.as_raw(), photo().as_raw());
    }

    #[test]
    fn test_detection_on_capped_copy_places_at_full_size() {
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer(&dir, Script::Face(forehead_face()));
        let placer = placer.with_max_detect_side(200);

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(out.dimensions(), (800, 600));
        assert_eq!(outcome, StickerOutcome::Placed(PlacementRect::new(250, 0, 300, 200)));
    }

    #[test]
    fn test_skip_keeps_full_size_when_capped() {
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer(&dir, Script::Nothing);
        let placer = placer.with_max_detect_side(100);

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(outcome, StickerOutcome::Skipped(SkipReason::NoFace));
        assert_eq!(out.as_raw(), photo().as_raw());
    }

    #[test]
    fn test_bounding_box_mode_anchors_on_landmark_extent() {
        // Every point at (0.5, 0.5) except the forehead pair: the box spans
        // x 300..500 and y 200..300 on the 800x600 photo.
        let dir = TempDir::new().unwrap();
        let (placer, _) = placer_with_mode(&dir, Script::Face(forehead_face()), AnchorMode::BoundingBox);
        assert_eq!(placer.anchor_mode(), AnchorMode::BoundingBox);

        let (out, outcome) = placer.place(photo(), "crown");
        assert_eq!(outcome, StickerOutcome::Placed(PlacementRect::new(250, 0, 300, 200)));
        assert_eq!(out.get_pixel(250, 0), &Rgb([255, 215, 0]));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StickerOutcome::Skipped(SkipReason::NoFace).as_str(), "no_face");
        assert_eq!(
            StickerOutcome::Placed(PlacementRect::new(0, 0, 1, 1)).as_str(),
            "placed"
        );
    }
}
