//! Face landmark access.
//!
//! The detector behind a [`LandmarkProvider`] is built on first use and every
//! call into it is serialized by one mutex: inference sessions are not safe
//! for concurrent invocation. Detector throughput, not gate capacity, is
//! therefore the ceiling for the sticker path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Landmarks per face produced by the MediaPipe face mesh topology.
pub const FACE_MESH_LANDMARK_COUNT: usize = 468;

/// How far past the frame, in image sizes, a landmark may reach.
const MAX_OVERHANG: f64 = 1.0;

/// A landmark in normalized image coordinates, `[0, 1]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Pixel coordinates, truncated toward zero.
    ///
    /// Coordinates are first limited to one image width or height beyond
    /// either edge, so the result stays small enough for placement arithmetic.
    #[inline]
    pub fn to_pixel(&self, width: u32, height: u32) -> (i64, i64) {
        let bound = |v: f32| (v as f64).clamp(-MAX_OVERHANG, 1.0 + MAX_OVERHANG);
        (
            (bound(self.x) * width as f64) as i64,
            (bound(self.y) * height as f64) as i64,
        )
    }
}

/// Ordered landmarks for one face. Index `i` always names the same anatomical point.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<NormalizedPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<NormalizedPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NormalizedPoint> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    /// Pixel coordinates of landmark `index`, if present.
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Option<(i64, i64)> {
        self.get(index).map(|p| p.to_pixel(width, height))
    }
}

/// Fixed detector configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    /// Faces to return at most
    pub max_faces: usize,
    /// Refined iris/lip landmarks (slower)
    pub refine_landmarks: bool,
    /// Treat every call as an unrelated still image
    pub static_image_mode: bool,
    /// Face presence threshold
    pub min_detection_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: false,
            static_image_mode: true,
            min_detection_confidence: 0.5,
        }
    }
}

/// A face landmark model.
///
/// `detect` takes `&mut self`: implementations may keep mutable inference
/// state and are never called concurrently.
pub trait LandmarkDetector: Send {
    /// Landmark sets for the faces found, most confident first.
    fn detect(&mut self, image: &RgbImage) -> MediaResult<Vec<LandmarkSet>>;

    /// Points every returned set must carry.
    fn expected_landmarks(&self) -> usize {
        FACE_MESH_LANDMARK_COUNT
    }

    /// Detector name for logging.
    fn name(&self) -> &'static str;
}

type DetectorFactory = Box<dyn Fn() -> MediaResult<Box<dyn LandmarkDetector>> + Send + Sync>;

/// Lazily-built, call-serialized landmark detector.
pub struct LandmarkProvider {
    factory: DetectorFactory,
    detector: OnceLock<Mutex<Box<dyn LandmarkDetector>>>,
    init_lock: Mutex<()>,
    calls: AtomicU64,
}

impl LandmarkProvider {
    /// Provider that builds its detector on the first `detect` call.
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> MediaResult<Box<dyn LandmarkDetector>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            detector: OnceLock::new(),
            init_lock: Mutex::new(()),
            calls: AtomicU64::new(0),
        }
    }

    /// Provider around an already-built detector.
    pub fn with_detector<D>(detector: D) -> Self
    where
        D: LandmarkDetector + 'static,
    {
        let provider = Self::new(|| Err(MediaError::internal("detector already built")));
        let boxed: Box<dyn LandmarkDetector> = Box::new(detector);
        let _ = provider.detector.set(Mutex::new(boxed));
        provider
    }

    /// Whether the detector has been built.
    pub fn is_initialized(&self) -> bool {
        self.detector.get().is_some()
    }

    /// Number of detector invocations so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn instance(&self) -> MediaResult<&Mutex<Box<dyn LandmarkDetector>>> {
        if let Some(detector) = self.detector.get() {
            return Ok(detector);
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| MediaError::internal("Detector init lock poisoned"))?;

        // Double-check after acquiring the init lock
        if let Some(detector) = self.detector.get() {
            return Ok(detector);
        }

        let detector = (self.factory)()?;
        info!(detector = detector.name(), "Landmark detector initialized");
        let _ = self.detector.set(Mutex::new(detector));

        self.detector
            .get()
            .ok_or_else(|| MediaError::internal("Detector missing after initialization"))
    }

    /// Landmarks of the first face in `image`, or `None` when there is no face.
    ///
    /// Additional faces are discarded. A set with the wrong number of points
    /// is treated as no face, so callers only ever see complete sets.
    pub fn detect(&self, image: &RgbImage) -> MediaResult<Option<LandmarkSet>> {
        let cell = self.instance()?;

        let (faces, expected) = {
            let mut detector = cell
                .lock()
                .map_err(|_| MediaError::detection_failed("Detector lock poisoned"))?;
            self.calls.fetch_add(1, Ordering::Relaxed);
            let expected = detector.expected_landmarks();
            (detector.detect(image)?, expected)
        };

        let found = faces.len();
        match faces.into_iter().next() {
            None => {
                debug!("No face detected");
                Ok(None)
            }
            Some(set) if set.len() != expected => {
                warn!(
                    got = set.len(),
                    expected = expected,
                    "Detector returned a partial landmark set, treating as no face"
                );
                Ok(None)
            }
            Some(set) if !set.points().iter().all(NormalizedPoint::is_finite) => {
                warn!("Detector returned non-finite landmarks, treating as no face");
                Ok(None)
            }
            Some(set) => {
                if found > 1 {
                    debug!(discarded = found - 1, "Multiple faces found, keeping the first");
                }
                Ok(Some(set))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn face(n: usize, x: f32) -> LandmarkSet {
        LandmarkSet::new(vec![NormalizedPoint::new(x, 0.5); n])
    }

    struct FixedDetector {
        faces: Vec<LandmarkSet>,
    }

    impl LandmarkDetector for FixedDetector {
        fn detect(&mut self, _image: &RgbImage) -> MediaResult<Vec<LandmarkSet>> {
            Ok(self.faces.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Records the highest number of overlapping `detect` calls.
    struct OverlapTracker {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl LandmarkDetector for OverlapTracker {
        fn detect(&mut self, _image: &RgbImage) -> MediaResult<Vec<LandmarkSet>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "overlap"
        }
    }

    #[test]
    fn test_pixel_truncates() {
        let p = NormalizedPoint::new(0.3759, 0.3349);
        assert_eq!(p.to_pixel(800, 600), (300, 200));
    }

    #[test]
    fn test_far_out_points_are_bounded() {
        let p = NormalizedPoint::new(1.0e30, -1.0e30);
        assert_eq!(p.to_pixel(800, 600), (1600, -600));
        assert!(!NormalizedPoint::new(f32::INFINITY, 0.5).is_finite());
    }

    #[test]
    fn test_non_finite_set_is_treated_as_absent() {
        let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
        points[10] = NormalizedPoint::new(f32::NEG_INFINITY, 0.2);
        points[338] = NormalizedPoint::new(f32::INFINITY, 0.2);
        let provider = LandmarkProvider::with_detector(FixedDetector {
            faces: vec![LandmarkSet::new(points)],
        });
        assert!(provider.detect(&RgbImage::new(4, 4)).unwrap().is_none());
    }

    #[test]
    fn test_first_face_wins() {
        let provider = LandmarkProvider::with_detector(FixedDetector {
            faces: vec![
                face(FACE_MESH_LANDMARK_COUNT, 0.1),
                face(FACE_MESH_LANDMARK_COUNT, 0.9),
            ],
        });
        let set = provider.detect(&RgbImage::new(4, 4)).unwrap().unwrap();
        assert_eq!(set.get(0).unwrap().x, 0.1);
    }

    #[test]
    fn test_no_face_is_none_not_error() {
        let provider = LandmarkProvider::with_detector(FixedDetector { faces: vec![] });
        assert!(provider.detect(&RgbImage::new(4, 4)).unwrap().is_none());
    }

    #[test]
    fn test_partial_set_is_treated_as_absent() {
        let provider = LandmarkProvider::with_detector(FixedDetector {
            faces: vec![face(12, 0.5)],
        });
        assert!(provider.detect(&RgbImage::new(4, 4)).unwrap().is_none());
    }

    #[test]
    fn test_lazy_init_builds_exactly_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let provider = Arc::new(LandmarkProvider::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            Ok(Box::new(FixedDetector { faces: vec![] }) as Box<dyn LandmarkDetector>)
        }));
        assert!(!provider.is_initialized());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || provider.detect(&RgbImage::new(2, 2)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(provider.is_initialized());
        assert_eq!(provider.call_count(), 8);
    }

    #[test]
    fn test_failed_init_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let provider = LandmarkProvider::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(MediaError::model_not_found("face_mesh.onnx"))
            } else {
                Ok(Box::new(FixedDetector { faces: vec![] }) as Box<dyn LandmarkDetector>)
            }
        });

        assert!(provider.detect(&RgbImage::new(2, 2)).is_err());
        assert!(provider.detect(&RgbImage::new(2, 2)).unwrap().is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_calls_are_serialized() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(LandmarkProvider::with_detector(OverlapTracker {
            in_flight: Arc::clone(&in_flight),
            peak: Arc::clone(&peak),
        }));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || provider.detect(&RgbImage::new(2, 2)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
