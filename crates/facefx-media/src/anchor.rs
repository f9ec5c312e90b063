//! Overlay placement from face landmarks.
//!
//! Pure geometry: landmark set plus image and asset dimensions in, clamped
//! placement rectangle out. Clamping shrinks the overlay rather than moving
//! it, so an overlay hanging off an edge is trimmed where it hangs.

use facefx_models::AnchorMode;

use crate::landmarks::LandmarkSet;

/// Face mesh index just left of the forehead centre line.
pub const FOREHEAD_LEFT: usize = 10;
/// Face mesh index on the right forehead.
pub const FOREHEAD_RIGHT: usize = 338;

/// Overlay width relative to the measured face width.
pub const OVERLAY_WIDTH_SCALE: f64 = 1.5;
/// Left shift of the overlay origin, as a fraction of face width.
pub const OVERLAY_LEFT_SHIFT: f64 = 0.25;

/// Placement before clamping. May extend past any image edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPlacement {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Placement rectangle fully inside the image, with non-zero area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PlacementRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the rectangle lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

/// Overlay rectangle for a face of `face_width` pixels anchored at `(anchor_x, anchor_y)`.
///
/// The overlay is 1.5x the face width, keeps the asset aspect ratio and sits
/// directly above the anchor, shifted left by a quarter face width.
fn overlay_from_anchor(
    anchor_x: i64,
    anchor_y: i64,
    face_width: i64,
    asset_dims: (u32, u32),
) -> Option<RawPlacement> {
    let (asset_w, asset_h) = asset_dims;
    if asset_w == 0 || asset_h == 0 {
        return None;
    }
    let width = (face_width as f64 * OVERLAY_WIDTH_SCALE) as i64;
    let height = (width as f64 * asset_h as f64 / asset_w as f64) as i64;
    Some(RawPlacement {
        x: anchor_x.saturating_sub((face_width as f64 * OVERLAY_LEFT_SHIFT) as i64),
        y: anchor_y.saturating_sub(height),
        width,
        height,
    })
}

/// Two-point anchor on the forehead landmarks.
///
/// Face width is the horizontal distance between the two points; the first
/// point is the anchor.
pub fn two_point_placement(
    landmarks: &LandmarkSet,
    image_dims: (u32, u32),
    asset_dims: (u32, u32),
) -> Option<RawPlacement> {
    let (w, h) = image_dims;
    let (x1, y1) = landmarks.pixel(FOREHEAD_LEFT, w, h)?;
    let (x2, _) = landmarks.pixel(FOREHEAD_RIGHT, w, h)?;
    overlay_from_anchor(x1, y1, x2.saturating_sub(x1).saturating_abs(), asset_dims)
}

/// Bounding-box anchor over every landmark.
///
/// The box is clamped to the image before measuring, and the overlay is
/// anchored at its top-left corner.
pub fn bounding_box_placement(
    landmarks: &LandmarkSet,
    image_dims: (u32, u32),
    asset_dims: (u32, u32),
) -> Option<RawPlacement> {
    let (w, h) = image_dims;
    if landmarks.is_empty() || w == 0 || h == 0 {
        return None;
    }
    let max_x = w as i64 - 1;
    let max_y = h as i64 - 1;

    let (min_px, min_py, max_px) = landmarks.points().iter().fold(
        (i64::MAX, i64::MAX, i64::MIN),
        |(min_x, min_y, max_px), p| {
            let (px, py) = p.to_pixel(w, h);
            let (px, py) = (px.clamp(0, max_x), py.clamp(0, max_y));
            (min_x.min(px), min_y.min(py), max_px.max(px))
        },
    );

    overlay_from_anchor(min_px, min_py, max_px.saturating_sub(min_px), asset_dims)
}

/// Clamp a raw placement into a `width` x `height` image.
///
/// A negative origin shrinks the matching dimension by the overshoot before
/// the origin is zeroed; overflow past the far edge is then trimmed.
/// Returns `None` when nothing of the overlay remains visible.
pub fn clamp_placement(raw: RawPlacement, image_dims: (u32, u32)) -> Option<PlacementRect> {
    let (img_w, img_h) = (image_dims.0 as i64, image_dims.1 as i64);
    let RawPlacement {
        mut x,
        mut y,
        mut width,
        mut height,
    } = raw;

    if x < 0 {
        width = width.saturating_add(x);
        x = 0;
    }
    if y < 0 {
        height = height.saturating_add(y);
        y = 0;
    }
    if x.saturating_add(width) > img_w {
        width = img_w - x;
    }
    if y.saturating_add(height) > img_h {
        height = img_h - y;
    }

    if width <= 0 || height <= 0 {
        return None;
    }

    Some(PlacementRect::new(
        x as u32,
        y as u32,
        width as u32,
        height as u32,
    ))
}

/// Clamped placement for an asset over the face described by `landmarks`.
///
/// `None` means the overlay should be skipped: required landmarks missing,
/// a degenerate asset, or nothing left after clamping.
pub fn compute_placement(
    mode: AnchorMode,
    landmarks: &LandmarkSet,
    image_dims: (u32, u32),
    asset_dims: (u32, u32),
) -> Option<PlacementRect> {
    let raw = match mode {
        AnchorMode::TwoPoint => two_point_placement(landmarks, image_dims, asset_dims)?,
        AnchorMode::BoundingBox => bounding_box_placement(landmarks, image_dims, asset_dims)?,
    };
    clamp_placement(raw, image_dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{NormalizedPoint, FACE_MESH_LANDMARK_COUNT};

    /// Full landmark set with the two forehead anchors at the given pixels.
    fn forehead_landmarks(left: (f32, f32), right: (f32, f32), dims: (u32, u32)) -> LandmarkSet {
        let (w, h) = (dims.0 as f32, dims.1 as f32);
        let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
        // Nudge by half a pixel so truncation lands on the intended pixel
        points[FOREHEAD_LEFT] = NormalizedPoint::new((left.0 + 0.5) / w, (left.1 + 0.5) / h);
        points[FOREHEAD_RIGHT] = NormalizedPoint::new((right.0 + 0.5) / w, (right.1 + 0.5) / h);
        LandmarkSet::new(points)
    }

    #[test]
    fn test_two_point_raw_geometry() {
        let lms = forehead_landmarks((300.0, 200.0), (500.0, 200.0), (800, 600));
        let raw = two_point_placement(&lms, (800, 600), (64, 64)).unwrap();
        assert_eq!(
            raw,
            RawPlacement {
                x: 250,
                y: -100,
                width: 300,
                height: 300
            }
        );
    }

    #[test]
    fn test_overhang_top_is_trimmed_not_moved() {
        let lms = forehead_landmarks((300.0, 200.0), (500.0, 200.0), (800, 600));
        let rect = compute_placement(AnchorMode::TwoPoint, &lms, (800, 600), (512, 512)).unwrap();
        assert_eq!(rect, PlacementRect::new(250, 0, 300, 200));
    }

    #[test]
    fn test_aspect_ratio_preserved() {
        let lms = forehead_landmarks((100.0, 400.0), (200.0, 400.0), (800, 600));
        // 150 wide, asset 2:1 -> 75 tall
        let rect = compute_placement(AnchorMode::TwoPoint, &lms, (800, 600), (200, 100)).unwrap();
        assert_eq!(rect, PlacementRect::new(75, 325, 150, 75));
    }

    #[test]
    fn test_clamp_left_and_right() {
        let rect = clamp_placement(
            RawPlacement {
                x: -30,
                y: 10,
                width: 100,
                height: 20,
            },
            (50, 50),
        )
        .unwrap();
        assert_eq!(rect, PlacementRect::new(0, 10, 50, 20));

        let rect = clamp_placement(
            RawPlacement {
                x: 40,
                y: 45,
                width: 100,
                height: 20,
            },
            (50, 50),
        )
        .unwrap();
        assert_eq!(rect, PlacementRect::new(40, 45, 10, 5));
    }

    #[test]
    fn test_fully_offscreen_is_skipped() {
        let above = RawPlacement {
            x: 10,
            y: -80,
            width: 40,
            height: 60,
        };
        assert!(clamp_placement(above, (100, 100)).is_none());

        let right = RawPlacement {
            x: 100,
            y: 10,
            width: 40,
            height: 60,
        };
        assert!(clamp_placement(right, (100, 100)).is_none());
    }

    #[test]
    fn test_coincident_anchors_give_no_overlay() {
        let lms = forehead_landmarks((300.0, 200.0), (300.0, 260.0), (800, 600));
        assert!(compute_placement(AnchorMode::TwoPoint, &lms, (800, 600), (10, 10)).is_none());
    }

    #[test]
    fn test_bounding_box_anchor() {
        let dims = (400, 400);
        let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
        points[0] = NormalizedPoint::new(0.25, 0.5);
        points[1] = NormalizedPoint::new(0.75, 0.75);
        let lms = LandmarkSet::new(points);

        // Box (100,200)-(300,300): face width 200 -> overlay 300x150 above (100,200)
        let rect = compute_placement(AnchorMode::BoundingBox, &lms, dims, (200, 100)).unwrap();
        assert_eq!(rect, PlacementRect::new(50, 50, 300, 150));
    }

    #[test]
    fn test_missing_anchor_index_is_skipped() {
        let lms = LandmarkSet::new(vec![NormalizedPoint::new(0.5, 0.5); 20]);
        assert!(compute_placement(AnchorMode::TwoPoint, &lms, (100, 100), (10, 10)).is_none());
    }

    #[test]
    fn test_extreme_landmarks_do_not_overflow() {
        let dims = (800u32, 600u32);
        let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
        points[FOREHEAD_LEFT] = NormalizedPoint::new(f32::NEG_INFINITY, f32::MAX);
        points[FOREHEAD_RIGHT] = NormalizedPoint::new(f32::INFINITY, f32::MIN);
        let lms = LandmarkSet::new(points);

        for &mode in AnchorMode::ALL {
            for asset in [(64, 64), (1, u32::MAX), (u32::MAX, 1)] {
                if let Some(rect) = compute_placement(mode, &lms, dims, asset) {
                    assert!(rect.fits_within(dims.0, dims.1), "{rect:?} escapes {dims:?}");
                }
            }
        }
    }

    #[test]
    fn test_clamp_saturates_extreme_raw_values() {
        let raw = RawPlacement {
            x: i64::MIN,
            y: i64::MIN,
            width: i64::MAX,
            height: i64::MAX,
        };
        assert_eq!(clamp_placement(raw, (10, 10)), None);

        let raw = RawPlacement {
            x: 5,
            y: 5,
            width: i64::MAX,
            height: i64::MAX,
        };
        assert_eq!(clamp_placement(raw, (10, 10)), Some(PlacementRect::new(5, 5, 5, 5)));
    }

    #[test]
    fn test_placements_always_inside_image() {
        let dims = (320u32, 240u32);
        for i in 0..=20 {
            for j in 0..=20 {
                let left = (i as f32 * 0.07 - 0.2, j as f32 * 0.06 - 0.1);
                let right = (left.0 + 0.05 * (j % 7) as f32, left.1 + 0.01 * (i % 3) as f32);
                let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_LANDMARK_COUNT];
                points[FOREHEAD_LEFT] = NormalizedPoint::new(left.0, left.1);
                points[FOREHEAD_RIGHT] = NormalizedPoint::new(right.0, right.1);
                let lms = LandmarkSet::new(points);

                for &mode in AnchorMode::ALL {
                    for asset in [(64, 64), (300, 90), (50, 400)] {
                        if let Some(rect) = compute_placement(mode, &lms, dims, asset) {
                            assert!(rect.width > 0 && rect.height > 0);
                            assert!(rect.fits_within(dims.0, dims.1), "{rect:?} escapes {dims:?}");
                        }
                    }
                }
            }
        }
    }
}
