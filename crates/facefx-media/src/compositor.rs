//! Alpha compositing.
//!
//! One blend formula serves both uses: stamping an overlay into a region
//! and merging two full frames through a mask. Blending is done in `f32`
//! and truncated on write, so opacity 1 and opacity 0 are exact.

use image::{DynamicImage, GrayImage, RgbImage};
use rayon::prelude::*;
use tracing::warn;

use crate::anchor::PlacementRect;
use crate::error::{MediaError, MediaResult};
use crate::imaging::resize_area;

#[inline]
fn blend(src: u8, dst: u8, alpha: f32) -> u8 {
    (alpha * src as f32 + (1.0 - alpha) * dst as f32) as u8
}

/// Composite `source` into `dest` over `rect`.
///
/// The source is area-resized to the rectangle. A source with an alpha
/// channel is blended by it; an opaque source replaces the region. The
/// destination is taken by value and handed back, so no other handle to it
/// can observe the write.
///
/// `rect` must lie inside `dest`; [`crate::anchor::clamp_placement`]
/// guarantees this. A rectangle that does not fit leaves `dest` untouched.
pub fn composite_region(mut dest: RgbImage, source: &DynamicImage, rect: PlacementRect) -> RgbImage {
    let (dest_w, dest_h) = dest.dimensions();
    if rect.area() == 0 || !rect.fits_within(dest_w, dest_h) {
        warn!(?rect, dest_w, dest_h, "Placement outside destination, skipping composite");
        return dest;
    }

    let row_stride = dest_w as usize * 3;
    let x0 = rect.x as usize * 3;
    let span = rect.width as usize * 3;
    let rows = dest
        .par_chunks_mut(row_stride)
        .skip(rect.y as usize)
        .take(rect.height as usize);

    if source.color().has_alpha() {
        let overlay = resize_area(&source.to_rgba8(), rect.width, rect.height);
        let overlay_stride = rect.width as usize * 4;
        rows.zip(overlay.par_chunks(overlay_stride)).for_each(|(row, src)| {
            for (dst, px) in row[x0..x0 + span].chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                let alpha = px[3] as f32 / 255.0;
                for c in 0..3 {
                    dst[c] = blend(px[c], dst[c], alpha);
                }
            }
        });
    } else {
        let overlay = resize_area(&source.to_rgb8(), rect.width, rect.height);
        rows.zip(overlay.par_chunks(span)).for_each(|(row, src)| {
            row[x0..x0 + span].copy_from_slice(src);
        });
    }

    dest
}

/// Merge two equally-sized frames through a foreground mask.
///
/// Mask value 255 selects `foreground`, 0 selects `background`, and values
/// in between blend with opacity `mask / 255`. Inputs are not modified.
pub fn merge(foreground: &RgbImage, background: &RgbImage, mask: &GrayImage) -> MediaResult<RgbImage> {
    let expected = foreground.dimensions();
    for actual in [background.dimensions(), mask.dimensions()] {
        if actual != expected {
            return Err(MediaError::DimensionMismatch { expected, actual });
        }
    }

    let mut out = RgbImage::new(expected.0, expected.1);
    out.par_chunks_mut(3)
        .zip(foreground.par_chunks(3))
        .zip(background.par_chunks(3))
        .zip(mask.par_iter())
        .for_each(|(((dst, fg), bg), &m)| {
            let alpha = m as f32 / 255.0;
            for c in 0..3 {
                dst[c] = blend(fg[c], bg[c], alpha);
            }
        });
    Ok(out)
}
