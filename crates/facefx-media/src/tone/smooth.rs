//! Edge-preserving skin smoothing.

use image::RgbImage;
use rayon::prelude::*;

/// Smallest bilateral window diameter.
const MIN_DIAMETER: u32 = 5;

/// Bilateral window diameter for a smoothing intensity.
///
/// Always odd and at least 5; intensities below 0.1 behave like 0.1.
pub fn smoothing_diameter(intensity: f32) -> u32 {
    let d = ((9.0 * intensity.max(0.1)) as u32).max(MIN_DIAMETER);
    if d % 2 == 0 {
        d + 1
    } else {
        d
    }
}

/// Colour and space sigma for a smoothing intensity.
pub fn smoothing_sigma(intensity: f32) -> f32 {
    75.0 + 50.0 * intensity
}

/// Smooth skin at `intensity` in `[0, 1]`. Out-of-range values are clamped.
pub fn smooth(image: &RgbImage, intensity: f32) -> RgbImage {
    let intensity = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };
    let sigma = smoothing_sigma(intensity);
    bilateral_filter(image, smoothing_diameter(intensity), sigma, sigma)
}

/// Bilateral filter over a circular window of `diameter` pixels.
///
/// Neighbour weight is the product of a spatial Gaussian on distance and a
/// range Gaussian on the summed absolute colour difference, so strong edges
/// contribute almost nothing across them. Pixels outside the image are
/// skipped rather than padded.
pub fn bilateral_filter(image: &RgbImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let radius = (diameter / 2).max(1) as i64;

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let offsets: Vec<(i64, i64, f32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .map(|(dx, dy)| (dx, dy, (((dx * dx + dy * dy) as f32) * space_coeff).exp()))
        .collect();

    // Range weights indexed by summed |dR| + |dG| + |dB|
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weights: Vec<f32> = (0..=255 * 3)
        .map(|d: u32| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let src = image.as_raw();
    let stride = w as usize * 3;
    let mut out = RgbImage::new(w, h);

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w as i64 {
            let ci = y as usize * stride + x as usize * 3;
            let center = [src[ci] as i32, src[ci + 1] as i32, src[ci + 2] as i32];

            let mut sum = [0f32; 3];
            let mut weight_sum = 0f32;
            for &(dx, dy, space_w) in &offsets {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let ni = ny as usize * stride + nx as usize * 3;
                let px = [src[ni] as i32, src[ni + 1] as i32, src[ni + 2] as i32];
                let diff = (px[0] - center[0]).unsigned_abs()
                    + (px[1] - center[1]).unsigned_abs()
                    + (px[2] - center[2]).unsigned_abs();
                let weight = space_w * color_weights[diff as usize];
                for c in 0..3 {
                    sum[c] += px[c] as f32 * weight;
                }
                weight_sum += weight;
            }

            let dst = &mut row[x as usize * 3..x as usize * 3 + 3];
            for c in 0..3 {
                dst[c] = (sum[c] / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    out
}
