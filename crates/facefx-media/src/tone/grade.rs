//! Colour grading.
//!
//! A 1-D LUT image `{lut_dir}/{filter}.png` takes precedence. Without a
//! usable LUT, the image is converted to luma and mapped through a
//! colormap (or, for sepia, a fixed colour matrix is applied). Which path
//! produced the output is reported as a [`GradeSource`].

use std::path::Path;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, warn};

use facefx_models::GradeFilter;

use crate::imaging;

/// Entries in a 1-D LUT.
pub const LUT_SIZE: u32 = 256;

/// Which grading path produced the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeSource {
    /// Per-channel LUT file
    Lut,
    /// Built-in colormap over luma
    Colormap,
    /// Fixed colour matrix
    Matrix,
}

impl GradeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeSource::Lut => "lut",
            GradeSource::Colormap => "colormap",
            GradeSource::Matrix => "matrix",
        }
    }
}

/// Per-channel lookup table: entry `i` holds the output R, G and B for input value `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLut {
    table: Vec<[u8; 3]>,
}

impl ChannelLut {
    /// Build from a 256x1 or 1x256 RGB image.
    pub fn from_image(image: &RgbImage) -> Option<Self> {
        match image.dimensions() {
            (LUT_SIZE, 1) | (1, LUT_SIZE) => Some(Self {
                table: image.pixels().map(|p| p.0).collect(),
            }),
            _ => None,
        }
    }

    /// Load a LUT file. `None` if missing, unreadable, or the wrong shape.
    pub fn load(path: &Path) -> Option<Self> {
        if !path.is_file() {
            return None;
        }
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "LUT unreadable");
                return None;
            }
        };
        let image = match imaging::decode_rgb(&bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "LUT undecodable");
                return None;
            }
        };
        let lut = Self::from_image(&image);
        if lut.is_none() {
            warn!(
                path = %path.display(),
                width = image.width(),
                height = image.height(),
                "LUT must be 256x1 or 1x256"
            );
        }
        lut
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        out.par_chunks_mut(3).for_each(|px| {
            for c in 0..3 {
                px[c] = self.table[px[c] as usize][c];
            }
        });
        out
    }
}

/// Luma with BT.601 weights.
#[inline]
fn luma(px: &[u8]) -> u8 {
    (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32).round() as u8
}

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Blue-green ramp: blue rises linearly, green dips then climbs, red only at the top.
fn ocean(t: f32) -> [u8; 3] {
    [
        unit_to_u8(3.0 * t - 2.0),
        unit_to_u8(((3.0 * t - 1.0) / 2.0).abs()),
        unit_to_u8(t),
    ]
}

/// Red to yellow.
fn autumn(t: f32) -> [u8; 3] {
    [255, unit_to_u8(t), 0]
}

/// Blue to yellow, perceptually uniform and colour-vision friendly.
fn cividis(t: f32) -> [u8; 3] {
    const STOPS: [(f32, [f32; 3]); 5] = [
        (0.0, [0.0, 32.0, 77.0]),
        (0.25, [65.0, 77.0, 108.0]),
        (0.5, [124.0, 123.0, 120.0]),
        (0.75, [188.0, 175.0, 111.0]),
        (1.0, [255.0, 234.0, 70.0]),
    ];
    let t = t.clamp(0.0, 1.0);
    let i = STOPS
        .windows(2)
        .position(|pair| t <= pair[1].0)
        .unwrap_or(STOPS.len() - 2);
    let (t0, c0) = STOPS[i];
    let (t1, c1) = STOPS[i + 1];
    let f = (t - t0) / (t1 - t0);
    let lerp = |c: usize| (c0[c] + (c1[c] - c0[c]) * f).round().clamp(0.0, 255.0) as u8;
    [lerp(0), lerp(1), lerp(2)]
}

/// Contrast lift, then blue up and red down.
fn cinematic(t: f32) -> [u8; 3] {
    let scale = |v: u8, k: f32| (v as f32 * k).round().clamp(0.0, 255.0) as u8;
    let [r, g, b] = cividis(t).map(|v| scale(v, 1.15));
    [scale(r, 0.95), g, scale(b, 1.08)]
}

fn colormap_table(filter: GradeFilter) -> Vec<[u8; 3]> {
    let map: fn(f32) -> [u8; 3] = match filter {
        GradeFilter::Cool => ocean,
        GradeFilter::Warm => autumn,
        GradeFilter::Cinematic | GradeFilter::Sepia => cinematic,
    };
    (0..LUT_SIZE).map(|i| map(i as f32 / 255.0)).collect()
}

/// Grayscale the image and map luma through the filter's colormap.
pub fn apply_colormap(image: &RgbImage, filter: GradeFilter) -> RgbImage {
    let table = colormap_table(filter);
    let mut out = image.clone();
    out.par_chunks_mut(3).for_each(|px| {
        let mapped = table[luma(px) as usize];
        px.copy_from_slice(&mapped);
    });
    out
}

/// Classic sepia colour matrix.
pub fn apply_sepia(image: &RgbImage) -> RgbImage {
    const M: [[f32; 3]; 3] = [
        [0.393, 0.769, 0.189],
        [0.349, 0.686, 0.168],
        [0.272, 0.534, 0.131],
    ];
    let mut out = image.clone();
    out.par_chunks_mut(3).for_each(|px| {
        let src = [px[0] as f32, px[1] as f32, px[2] as f32];
        for (c, row) in M.iter().enumerate() {
            let v = row[0] * src[0] + row[1] * src[1] + row[2] * src[2];
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// Grade `image` with `filter`, preferring a LUT file in `lut_dir`.
pub fn grade(image: &RgbImage, filter: GradeFilter, lut_dir: &Path) -> (RgbImage, GradeSource) {
    let lut_path = lut_dir.join(format!("{}.png", filter.as_str()));
    if let Some(lut) = ChannelLut::load(&lut_path) {
        debug!(filter = %filter, path = %lut_path.display(), "Applying LUT");
        return (lut.apply(image), GradeSource::Lut);
    }

    match filter {
        GradeFilter::Sepia => {
            debug!(filter = %filter, "No LUT, applying colour matrix");
            (apply_sepia(image), GradeSource::Matrix)
        }
        _ => {
            debug!(filter = %filter, "No LUT, applying colormap");
            (apply_colormap(image, filter), GradeSource::Colormap)
        }
    }
}
