//! Decode, encode and resampling helpers shared by every transform.

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Pixel, RgbImage};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// JPEG quality for tone-only outputs.
pub const JPEG_QUALITY: u8 = 92;

/// Encoded output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => ".jpg",
            OutputFormat::Png => ".png",
        }
    }
}

/// Decode an image, sniffing the format from its magic bytes.
pub fn decode(bytes: &[u8]) -> MediaResult<DynamicImage> {
    if bytes.is_empty() {
        return Err(MediaError::invalid_image("empty input"));
    }
    let format = image::guess_format(bytes)
        .map_err(|e| MediaError::invalid_image(format!("unrecognised format: {e}")))?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| MediaError::invalid_image(e.to_string()))?;
    debug!(
        format = ?format,
        width = image.width(),
        height = image.height(),
        "Decoded input image"
    );
    Ok(image)
}

/// Decode straight into an 8-bit RGB working buffer.
pub fn decode_rgb(bytes: &[u8]) -> MediaResult<RgbImage> {
    Ok(decode(bytes)?.to_rgb8())
}

/// Encode an RGB buffer.
pub fn encode(image: &RgbImage, format: OutputFormat) -> MediaResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let output = match format {
        OutputFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
        OutputFormat::Png => ImageOutputFormat::Png,
    };
    image
        .write_to(&mut buf, output)
        .map_err(|e| MediaError::EncodeFailed(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Dimensions after capping the longest side at `max_side`, aspect preserved.
pub fn fit_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_side || long == 0 {
        return (width, height);
    }
    let scale = max_side as f64 / long as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_side);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_side);
    (w, h)
}

/// `image` shrunk so its longest side is at most `max_side`.
///
/// Borrows the input when it already fits. Used for the copy handed to a
/// model; the caller keeps compositing onto the full-size buffer.
pub fn downscaled(image: &RgbImage, max_side: u32) -> Cow<'_, RgbImage> {
    let (width, height) = image.dimensions();
    let (w, h) = fit_dimensions(width, height, max_side);
    if (w, h) == (width, height) {
        return Cow::Borrowed(image);
    }
    debug!(
        from_width = width,
        from_height = height,
        to_width = w,
        to_height = h,
        "Downscaling model input"
    );
    Cow::Owned(resize_area(image, w, h))
}

/// Source coverage of each destination cell along one axis.
fn axis_weights(src_len: u32, dst_len: u32) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = start + scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len as usize);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 1e-9).then_some((s, overlap / scale))
                })
                .collect()
        })
        .collect()
}

/// Resize with area averaging.
///
/// Each destination pixel is the coverage-weighted mean of the source pixels
/// under it, which avoids aliasing when shrinking. Enlarging falls back to
/// bilinear interpolation, where area averaging has nothing to average.
pub fn resize_area<P>(src: &ImageBuffer<P, Vec<u8>>, width: u32, height: u32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (width, height) {
        return src.clone();
    }
    if width == 0 || height == 0 || src_w == 0 || src_h == 0 {
        return ImageBuffer::new(width, height);
    }
    if width > src_w || height > src_h {
        return image::imageops::resize(src, width, height, FilterType::Triangle);
    }

    let channels = P::CHANNEL_COUNT as usize;
    let x_weights = axis_weights(src_w, width);
    let y_weights = axis_weights(src_h, height);
    let src_raw: &[u8] = src.as_raw();
    let src_stride = src_w as usize * channels;

    let mut out: ImageBuffer<P, Vec<u8>> = ImageBuffer::new(width, height);
    out.par_chunks_mut(width as usize * channels)
        .zip(y_weights.par_iter())
        .for_each(|(row, ys)| {
            let mut acc = vec![0f64; channels];
            for (dx, xs) in x_weights.iter().enumerate() {
                acc.iter_mut().for_each(|a| *a = 0.0);
                for &(sy, wy) in ys {
                    let line = &src_raw[sy * src_stride..(sy + 1) * src_stride];
                    for &(sx, wx) in xs {
                        let w = wy * wx;
                        let px = &line[sx * channels..(sx + 1) * channels];
                        for (a, v) in acc.iter_mut().zip(px) {
                            *a += *v as f64 * w;
                        }
                    }
                }
                let dst = &mut row[dx * channels..(dx + 1) * channels];
                for (d, a) in dst.iter_mut().zip(&acc) {
                    *d = a.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    out
}
