//! File-path variants of the transforms.
//!
//! Each reads an image from disk and writes the result next to it as
//! `{stem}{suffix}{ext}`, e.g. `portrait.png` -> `portrait_beauty.jpg`.

use std::path::{Path, PathBuf};

use tracing::info;

use facefx_models::{
    is_valid_asset_name, BackgroundBlurParams, BeautyParams, FilterRequest, GradeParams,
    MorphParams, StickerParams,
};

use crate::error::{MediaError, MediaResult};
use crate::service::{output_format, FilterService};

/// Output file suffix, without extension.
pub fn output_suffix(request: &FilterRequest) -> String {
    match request {
        FilterRequest::Beauty(_) => "_beauty".to_string(),
        FilterRequest::BackgroundBlur(_) => "_bgblur".to_string(),
        FilterRequest::Grade(params) => format!("_lut_{}", params.filter_type),
        FilterRequest::Sticker(params) => format!("_sticker_{}", file_safe(&params.sticker_name)),
        FilterRequest::FaceMorph(_) => "_morph".to_string(),
    }
}

/// Sticker names end up in file names; anything unsafe is reduced to its safe characters.
fn file_safe(name: &str) -> String {
    if is_valid_asset_name(name) {
        return name.to_string();
    }
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(facefx_models::MAX_ASSET_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        "none".to_string()
    } else {
        cleaned
    }
}

/// Where the result for `input` is written.
pub fn output_path(input: &Path, request: &FilterRequest) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = output_format(request.kind()).extension();
    input.with_file_name(format!("{stem}{}{ext}", output_suffix(request)))
}

impl FilterService {
    /// Transform the image at `input` and write the result beside it.
    pub async fn apply_file(&self, input: &Path, request: FilterRequest) -> MediaResult<PathBuf> {
        let bytes = match tokio::fs::read(input).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::FileNotFound(input.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let output = output_path(input, &request);
        let encoded = self.process(bytes, request).await?;
        tokio::fs::write(&output, &encoded.bytes).await?;

        info!(
            input = %input.display(),
            output = %output.display(),
            outcome = encoded.outcome.as_str(),
            "Wrote filtered image"
        );
        Ok(output)
    }

    pub async fn apply_beauty_file(&self, input: &Path, params: BeautyParams) -> MediaResult<PathBuf> {
        self.apply_file(input, FilterRequest::Beauty(params)).await
    }

    pub async fn apply_background_blur_file(
        &self,
        input: &Path,
        params: BackgroundBlurParams,
    ) -> MediaResult<PathBuf> {
        self.apply_file(input, FilterRequest::BackgroundBlur(params)).await
    }

    pub async fn apply_grade_file(&self, input: &Path, params: GradeParams) -> MediaResult<PathBuf> {
        self.apply_file(input, FilterRequest::Grade(params)).await
    }

    pub async fn apply_sticker_file(&self, input: &Path, params: StickerParams) -> MediaResult<PathBuf> {
        self.apply_file(input, FilterRequest::Sticker(params)).await
    }

    pub async fn apply_morph_file(&self, input: &Path, params: MorphParams) -> MediaResult<PathBuf> {
        self.apply_file(input, FilterRequest::FaceMorph(params)).await
    }
}
