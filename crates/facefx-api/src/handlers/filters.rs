//! Multipart filter endpoints.
//!
//! Every endpoint takes a `file` part plus optional form fields and answers
//! with the encoded image. The path the transform took (for example
//! `placed`, `no_face`, `blur_only`, `lut`) is reported in the
//! `x-facefx-outcome` header.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use facefx_media::EncodedImage;
use facefx_models::{
    BackgroundBlurParams, BeautyParams, FilterRequest, GradeFilter, GradeParams, MorphParams,
    StickerParams,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response header naming the path a transform took.
pub const OUTCOME_HEADER: &str = "x-facefx-outcome";

/// A parsed multipart upload.
struct Upload {
    file: Vec<u8>,
    fields: HashMap<String, String>,
}

impl Upload {
    /// Read the `file` part and every text field.
    async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        endpoint: &'static str,
    ) -> ApiResult<Self> {
        let mut multipart =
            multipart.map_err(|e| ApiError::bad_request(format!("Expected multipart form data: {e}")))?;

        let mut file = None;
        let mut fields = HashMap::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "file" {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
                file = Some(bytes.to_vec());
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field {name}: {e}")))?;
                fields.insert(name, value);
            }
        }

        let file = file.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
        if file.is_empty() {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }
        metrics::record_upload_bytes(endpoint, file.len());
        debug!(endpoint, bytes = file.len(), fields = fields.len(), "Read upload");

        Ok(Self { file, fields })
    }

    /// Parse an optional form field, falling back to `default` when absent or blank.
    fn field<T: FromStr>(&self, name: &str, default: T) -> ApiResult<T> {
        match self.fields.get(name).map(|v| v.trim()) {
            None | Some("") => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid value for {name}: {raw}"))),
        }
    }
}

fn image_response(encoded: EncodedImage) -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(encoded.format.mime_type())),
            (
                HeaderName::from_static(OUTCOME_HEADER),
                HeaderValue::from_static(encoded.outcome.as_str()),
            ),
        ],
        encoded.bytes,
    )
        .into_response()
}

async fn run(state: &AppState, upload: Upload, request: FilterRequest) -> ApiResult<Response> {
    let encoded = state.filters.process(upload.file, request).await?;
    Ok(image_response(encoded))
}

/// POST /beauty-filter
pub async fn beauty_filter(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let upload = Upload::read(multipart, "beauty_filter").await?;
    let params = BeautyParams {
        intensity: upload.field("intensity", BeautyParams::default().intensity)?,
    };
    run(&state, upload, FilterRequest::Beauty(params)).await
}

/// POST /background-blur
pub async fn background_blur(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let upload = Upload::read(multipart, "background_blur").await?;
    let params = BackgroundBlurParams {
        blur_strength: upload.field("blur_strength", BackgroundBlurParams::default().blur_strength)?,
    };
    run(&state, upload, FilterRequest::BackgroundBlur(params)).await
}

/// POST /lut-filter
pub async fn lut_filter(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let upload = Upload::read(multipart, "lut_filter").await?;
    let params = GradeParams {
        filter_type: upload.field("filter_type", GradeFilter::default())?,
    };
    run(&state, upload, FilterRequest::Grade(params)).await
}

/// POST /sticker
pub async fn sticker(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let upload = Upload::read(multipart, "sticker").await?;
    let params = StickerParams {
        sticker_name: upload.field("sticker_name", StickerParams::default().sticker_name)?,
    };
    run(&state, upload, FilterRequest::Sticker(params)).await
}

/// POST /face-morph
pub async fn face_morph(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let upload = Upload::read(multipart, "face_morph").await?;
    let defaults = MorphParams::default();
    let params = MorphParams {
        eye_size: upload.field("eye_size", defaults.eye_size)?,
        smile: upload.field("smile", defaults.smile)?,
        chin: upload.field("chin", defaults.chin)?,
    };
    run(&state, upload, FilterRequest::FaceMorph(params)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(fields: &[(&str, &str)]) -> Upload {
        Upload {
            file: vec![1],
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_field_defaults_and_parsing() {
        let u = upload(&[("intensity", " 0.25 "), ("smile", "")]);
        assert_eq!(u.field("intensity", 0.8f32).unwrap(), 0.25);
        assert_eq!(u.field("smile", 0.5f32).unwrap(), 0.5);
        assert_eq!(u.field("chin", 0.5f32).unwrap(), 0.5);
        assert!(u.field("intensity", GradeFilter::Cool).is_err());
    }

    #[test]
    fn test_grade_filter_field() {
        let u = upload(&[("filter_type", "Cinematic")]);
        assert_eq!(u.field("filter_type", GradeFilter::Cool).unwrap(), GradeFilter::Cinematic);
        let u = upload(&[("filter_type", "vintage")]);
        assert!(u.field("filter_type", GradeFilter::Cool).is_err());
    }
}
