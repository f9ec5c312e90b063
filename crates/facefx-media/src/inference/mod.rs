//! ONNX Runtime-backed collaborators.
//!
//! - [`OrtFaceMeshDetector`]: MediaPipe face mesh landmarks
//! - [`OrtSegmenter`]: U²-Net style salient-object segmentation
//!
//! `Session::run` needs exclusive access: the face mesh relies on its
//! provider's lock, the segmenter keeps its session behind a `Mutex`.

pub mod face_mesh;
pub mod segmentation;

use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

pub use face_mesh::OrtFaceMeshDetector;
pub use segmentation::OrtSegmenter;

/// Pick a model file: the explicit path if it exists, else the first existing candidate.
///
/// Candidates starting with `~/` are resolved against `$HOME`.
pub fn find_model(explicit: Option<&Path>, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        debug!(path = %path.display(), "Configured model path does not exist, searching defaults");
    }

    candidates
        .iter()
        .filter_map(|candidate| match candidate.strip_prefix("~/") {
            Some(rest) => std::env::var("HOME").ok().map(|home| Path::new(&home).join(rest)),
            None => Some(PathBuf::from(candidate)),
        })
        .find(|path| path.is_file())
}

/// Build an optimized session from a model file.
///
/// With the `cuda` feature the CUDA provider is tried first; any failure
/// there falls back to CPU.
pub fn create_session(model_path: &Path) -> MediaResult<Session> {
    if !model_path.is_file() {
        return Err(MediaError::model_not_found(model_path.display().to_string()));
    }

    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {e}")))?;

    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(model = %model_path.display(), "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    let session = builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {e}")))?;
    info!(model = %model_path.display(), "Loaded ONNX model on CPU");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_model_prefers_explicit() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("mine.onnx");
        let fallback = dir.path().join("default.onnx");
        std::fs::write(&explicit, b"x").unwrap();
        std::fs::write(&fallback, b"x").unwrap();

        let fallback_str = fallback.to_string_lossy().to_string();
        let found = find_model(Some(&explicit), &[fallback_str.as_str()]).unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn test_find_model_skips_missing_candidates() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present.onnx");
        std::fs::write(&present, b"x").unwrap();

        let missing = dir.path().join("nope.onnx");
        let missing_str = missing.to_string_lossy().to_string();
        let present_str = present.to_string_lossy().to_string();
        let found = find_model(Some(&missing), &[missing_str.as_str(), present_str.as_str()]);
        assert_eq!(found, Some(present));
    }

    #[test]
    fn test_create_session_missing_file() {
        let err = create_session(Path::new("/nonexistent/model.onnx")).unwrap_err();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }
}
