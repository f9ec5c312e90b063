//! Filter pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use facefx_models::AnchorMode;

/// Built-in sticker directories, probed after the configured override.
pub const DEFAULT_STICKER_DIRS: &[&str] = &["./assets/stickers", "/app/assets/stickers"];

/// Default directory for 1-D LUT images.
pub const DEFAULT_LUT_DIR: &str = "./assets/lut_filters";

/// Filter pipeline configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Maximum heavy transforms (landmark / segmentation) in flight.
    /// Landmark inference is additionally serialized behind a single lock,
    /// so raising this past the segmentation workload buys no detector throughput.
    pub max_concurrent_transforms: usize,
    /// Longest image side handed to a model; larger inputs are scaled down for inference only
    pub max_image_side: u32,
    /// Sticker directory probed before the built-in ones
    pub sticker_dir_override: Option<PathBuf>,
    /// Built-in sticker directories in priority order
    pub sticker_fallback_dirs: Vec<PathBuf>,
    /// Directory containing `{filter}.png` LUT images
    pub lut_dir: PathBuf,
    /// Sticker anchor strategy
    pub anchor_mode: AnchorMode,
    /// Bound on waiting for a gate slot (`None` waits forever)
    pub gate_timeout: Option<Duration>,
    /// Bound on one heavy call once it holds a slot (`None` waits forever)
    pub heavy_timeout: Option<Duration>,
    /// Explicit face mesh model path
    pub face_mesh_model: Option<PathBuf>,
    /// Explicit segmentation model path
    pub segmentation_model: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transforms: 2,
            max_image_side: 2048,
            sticker_dir_override: None,
            sticker_fallback_dirs: DEFAULT_STICKER_DIRS.iter().map(PathBuf::from).collect(),
            lut_dir: PathBuf::from(DEFAULT_LUT_DIR),
            anchor_mode: AnchorMode::TwoPoint,
            gate_timeout: Some(Duration::from_secs(30)),
            heavy_timeout: Some(Duration::from_secs(60)),
            face_mesh_model: None,
            segmentation_model: None,
        }
    }
}

/// Seconds from env; 0 disables the bound.
fn env_timeout(key: &str, default_secs: u64) -> Option<Duration> {
    let secs = std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_secs);
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_transforms: std::env::var("FACEFX_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_transforms),
            max_image_side: std::env::var("FACEFX_MAX_IMAGE_SIDE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_image_side),
            sticker_dir_override: std::env::var("FACEFX_STICKER_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            sticker_fallback_dirs: defaults.sticker_fallback_dirs,
            lut_dir: std::env::var("FACEFX_LUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.lut_dir),
            anchor_mode: std::env::var("FACEFX_STICKER_ANCHOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.anchor_mode),
            gate_timeout: env_timeout("FACEFX_GATE_TIMEOUT_SECS", 30),
            heavy_timeout: env_timeout("FACEFX_HEAVY_TIMEOUT_SECS", 60),
            face_mesh_model: std::env::var("FACEFX_FACE_MESH_MODEL").ok().map(PathBuf::from),
            segmentation_model: std::env::var("FACEFX_SEGMENTATION_MODEL")
                .ok()
                .map(PathBuf::from),
        }
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent_transforms = n.max(1);
        self
    }

    pub fn with_max_image_side(mut self, side: u32) -> Self {
        self.max_image_side = side.max(1);
        self
    }

    pub fn with_sticker_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sticker_dir_override = Some(dir.into());
        self
    }

    /// Replace the built-in sticker directories.
    pub fn with_sticker_fallback_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.sticker_fallback_dirs = dirs;
        self
    }

    pub fn with_lut_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lut_dir = dir.into();
        self
    }

    pub fn with_anchor_mode(mut self, mode: AnchorMode) -> Self {
        self.anchor_mode = mode;
        self
    }

    pub fn with_gate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.gate_timeout = timeout;
        self
    }

    pub fn with_heavy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.heavy_timeout = timeout;
        self
    }

    /// Sticker search directories, override first.
    pub fn sticker_search_dirs(&self) -> Vec<PathBuf> {
        self.sticker_dir_override
            .iter()
            .cloned()
            .chain(self.sticker_fallback_dirs.iter().cloned())
            .collect()
    }
}
