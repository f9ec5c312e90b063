//! Application state.

use std::sync::Arc;

use facefx_media::{FilterService, MediaConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub filters: Arc<FilterService>,
}

impl AppState {
    /// State around an already-built filter service.
    pub fn new(config: ApiConfig, filters: Arc<FilterService>) -> Self {
        Self { config, filters }
    }

    /// Build the model-backed filter service.
    ///
    /// Loading the segmentation model reads and optimizes the ONNX graph, so
    /// it runs on the blocking pool.
    pub async fn from_config(config: ApiConfig, media: MediaConfig) -> anyhow::Result<Self> {
        let filters = tokio::task::spawn_blocking(move || FilterService::from_config(&media)).await?;
        Ok(Self::new(config, Arc::new(filters)))
    }
}
