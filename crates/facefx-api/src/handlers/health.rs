//! Health, readiness and service index handlers.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use schemars::schema::RootSchema;
use serde::Serialize;

use facefx_models::FilterRequest;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub landmarks: CheckStatus,
    pub segmentation: CheckStatus,
    pub gate: GateStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            fallback: None,
        }
    }

    fn unavailable(fallback: impl Into<String>) -> Self {
        Self {
            status: "unavailable".to_string(),
            fallback: Some(fallback.into()),
        }
    }
}

#[derive(Serialize)]
pub struct GateStatus {
    pub capacity: usize,
    pub available: usize,
}

/// Readiness check endpoint (readiness probe).
///
/// Always 200: every transform degrades without its model, so a missing
/// model is reported as "degraded" rather than taking the pod out of rotation.
pub async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let readiness = state.filters.readiness();

    let landmarks = if readiness.landmarks {
        CheckStatus::ok()
    } else {
        CheckStatus::unavailable("stickers return the original image")
    };
    let segmentation = if readiness.segmentation {
        CheckStatus::ok()
    } else {
        CheckStatus::unavailable("background blur returns the blurred frame")
    };

    let all_ok = readiness.landmarks && readiness.segmentation;
    Json(ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            landmarks,
            segmentation,
            gate: GateStatus {
                capacity: readiness.gate_capacity,
                available: readiness.gate_available,
            },
        },
    })
}

/// Service index.
#[derive(Serialize)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "POST /beauty-filter",
            "POST /background-blur",
            "POST /lut-filter",
            "POST /sticker",
            "POST /face-morph",
            "GET /schema",
            "GET /health",
            "GET /ready",
        ],
    })
}

/// JSON schema of the filter parameters.
pub async fn schema() -> Json<RootSchema> {
    Json(schemars::schema_for!(FilterRequest))
}
